// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use alloc::{boxed::Box, string::String};
use core::fmt::{self, Display};

use arrayvec::ArrayVec;

/// Shorthand for an [`ArrayVec`] of audio device names.
///
/// Exported so that platforms don't need to explicitly depend on [`arrayvec`]
/// just for the [`AudioOutput::device_names`] typing.
pub type AudioDeviceNames = ArrayVec<String, 32>;

/// The function the platform calls from its audio thread whenever it needs
/// more samples. The slice should be fully written by the function, in the
/// [`AudioSpec`] the device was opened with.
pub type AudioRenderFn = Box<dyn FnMut(&mut [u8]) + Send>;

/// Encoding of individual audio samples. All multi-byte formats are in the
/// native byte order of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit samples, silence at 0x80.
    U8,
    /// Signed 16-bit samples.
    S16,
    /// Signed 32-bit samples.
    S32,
    /// 32-bit floating point samples in the range `-1.0..=1.0`.
    F32,
}

impl SampleFormat {
    /// The size of one sample of this format in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }

    /// The byte value which, repeated, forms a silent buffer of this format.
    pub const fn silence(self) -> u8 {
        match self {
            SampleFormat::U8 => 0x80,
            _ => 0,
        }
    }
}

/// The sample rate, channel count and sample encoding of a buffer of audio,
/// or of an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioSpec {
    /// Frames per second.
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channels: u8,
    /// Encoding of each sample.
    pub format: SampleFormat,
}

impl AudioSpec {
    /// 48 kHz stereo with 16-bit samples, which is what the engine asks for
    /// unless configured otherwise.
    pub const DEFAULT: AudioSpec = AudioSpec {
        sample_rate: 48000,
        channels: 2,
        format: SampleFormat::S16,
    };

    /// The size of one frame (one sample for every channel) in bytes.
    pub const fn frame_size(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

impl Default for AudioSpec {
    fn default() -> Self {
        AudioSpec::DEFAULT
    }
}

/// Error reported by the platform when an audio device can't be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError(pub String);

impl Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::error::Error for DeviceError {}

/// The audio half of a platform implementation: a way to list and open output
/// devices which pull samples from the engine on their own schedule.
///
/// Like the rest of the platform interface, everything here is called from the
/// main thread. Only the [`AudioRenderFn`] passed into
/// [`AudioOutput::open_device`] is called from elsewhere.
pub trait AudioOutput {
    /// Get a list of the names of the currently available output devices.
    fn device_names(&self) -> AudioDeviceNames;

    /// Open the named output device (or the platform's default if `name` is
    /// None), asking for the `desired` spec. The device may end up with a
    /// different spec, which is returned by [`OpenDevice::spec`].
    ///
    /// The device starts out paused. Once resumed, `render` gets called from
    /// the platform's audio thread until the device is paused or dropped.
    fn open_device(
        &self,
        name: Option<&str>,
        desired: AudioSpec,
        render: AudioRenderFn,
    ) -> Result<Box<dyn OpenDevice>, DeviceError>;
}

/// An open output device. Dropping it closes the device, and implementations
/// must make sure the render function is not running anymore by the time the
/// drop returns.
pub trait OpenDevice {
    /// The name of the device, if it was opened by name.
    fn name(&self) -> Option<&str>;

    /// The spec the device actually plays back in.
    fn spec(&self) -> AudioSpec;

    /// Start (or continue) calling the render function.
    fn resume(&self);

    /// Stop calling the render function until [`OpenDevice::resume`] is
    /// called. When this returns, the render function is not running.
    fn pause(&self);
}
