// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{cell::RefCell, rc::Rc};

use platform::{
    AudioDeviceNames, AudioOutput, AudioRenderFn, AudioSpec, DeviceError, OpenDevice, SampleFormat,
};

struct OpenedDevice {
    id: u64,
    spec: AudioSpec,
    render: AudioRenderFn,
    paused: bool,
}

#[derive(Default)]
struct TestAudio {
    /// Named devices which can be opened, in addition to the default one.
    devices: Vec<(String, AudioSpec)>,
    opened: Vec<OpenedDevice>,
    next_id: u64,
}

/// Audio output for tests. Instead of an audio thread calling the render
/// functions, tests pull audio out of the device with
/// [`TestPlatform::render`].
///
/// Clones share the same devices, so a test can keep one around after passing
/// another into the code being tested.
#[derive(Clone, Default)]
pub struct TestPlatform {
    audio: Rc<RefCell<TestAudio>>,
}

impl TestPlatform {
    pub fn new() -> TestPlatform {
        TestPlatform::default()
    }

    /// Adds a named device which gets opened with `spec` regardless of what's
    /// asked for. The default device always grants the desired spec.
    pub fn add_device(&self, name: &str, spec: AudioSpec) {
        self.audio.borrow_mut().devices.push((name.to_string(), spec));
    }

    /// The amount of devices which are currently open (paused or not).
    pub fn open_device_count(&self) -> usize {
        self.audio.borrow().opened.len()
    }

    /// Calls the render function of the most recently opened unpaused device
    /// for `frames` frames of audio, and returns the bytes it wrote.
    ///
    /// ### Panics
    ///
    /// If no device is playing.
    pub fn render(&self, frames: usize) -> Vec<u8> {
        let mut audio = self.audio.borrow_mut();
        let device = (audio.opened.iter_mut().rev())
            .find(|device| !device.paused)
            .expect("no audio device is playing");
        let mut buffer = vec![0xAA; frames * device.spec.frame_size()];
        (device.render)(&mut buffer);
        buffer
    }

    /// [`TestPlatform::render`] for devices playing [`SampleFormat::S16`].
    pub fn render_s16(&self, frames: usize) -> Vec<i16> {
        assert_eq!(Some(SampleFormat::S16), self.playing_format());
        (self.render(frames).chunks_exact(2))
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// [`TestPlatform::render`] for devices playing [`SampleFormat::F32`].
    pub fn render_f32(&self, frames: usize) -> Vec<f32> {
        assert_eq!(Some(SampleFormat::F32), self.playing_format());
        (self.render(frames).chunks_exact(4))
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    fn playing_format(&self) -> Option<SampleFormat> {
        (self.audio.borrow().opened.iter().rev())
            .find(|device| !device.paused)
            .map(|device| device.spec.format)
    }
}

impl AudioOutput for TestPlatform {
    fn device_names(&self) -> AudioDeviceNames {
        let audio = self.audio.borrow();
        audio.devices.iter().map(|(name, _)| name.clone()).take(32).collect()
    }

    fn open_device(
        &self,
        name: Option<&str>,
        desired: AudioSpec,
        render: AudioRenderFn,
    ) -> Result<Box<dyn OpenDevice>, DeviceError> {
        let mut audio = self.audio.borrow_mut();
        let spec = match name {
            None => desired,
            Some(name) => (audio.devices.iter())
                .find(|(device_name, _)| device_name == name)
                .map(|(_, spec)| *spec)
                .ok_or_else(|| DeviceError(format!("no device called {name}")))?,
        };

        let id = audio.next_id;
        audio.next_id += 1;
        audio.opened.push(OpenedDevice {
            id,
            spec,
            render,
            paused: true,
        });

        Ok(Box::new(TestDevice {
            id,
            name: name.map(str::to_string),
            spec,
            audio: self.audio.clone(),
        }))
    }
}

struct TestDevice {
    id: u64,
    name: Option<String>,
    spec: AudioSpec,
    audio: Rc<RefCell<TestAudio>>,
}

impl TestDevice {
    fn set_paused(&self, paused: bool) {
        let mut audio = self.audio.borrow_mut();
        if let Some(device) = audio.opened.iter_mut().find(|device| device.id == self.id) {
            device.paused = paused;
        }
    }
}

impl OpenDevice for TestDevice {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn resume(&self) {
        self.set_paused(false);
    }

    fn pause(&self) {
        self.set_paused(true);
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        self.audio.borrow_mut().opened.retain(|device| device.id != self.id);
    }
}

/// A canonical 16-bit PCM WAV file containing `samples`.
pub fn wav_file(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let mut wav = Vec::new();
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }
    wav
}
