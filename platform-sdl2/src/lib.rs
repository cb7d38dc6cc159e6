// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SDL2 implementation of the platform: a window to run the game loop in, and
//! SDL's audio devices as the [`AudioOutput`].

use std::marker::PhantomData;

use bytemuck::Pod;
use engine::Engine;
use platform::{
    AudioDeviceNames, AudioOutput, AudioRenderFn, AudioSpec, DeviceError, OpenDevice, SampleFormat,
};
use sdl2::{
    audio::{AudioCallback, AudioDevice, AudioFormatNum, AudioSpecDesired},
    event::Event,
    pixels::Color,
    AudioSubsystem, Sdl,
};
use tracing::{debug, info};

/// How many frames SDL asks for per callback.
const AUDIO_BUFFER_FRAMES: u16 = 512;

/// The SDL context, window included.
pub struct Sdl2Platform {
    sdl_context: Sdl,
    audio: AudioSubsystem,
    title: String,
}

impl Sdl2Platform {
    /// Initializes SDL with its video and audio subsystems.
    pub fn new(title: &str) -> Result<Sdl2Platform, String> {
        let sdl_context = sdl2::init()?;
        let audio = sdl_context.audio()?;
        info!(
            "Initialized SDL {} with the {} audio driver.",
            sdl2::version::version(),
            audio.current_audio_driver(),
        );
        Ok(Sdl2Platform {
            sdl_context,
            audio,
            title: title.to_string(),
        })
    }

    /// The [`AudioOutput`] to pass into [`Engine::new`].
    pub fn audio_output(&self) -> Box<dyn AudioOutput> {
        Box::new(Sdl2Audio {
            audio: self.audio.clone(),
        })
    }

    /// Opens a window and calls [`Engine::run_frame`] once per frame until
    /// the window is closed.
    pub fn run_game_loop(&self, engine: &mut Engine) -> Result<(), String> {
        let video = self.sdl_context.video()?;
        let window = video
            .window(&self.title, 960, 540)
            .allow_highdpi()
            .position_centered()
            .resizable()
            .build()
            .map_err(|err| err.to_string())?;
        let mut canvas = window
            .into_canvas()
            .present_vsync()
            .build()
            .map_err(|err| err.to_string())?;
        let mut event_pump = self.sdl_context.event_pump()?;

        loop {
            for event in event_pump.poll_iter() {
                if let Event::Quit { .. } = event {
                    info!("Window closed, exiting the game loop.");
                    return Ok(());
                }
            }

            canvas.set_draw_color(Color::BLACK);
            canvas.clear();

            engine.run_frame();

            canvas.present();
            profiling::finish_frame!();
        }
    }
}

struct Sdl2Audio {
    audio: AudioSubsystem,
}

impl AudioOutput for Sdl2Audio {
    fn device_names(&self) -> AudioDeviceNames {
        let count = self.audio.num_audio_playback_devices().unwrap_or(0);
        (0..count)
            .filter_map(|index| self.audio.audio_playback_device_name(index).ok())
            .take(AudioDeviceNames::new().capacity())
            .collect()
    }

    fn open_device(
        &self,
        name: Option<&str>,
        desired: AudioSpec,
        render: AudioRenderFn,
    ) -> Result<Box<dyn OpenDevice>, DeviceError> {
        match desired.format {
            SampleFormat::U8 => open::<u8>(&self.audio, name, desired, render),
            SampleFormat::S16 => open::<i16>(&self.audio, name, desired, render),
            SampleFormat::S32 => open::<i32>(&self.audio, name, desired, render),
            SampleFormat::F32 => open::<f32>(&self.audio, name, desired, render),
        }
    }
}

/// Opens the device in the sample type `T`, which SDL converts to and from
/// the hardware's format on its own.
fn open<T: AudioFormatNum + Pod + Send>(
    audio: &AudioSubsystem,
    name: Option<&str>,
    desired: AudioSpec,
    render: AudioRenderFn,
) -> Result<Box<dyn OpenDevice>, DeviceError> {
    let desired_spec = AudioSpecDesired {
        freq: Some(desired.sample_rate as i32),
        channels: Some(desired.channels),
        samples: Some(AUDIO_BUFFER_FRAMES),
    };
    let device = audio
        .open_playback(name, &desired_spec, |_| RenderCallback::<T> {
            render,
            _sample: PhantomData,
        })
        .map_err(DeviceError)?;

    let obtained = device.spec();
    let spec = AudioSpec {
        sample_rate: obtained.freq as u32,
        channels: obtained.channels,
        format: desired.format,
    };
    debug!("Opened SDL audio device {name:?}: {spec:?}, {} frames per callback.", obtained.samples);

    Ok(Box::new(Sdl2Device {
        name: name.map(str::to_string),
        spec,
        device,
    }))
}

struct RenderCallback<T> {
    render: AudioRenderFn,
    _sample: PhantomData<T>,
}

impl<T: AudioFormatNum + Pod + Send> AudioCallback for RenderCallback<T> {
    type Channel = T;

    fn callback(&mut self, out: &mut [T]) {
        (self.render)(bytemuck::cast_slice_mut(out));
    }
}

struct Sdl2Device<T: AudioFormatNum + Pod + Send> {
    name: Option<String>,
    spec: AudioSpec,
    /// Closed by SDL when dropped, which waits for the callback to return.
    device: AudioDevice<RenderCallback<T>>,
}

impl<T: AudioFormatNum + Pod + Send> OpenDevice for Sdl2Device<T> {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn resume(&self) {
        self.device.resume();
    }

    fn pause(&self) {
        // SDL takes the device lock for this, so a running callback finishes
        // before this returns.
        self.device.pause();
    }
}
