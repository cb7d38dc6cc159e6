// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

mod convert;
mod mix;

use std::{mem, sync::Arc};

use parking_lot::Mutex;
use platform::{AudioDeviceNames, AudioOutput, AudioSpec, OpenDevice};
use tracing::{debug, info, warn};

use crate::{Error, Result};

pub use convert::convert;

/// The loudest volume, at which sounds play back at their original level.
pub const MAX_VOLUME: u8 = 128;

/// Samples in some [`AudioSpec`], e.g. a decoded sound file.
///
/// Cheap to clone, the samples are shared.
#[derive(Debug, Clone)]
pub struct SoundBuffer {
    spec: AudioSpec,
    data: Arc<[u8]>,
}

impl SoundBuffer {
    /// Wraps interleaved samples in the given spec.
    pub fn new(spec: AudioSpec, data: impl Into<Arc<[u8]>>) -> SoundBuffer {
        SoundBuffer {
            spec,
            data: data.into(),
        }
    }

    /// The spec the samples are in.
    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// The interleaved samples.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The length of the sound in frames.
    pub fn frames(&self) -> usize {
        match self.spec.frame_size() {
            0 => 0,
            frame_size => self.data.len() / frame_size,
        }
    }
}

/// Identifies a sound added to a [`Mixer`]. Stays valid across device
/// switches, until the sound is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(usize);

struct ActiveSound {
    /// The sound as it was added, converted again from scratch on device
    /// switches so that conversions don't stack up.
    source: SoundBuffer,
    /// The sound in the device's spec.
    buffer: Arc<[u8]>,
    /// Byte offset into `buffer`.
    cursor: usize,
    playing: bool,
    looped: bool,
}

/// Everything shared between the main thread and the audio thread.
struct MixerState {
    spec: AudioSpec,
    volume: u8,
    /// Indexed by [`SoundHandle`]. Removed sounds leave a None behind, so
    /// that handles of other sounds don't change.
    sounds: Vec<Option<ActiveSound>>,
}

impl MixerState {
    fn sound_mut(&mut self, handle: SoundHandle) -> Option<&mut ActiveSound> {
        self.sounds.get_mut(handle.0).and_then(Option::as_mut)
    }
}

/// Plays back any number of sounds at once on one output device.
///
/// The mixer's state is shared with the audio thread through one lock, which
/// the control functions take for as short a time as they can. The exception
/// is [`Mixer::set_device`], which converts every sound while holding it, but
/// with the device paused.
pub struct Mixer {
    output: Box<dyn AudioOutput>,
    desired: AudioSpec,
    state: Arc<Mutex<MixerState>>,
    device: Box<dyn OpenDevice>,
}

impl Mixer {
    /// Opens the named output device (or the default, if None) and starts
    /// playing silence on it.
    ///
    /// The device's spec may differ from `desired`, sounds are converted to
    /// whatever the device ended up with.
    pub fn new(
        output: Box<dyn AudioOutput>,
        device: Option<&str>,
        desired: AudioSpec,
    ) -> Result<Mixer> {
        let state = Arc::new(Mutex::new(MixerState {
            spec: desired,
            volume: MAX_VOLUME,
            sounds: Vec::new(),
        }));
        let device = open_device(&*output, device, desired, &state)?;
        state.lock().spec = device.spec();
        device.resume();
        info!("Opened audio device {} with {:?}.", display_name(device.name()), device.spec());

        Ok(Mixer {
            output,
            desired,
            state,
            device,
        })
    }

    /// Adds a sound to the mixer, converting it to the device's spec if
    /// needed. The sound doesn't start playing until [`Mixer::play`].
    pub fn add_sound(&mut self, sound: SoundBuffer) -> Result<SoundHandle> {
        let spec = self.spec();
        let buffer = converted_buffer(&sound, spec)?;
        let active_sound = ActiveSound {
            source: sound,
            buffer,
            cursor: 0,
            playing: false,
            looped: false,
        };

        let mut state = self.state.lock();
        let index = match state.sounds.iter().position(Option::is_none) {
            Some(index) => {
                state.sounds[index] = Some(active_sound);
                index
            }
            None => {
                state.sounds.push(Some(active_sound));
                state.sounds.len() - 1
            }
        };
        Ok(SoundHandle(index))
    }

    /// Removes the sound, stopping it if it's playing. Returns false if the
    /// handle doesn't refer to a sound in this mixer.
    pub fn remove_sound(&mut self, handle: SoundHandle) -> bool {
        let removed = {
            let mut state = self.state.lock();
            state.sounds.get_mut(handle.0).and_then(Option::take)
        };
        // Dropped here, outside of the lock.
        removed.is_some()
    }

    /// Plays the sound from the start, restarting it if it was already
    /// playing. Returns false if the handle doesn't refer to a sound in this
    /// mixer.
    pub fn play(&mut self, handle: SoundHandle, looped: bool) -> bool {
        let mut state = self.state.lock();
        let Some(sound) = state.sound_mut(handle) else {
            return false;
        };
        sound.cursor = 0;
        sound.playing = true;
        sound.looped = looped;
        true
    }

    /// Stops the sound. Returns false if the handle doesn't refer to a sound
    /// in this mixer.
    pub fn stop(&mut self, handle: SoundHandle) -> bool {
        let mut state = self.state.lock();
        let Some(sound) = state.sound_mut(handle) else {
            return false;
        };
        sound.playing = false;
        true
    }

    /// Returns true if the sound is currently playing.
    pub fn is_playing(&self, handle: SoundHandle) -> bool {
        let state = self.state.lock();
        matches!(state.sounds.get(handle.0), Some(Some(sound)) if sound.playing)
    }

    /// Sets the volume all sounds are played at, from 0 (silent) to
    /// [`MAX_VOLUME`] (unchanged). Anything outside of that range is an
    /// error, and the previous volume stays in effect.
    pub fn set_volume(&mut self, level: i32) -> Result<()> {
        let volume = u8::try_from(level)
            .ok()
            .filter(|volume| *volume <= MAX_VOLUME)
            .ok_or(Error::VolumeOutOfRange {
                level,
                max: MAX_VOLUME,
            })?;
        self.state.lock().volume = volume;
        debug!("Audio volume set to {volume}.");
        Ok(())
    }

    /// The current volume, see [`Mixer::set_volume`].
    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    /// The spec of the current device, which every added sound has been
    /// converted to.
    pub fn spec(&self) -> AudioSpec {
        self.device.spec()
    }

    /// The name of the current device, None if it's the default device.
    pub fn device_name(&self) -> Option<&str> {
        self.device.name()
    }

    /// The names of the output devices that could be passed to
    /// [`Mixer::set_device`].
    pub fn device_names(&self) -> AudioDeviceNames {
        self.output.device_names()
    }

    /// Moves playback to another output device (or the default, if None).
    ///
    /// Every sound is converted to the new device's spec, keeping its playing
    /// and looping state and its position in the sound. If the new device
    /// can't be opened or a sound can't be converted, the previous device
    /// keeps playing as if nothing happened.
    pub fn set_device(&mut self, name: Option<&str>) -> Result<()> {
        profiling::function_scope!();
        self.device.pause();

        let new_device = match open_device(&*self.output, name, self.desired, &self.state) {
            Ok(device) => device,
            Err(err) => {
                warn!("Keeping audio device {}: {err}", display_name(self.device.name()));
                self.device.resume();
                return Err(err);
            }
        };
        let new_spec = new_device.spec();

        let replaced_buffers = {
            let mut state = self.state.lock();
            match convert_all(&state, new_spec) {
                Ok(buffers) => {
                    let old_spec = state.spec;
                    let mut replaced = Vec::with_capacity(buffers.len());
                    for (sound, buffer) in state.sounds.iter_mut().zip(buffers) {
                        if let (Some(sound), Some(buffer)) = (sound, buffer) {
                            sound.cursor =
                                rescale_cursor(sound.cursor, old_spec, new_spec, buffer.len());
                            replaced.push(mem::replace(&mut sound.buffer, buffer));
                        }
                    }
                    state.spec = new_spec;
                    replaced
                }
                Err(err) => {
                    drop(state);
                    drop(new_device);
                    warn!("Keeping audio device {}: {err}", display_name(self.device.name()));
                    self.device.resume();
                    return Err(err);
                }
            }
        };
        drop(replaced_buffers);

        drop(mem::replace(&mut self.device, new_device));
        self.device.resume();
        info!("Switched to audio device {} with {new_spec:?}.", display_name(self.device.name()));
        Ok(())
    }
}

fn open_device(
    output: &dyn AudioOutput,
    name: Option<&str>,
    desired: AudioSpec,
    state: &Arc<Mutex<MixerState>>,
) -> Result<Box<dyn OpenDevice>> {
    let render_state = state.clone();
    let render = Box::new(move |out: &mut [u8]| mix::mix_into(&mut render_state.lock(), out));
    output
        .open_device(name, desired, render)
        .map_err(|source| Error::DeviceUnavailable {
            name: name.map(str::to_string),
            source,
        })
}

fn converted_buffer(sound: &SoundBuffer, spec: AudioSpec) -> Result<Arc<[u8]>> {
    if sound.spec == spec {
        Ok(sound.data.clone())
    } else {
        Ok(convert(&sound.data, sound.spec, spec)?.into())
    }
}

/// Converts every sound into `spec`, or nothing if any of them fails.
fn convert_all(state: &MixerState, spec: AudioSpec) -> Result<Vec<Option<Arc<[u8]>>>> {
    state
        .sounds
        .iter()
        .map(|sound| {
            sound
                .as_ref()
                .map(|sound| converted_buffer(&sound.source, spec))
                .transpose()
        })
        .collect()
}

/// Maps a byte offset in a buffer of `from` to the same point in time in the
/// buffer of `to`, landing on a frame boundary.
fn rescale_cursor(cursor: usize, from: AudioSpec, to: AudioSpec, new_len: usize) -> usize {
    let (from_frame, to_frame) = (from.frame_size(), to.frame_size());
    if from_frame == 0 || to_frame == 0 || from.sample_rate == 0 {
        return 0;
    }
    let frame = (cursor / from_frame) as u64 * to.sample_rate as u64 / from.sample_rate as u64;
    (frame as usize * to_frame).min(new_len - new_len % to_frame)
}

fn display_name(name: Option<&str>) -> &str {
    name.unwrap_or("(default)")
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    use parking_lot::Mutex;
    use platform::{
        AudioDeviceNames, AudioOutput, AudioRenderFn, AudioSpec, DeviceError, OpenDevice,
        SampleFormat,
    };

    use crate::{test_platform::TestPlatform, Error};

    use super::{Mixer, SoundBuffer, MAX_VOLUME};

    fn s16_sound(spec: AudioSpec, samples: &[i16]) -> SoundBuffer {
        SoundBuffer::new(spec, bytemuck::cast_slice::<i16, u8>(samples))
    }

    fn mono(sample_rate: u32) -> AudioSpec {
        AudioSpec {
            sample_rate,
            channels: 1,
            format: SampleFormat::S16,
        }
    }

    #[test]
    fn device_plays_added_sounds() {
        let platform = TestPlatform::new();
        let mut mixer = Mixer::new(Box::new(platform.clone()), None, mono(48000)).unwrap();
        let sound = mixer.add_sound(s16_sound(mono(48000), &[5, 6, 7])).unwrap();

        assert_eq!(vec![0, 0], platform.render_s16(2), "nothing should play before play()");
        assert!(mixer.play(sound, false));
        assert!(mixer.is_playing(sound));
        assert_eq!(vec![5, 6, 7, 0], platform.render_s16(4));
        assert!(!mixer.is_playing(sound));
    }

    #[test]
    fn added_sounds_are_converted_to_the_device_spec() {
        let platform = TestPlatform::new();
        let mut mixer = Mixer::new(Box::new(platform.clone()), None, AudioSpec::DEFAULT).unwrap();
        let sound = mixer.add_sound(s16_sound(mono(24000), &[1000, 1000])).unwrap();
        mixer.play(sound, false);
        assert_eq!(vec![1000; 8], platform.render_s16(4));
    }

    #[test]
    fn volume_out_of_range_keeps_the_previous_volume() {
        let platform = TestPlatform::new();
        let mut mixer = Mixer::new(Box::new(platform), None, AudioSpec::DEFAULT).unwrap();
        mixer.set_volume(64).unwrap();
        for level in [MAX_VOLUME as i32 + 1, -1, 1000] {
            assert!(matches!(
                mixer.set_volume(level),
                Err(Error::VolumeOutOfRange { .. })
            ));
        }
        assert_eq!(64, mixer.volume());
        mixer.set_volume(0).unwrap();
        mixer.set_volume(MAX_VOLUME as i32).unwrap();
        assert_eq!(MAX_VOLUME, mixer.volume());
    }

    #[test]
    fn stale_handles_are_rejected() {
        let platform = TestPlatform::new();
        let mut mixer = Mixer::new(Box::new(platform), None, mono(48000)).unwrap();
        let sound = mixer.add_sound(s16_sound(mono(48000), &[1])).unwrap();
        assert!(mixer.remove_sound(sound));
        assert!(!mixer.remove_sound(sound));
        assert!(!mixer.play(sound, true));
        assert!(!mixer.stop(sound));
        assert!(!mixer.is_playing(sound));
    }

    #[test]
    fn device_switch_converts_sounds_and_keeps_their_state() {
        let platform = TestPlatform::new();
        platform.add_device("Headphones", mono(24000));
        let mut mixer = Mixer::new(Box::new(platform.clone()), None, mono(48000)).unwrap();

        let looping = mixer.add_sound(s16_sound(mono(48000), &[100; 8])).unwrap();
        let stopped = mixer.add_sound(s16_sound(mono(48000), &[200; 8])).unwrap();
        mixer.play(looping, true);
        assert_eq!(vec![100; 4], platform.render_s16(4));

        mixer.set_device(Some("Headphones")).unwrap();
        assert_eq!(Some("Headphones"), mixer.device_name());
        assert_eq!(mono(24000), mixer.spec());
        assert!(mixer.is_playing(looping));
        assert!(!mixer.is_playing(stopped));
        assert_eq!(1, platform.open_device_count(), "the old device should be closed");

        // Halfway through at 48 kHz is halfway through at 24 kHz too, and the
        // sound should keep looping on the new device.
        assert_eq!(vec![100; 6], platform.render_s16(6));
        assert!(mixer.is_playing(looping));
    }

    #[test]
    fn device_switch_converts_channels_and_format() {
        let platform = TestPlatform::new();
        let stereo_f32 = AudioSpec {
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::F32,
        };
        platform.add_device("Speakers", stereo_f32);
        let mut mixer = Mixer::new(Box::new(platform.clone()), None, mono(48000)).unwrap();
        let sound = mixer.add_sound(s16_sound(mono(48000), &[16384; 4])).unwrap();
        mixer.play(sound, false);
        assert_eq!(vec![16384], platform.render_s16(1));

        mixer.set_device(Some("Speakers")).unwrap();
        assert_eq!(stereo_f32, mixer.spec());
        // The mono sample is copied to both channels, and the last three
        // frames are left.
        assert_eq!(vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0], platform.render_f32(4));
        assert!(!mixer.is_playing(sound));
    }

    #[test]
    fn failed_device_switch_keeps_the_old_device() {
        let platform = TestPlatform::new();
        let mut mixer = Mixer::new(Box::new(platform.clone()), None, mono(48000)).unwrap();
        let sound = mixer.add_sound(s16_sound(mono(48000), &[7; 4])).unwrap();
        mixer.play(sound, true);

        let result = mixer.set_device(Some("Nonexistent"));
        assert!(matches!(result, Err(Error::DeviceUnavailable { .. })));
        assert_eq!(None, mixer.device_name());
        assert_eq!(mono(48000), mixer.spec());
        assert_eq!(vec![7; 6], platform.render_s16(6), "the old device should be playing");
    }

    /// An output which renders on a separate thread, like real audio devices.
    #[derive(Clone, Default)]
    struct ThreadedOutput {
        devices: Arc<Mutex<Vec<ThreadedDeviceEntry>>>,
        next_id: Arc<AtomicUsize>,
    }

    struct ThreadedDeviceEntry {
        id: usize,
        paused: bool,
        render: AudioRenderFn,
    }

    impl ThreadedOutput {
        /// Renders a buffer with the most recently opened playing device, and
        /// returns the samples, or None if nothing is playing.
        fn render_s16(&self, frames: usize) -> Option<Vec<i16>> {
            let mut devices = self.devices.lock();
            let device = devices.iter_mut().rev().find(|device| !device.paused)?;
            let mut buffer = vec![0u8; frames * 4];
            (device.render)(&mut buffer);
            Some(
                (buffer.chunks_exact(2))
                    .map(bytemuck::pod_read_unaligned)
                    .collect(),
            )
        }
    }

    impl AudioOutput for ThreadedOutput {
        fn device_names(&self) -> AudioDeviceNames {
            AudioDeviceNames::new()
        }

        fn open_device(
            &self,
            name: Option<&str>,
            desired: AudioSpec,
            render: AudioRenderFn,
        ) -> Result<Box<dyn OpenDevice>, DeviceError> {
            let spec = match name {
                None => desired,
                Some(_) => AudioSpec {
                    sample_rate: 24000,
                    channels: 2,
                    format: SampleFormat::S16,
                },
            };
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.devices.lock().push(ThreadedDeviceEntry {
                id,
                paused: true,
                render,
            });
            Ok(Box::new(ThreadedDevice {
                id,
                name: name.map(str::to_string),
                spec,
                devices: self.devices.clone(),
            }))
        }
    }

    struct ThreadedDevice {
        id: usize,
        name: Option<String>,
        spec: AudioSpec,
        devices: Arc<Mutex<Vec<ThreadedDeviceEntry>>>,
    }

    impl ThreadedDevice {
        fn set_paused(&self, paused: bool) {
            let mut devices = self.devices.lock();
            if let Some(device) = devices.iter_mut().find(|device| device.id == self.id) {
                device.paused = paused;
            }
        }
    }

    impl OpenDevice for ThreadedDevice {
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

    impl Drop for ThreadedDevice {
        fn drop(&mut self) {
            self.devices.lock().retain(|device| device.id != self.id);
        }
    }

    #[test]
    fn audio_thread_sees_consistent_state() {
        let output = ThreadedOutput::default();
        let mut mixer = Mixer::new(Box::new(output.clone()), None, mono(48000)).unwrap();
        let sound = mixer.add_sound(s16_sound(mono(48000), &[1000; 480])).unwrap();
        mixer.play(sound, true);

        let done = Arc::new(AtomicBool::new(false));
        let rendered = Arc::new(AtomicUsize::new(0));
        let audio_thread = thread::spawn({
            let (output, done, rendered) = (output.clone(), done.clone(), rendered.clone());
            move || {
                while !done.load(Ordering::Acquire) {
                    if let Some(samples) = output.render_s16(16) {
                        // The sound is constant and looped, so one callback
                        // should only ever see one volume.
                        assert!(samples.iter().all(|sample| *sample == samples[0]));
                        rendered.fetch_add(1, Ordering::Release);
                    }
                    thread::yield_now();
                }
            }
        });

        let volumes = [MAX_VOLUME as i32, 64, 0, 32];
        for i in 0..100 {
            mixer.set_volume(volumes[i % volumes.len()]).unwrap();
            mixer.play(sound, true);
            let device = if i % 2 == 0 { Some("Headphones") } else { None };
            mixer.set_device(device).unwrap();
            assert!(mixer.is_playing(sound));
        }
        while rendered.load(Ordering::Acquire) == 0 && !audio_thread.is_finished() {
            thread::yield_now();
        }

        done.store(true, Ordering::Release);
        audio_thread.join().unwrap();
        assert_eq!(1, output.devices.lock().len(), "old devices should be closed");
    }
}
