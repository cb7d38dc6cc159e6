// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The audio thread's half of the mixer. Nothing here allocates, blocks (other
//! than on the state lock), or fails.

use bytemuck::Pod;
use platform::SampleFormat;

use super::{MixerState, MAX_VOLUME};

/// Overwrites `out` with the mix of every playing sound at the current
/// volume, advancing their cursors.
///
/// Sounds which run out of data either wrap around to the start and keep
/// filling the same buffer (if looped) or stop.
pub(super) fn mix_into(state: &mut MixerState, out: &mut [u8]) {
    let format = state.spec.format;
    out.fill(format.silence());

    let frame_size = state.spec.frame_size();
    if frame_size == 0 {
        return;
    }
    let out = {
        let whole_frames = out.len() - out.len() % frame_size;
        &mut out[..whole_frames]
    };
    let volume = state.volume;

    for sound in state.sounds.iter_mut().flatten() {
        if !sound.playing {
            continue;
        }

        let playable = sound.buffer.len() - sound.buffer.len() % frame_size;
        if playable == 0 {
            sound.playing = false;
            sound.cursor = 0;
            continue;
        }
        sound.cursor = sound.cursor.min(playable);

        let mut written = 0;
        while written < out.len() {
            if sound.cursor == playable {
                if sound.looped {
                    sound.cursor = 0;
                } else {
                    break;
                }
            }
            let len = (out.len() - written).min(playable - sound.cursor);
            let src = &sound.buffer[sound.cursor..sound.cursor + len];
            mix_samples(format, &mut out[written..written + len], src, volume);
            sound.cursor += len;
            written += len;
        }

        if !sound.looped && sound.cursor == playable {
            sound.playing = false;
        }
    }
}

/// Adds `src` scaled by `volume` on top of `dst`, saturating at the limits of
/// the format.
fn mix_samples(format: SampleFormat, dst: &mut [u8], src: &[u8], volume: u8) {
    let volume = volume as i64;
    let max = MAX_VOLUME as i64;
    match format {
        SampleFormat::U8 => {
            for (dst, &src) in dst.iter_mut().zip(src) {
                let mixed = (*dst as i64 - 128) + (src as i64 - 128) * volume / max;
                *dst = (mixed.clamp(-128, 127) + 128) as u8;
            }
        }
        SampleFormat::S16 => mix_pod::<i16>(dst, src, |dst, src| {
            let mixed = dst as i64 + src as i64 * volume / max;
            mixed.clamp(i16::MIN as i64, i16::MAX as i64) as i16
        }),
        SampleFormat::S32 => mix_pod::<i32>(dst, src, |dst, src| {
            let mixed = dst as i64 + src as i64 * volume / max;
            mixed.clamp(i32::MIN as i64, i32::MAX as i64) as i32
        }),
        SampleFormat::F32 => mix_pod::<f32>(dst, src, |dst, src| {
            (dst + src * volume as f32 / max as f32).clamp(-1.0, 1.0)
        }),
    }
}

fn mix_pod<T: Pod>(dst: &mut [u8], src: &[u8], mix: impl Fn(T, T) -> T) {
    let size = size_of::<T>();
    for (dst, src) in dst.chunks_exact_mut(size).zip(src.chunks_exact(size)) {
        let mixed = mix(bytemuck::pod_read_unaligned(dst), bytemuck::pod_read_unaligned(src));
        dst.copy_from_slice(bytemuck::bytes_of(&mixed));
    }
}
