// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use bytemuck::Pod;
use platform::{AudioSpec, SampleFormat};

use crate::{Error, Result};

/// Converts interleaved samples from one spec to another: sample format,
/// channel count and sample rate. A trailing partial frame is dropped.
///
/// Fails with [`Error::UnsupportedFormatConversion`] if either spec has no
/// channels or a zero sample rate.
pub fn convert(data: &[u8], from: AudioSpec, to: AudioSpec) -> Result<Vec<u8>> {
    profiling::function_scope!();
    if from.channels == 0 || from.sample_rate == 0 || to.channels == 0 || to.sample_rate == 0 {
        return Err(Error::UnsupportedFormatConversion {
            from_format: from.format,
            from_channels: from.channels,
            from_rate: from.sample_rate,
            to_format: to.format,
            to_channels: to.channels,
            to_rate: to.sample_rate,
        });
    }

    let whole_frames = data.len() - data.len() % from.frame_size();
    if from == to {
        return Ok(data[..whole_frames].to_vec());
    }

    let samples = decode(&data[..whole_frames], from.format);
    let samples = if from.channels == to.channels {
        samples
    } else {
        ChannelMatrix::new(from.channels as usize, to.channels as usize).apply(&samples)
    };
    let samples = if from.sample_rate == to.sample_rate {
        samples
    } else {
        resample(&samples, to.channels as usize, from.sample_rate, to.sample_rate)
    };
    Ok(encode(&samples, to.format))
}

/// Reads a sample of type `T` from each `size_of::<T>()` bytes, which need not
/// be aligned.
pub(super) fn read_samples<T: Pod>(bytes: &[u8]) -> impl Iterator<Item = T> + '_ {
    bytes.chunks_exact(size_of::<T>()).map(bytemuck::pod_read_unaligned)
}

fn decode(bytes: &[u8], format: SampleFormat) -> Vec<f32> {
    match format {
        SampleFormat::U8 => bytes.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect(),
        SampleFormat::S16 => read_samples::<i16>(bytes).map(|s| s as f32 / 32768.0).collect(),
        SampleFormat::S32 => read_samples::<i32>(bytes)
            .map(|s| (s as f64 / 2_147_483_648.0) as f32)
            .collect(),
        SampleFormat::F32 => read_samples::<f32>(bytes).collect(),
    }
}

fn encode(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * format.bytes_per_sample());
    for &sample in samples {
        let sample = sample.clamp(-1.0, 1.0);
        match format {
            SampleFormat::U8 => {
                bytes.push((sample * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8)
            }
            SampleFormat::S16 => {
                let sample = (sample * 32767.0).round() as i16;
                bytes.extend_from_slice(bytemuck::bytes_of(&sample));
            }
            SampleFormat::S32 => {
                let sample = (sample as f64 * 2_147_483_647.0).round() as i32;
                bytes.extend_from_slice(bytemuck::bytes_of(&sample));
            }
            SampleFormat::F32 => bytes.extend_from_slice(bytemuck::bytes_of(&sample)),
        }
    }
    bytes
}

/// Weights from each input channel to each output channel.
struct ChannelMatrix {
    /// One row per output channel, one coefficient per input channel.
    coefficients: Vec<Vec<f32>>,
    in_channels: usize,
    out_channels: usize,
}

impl ChannelMatrix {
    fn new(in_channels: usize, out_channels: usize) -> ChannelMatrix {
        let mut coefficients = vec![vec![0.0; in_channels]; out_channels];
        if in_channels == 1 {
            // Mono is played back from every speaker.
            for row in &mut coefficients {
                row[0] = 1.0;
            }
        } else if out_channels <= in_channels {
            // Matching channels pass through, the extra inputs are spread
            // evenly over all outputs. Rows are normalized to avoid clipping.
            let extra = in_channels - out_channels;
            for (i, row) in coefficients.iter_mut().enumerate() {
                row[i] = 1.0;
                for coefficient in row.iter_mut().skip(out_channels) {
                    *coefficient = 1.0 / (out_channels * extra) as f32;
                }
                let sum: f32 = row.iter().sum();
                row.iter_mut().for_each(|coefficient| *coefficient /= sum);
            }
        } else {
            // Matching channels pass through, the extra outputs stay silent.
            for (i, row) in coefficients.iter_mut().enumerate().take(in_channels) {
                row[i] = 1.0;
            }
        }
        ChannelMatrix {
            coefficients,
            in_channels,
            out_channels,
        }
    }

    fn apply(&self, input: &[f32]) -> Vec<f32> {
        let mut output = Vec::with_capacity(input.len() / self.in_channels * self.out_channels);
        for frame in input.chunks_exact(self.in_channels) {
            for row in &self.coefficients {
                output.push(row.iter().zip(frame).map(|(c, s)| c * s).sum());
            }
        }
        output
    }
}

/// Linear interpolation between neighboring frames. Good enough for sound
/// effects, and cheap enough to redo for every sound on a device switch.
fn resample(input: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Vec<f32> {
    let in_frames = input.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }
    let out_frames = (in_frames as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;

    let mut output = Vec::with_capacity(out_frames * channels);
    for out_frame in 0..out_frames {
        let position = out_frame as f64 * step;
        let first = (position as usize).min(in_frames - 1);
        let second = (first + 1).min(in_frames - 1);
        let t = (position - first as f64).clamp(0.0, 1.0) as f32;
        for channel in 0..channels {
            let a = input[first * channels + channel];
            let b = input[second * channels + channel];
            output.push(a + (b - a) * t);
        }
    }
    output
}
