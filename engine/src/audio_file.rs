// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Decoding sound files into [`SoundBuffer`]s.

use std::{fs::File, io::ErrorKind, path::Path};

use platform::{AudioSpec, SampleFormat};
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::DecoderOptions,
        errors::Error as SymphoniaError,
        formats::FormatOptions,
        io::{MediaSourceStream, MediaSourceStreamOptions},
        meta::MetadataOptions,
        probe::Hint,
    },
    default,
};
use tracing::{debug, trace};

use crate::{mixer::SoundBuffer, Error, Result};

/// Reads the default track of the audio file at `path` into signed 16-bit
/// samples, at the file's own sample rate and channel count.
///
/// Any format symphonia has been built with is supported, which by default
/// includes at least WAV, FLAC and Ogg Vorbis.
pub fn load_sound_file(path: &Path) -> Result<SoundBuffer> {
    profiling::function_scope!();
    debug!("Reading audio data from: {}", path.display());
    let undecodable = |message: String| Error::UndecodableAudio {
        path: path.to_path_buf(),
        message,
    };

    let codecs = default::get_codecs();
    let probe = default::get_probe();

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().map(|s| s.to_string_lossy()) {
        hint.with_extension(&extension);
    }

    let file = File::open(path).map_err(|source| Error::ResourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());
    let mut source = probe
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|err| undecodable(format!("could not recognize the audio format: {err}")))?;

    let track = source
        .format
        .default_track()
        .ok_or_else(|| undecodable("the file does not have any audio tracks".to_string()))?;
    let track_id = track.id;
    let mut decoder = codecs
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| undecodable(format!("no decoder for the audio: {err}")))?;

    let mut spec = None;
    let mut samples: Vec<i16> = Vec::new();
    loop {
        let packet = match source.format.next_packet() {
            Ok(packet) => packet,

            // Symphonia signals the end of the stream with an EOF error.
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,

            // These are recoverable according to Decode::decoder docs.
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::ResetRequired) => {
                samples.clear();
                spec = None;
                decoder = codecs
                    .make(decoder.codec_params(), &DecoderOptions::default())
                    .map_err(|err| undecodable(format!("could not recreate the decoder: {err}")))?;
                continue;
            }

            Err(err) => return Err(undecodable(format!("failed to read an audio packet: {err}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                debug!("Skipping an undecodable audio packet in {}: {err}", path.display());
                continue;
            }
            Err(err) => return Err(undecodable(format!("failed to decode audio: {err}"))),
        };
        trace!("Decoded audio data, {} frames of: {:?}", decoded.frames(), decoded.spec());

        let signal_spec = *decoded.spec();
        let packet_spec = AudioSpec {
            sample_rate: signal_spec.rate,
            channels: u8::try_from(signal_spec.channels.count())
                .map_err(|_| undecodable("too many audio channels".to_string()))?,
            format: SampleFormat::S16,
        };
        match spec {
            None => spec = Some(packet_spec),
            Some(spec) if spec != packet_spec => {
                return Err(undecodable(format!(
                    "the audio format changes mid-stream from {spec:?} to {packet_spec:?}",
                )));
            }
            Some(_) => {}
        }

        let mut interleaved = SampleBuffer::<i16>::new(decoded.capacity() as u64, signal_spec);
        interleaved.copy_interleaved_ref(decoded);
        samples.extend_from_slice(interleaved.samples());
    }

    let spec = spec.ok_or_else(|| undecodable("the file does not contain any audio".to_string()))?;
    debug!(
        "Read {} frames of {:?} from {}.",
        samples.len() / spec.channels.max(1) as usize,
        spec,
        path.display(),
    );
    Ok(SoundBuffer::new(spec, bytemuck::cast_slice::<i16, u8>(&samples)))
}
