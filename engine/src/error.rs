// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{io, path::PathBuf};

use platform::SampleFormat;
use thiserror::Error;

/// Shorthand for results with the engine's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong in the hot-reload runtime and the mixer.
///
/// None of these are fatal to the engine as a whole: they abort the operation
/// that returned them, and the caller decides whether to retry, log and move
/// on, or bail.
#[derive(Debug, Error)]
pub enum Error {
    /// The manifest file could be read, but its contents are not a flat JSON
    /// object of name-to-path strings.
    #[error("malformed manifest {path}: {source}")]
    MalformedManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The name isn't in the manifest.
    #[error("no resource named {name:?} in the manifest")]
    UnknownResource { name: String },

    /// A file could not be accessed. Usually transient, e.g. a file being
    /// replaced by a build step, so this is retried on the next poll.
    #[error("resource {path} is unavailable: {source}")]
    ResourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The module could not be loaded as a dynamic library at all.
    #[error("failed to load module {path}: {source}")]
    ModuleLoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The module is missing one of the required entry points.
    #[error("module {path} does not export {symbol:?}")]
    SymbolResolutionFailed { path: PathBuf, symbol: &'static str },

    /// The module's constructor did not return an instance.
    #[error("module {path} failed to construct a game instance")]
    InstanceConstructionFailed { path: PathBuf },

    /// Sound data couldn't be decoded or converted to the device's spec.
    #[error(
        "unsupported audio conversion from {from_format:?} ({from_channels} ch, {from_rate} Hz) \
         to {to_format:?} ({to_channels} ch, {to_rate} Hz)"
    )]
    UnsupportedFormatConversion {
        from_format: SampleFormat,
        from_channels: u8,
        from_rate: u32,
        to_format: SampleFormat,
        to_channels: u8,
        to_rate: u32,
    },

    /// A sound file's contents could not be decoded.
    #[error("failed to decode audio file {path}: {message}")]
    UndecodableAudio { path: PathBuf, message: String },

    /// The requested volume is outside of the device's range.
    #[error("volume {level} is outside of the supported range 0..={max}")]
    VolumeOutOfRange { level: i32, max: u8 },

    /// The platform failed to open an output device.
    #[error("failed to open audio device {name:?}: {source}")]
    DeviceUnavailable {
        name: Option<String>,
        #[source]
        source: platform::DeviceError,
    },
}

impl Error {
    /// Returns true for errors which are expected to go away on their own,
    /// and are worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ResourceUnavailable { .. })
    }
}
