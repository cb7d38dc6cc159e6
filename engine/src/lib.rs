// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The runtime core of the engine: hot reloading of the game module and other
//! resources, and the audio mixer.
//!
//! Platform implementations create an [`Engine`] with their
//! [`AudioOutput`](platform::AudioOutput) and call [`Engine::run_frame`] once
//! per iteration of their main loop.

pub mod audio_file;
mod engine;
mod error;
pub mod hot_reload;
pub mod mixer;
pub mod module_loader;
#[cfg(test)]
mod test_platform;

pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
