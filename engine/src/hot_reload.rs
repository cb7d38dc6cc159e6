// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Detecting changes to the files the game is built from while it's running:
//! the game module itself, shaders, configuration.

mod manifest;
mod registry;
mod watcher;

pub use manifest::ManifestStore;
pub use registry::{ChangeCallback, WatcherRegistry};
pub use watcher::{ChangeWatcher, DEFAULT_SETTLE_INTERVAL};
