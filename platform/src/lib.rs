// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! This crate mainly revolves around the [`AudioOutput`] trait, which can be
//! implemented to provide the audio half of a "platform implementation" for
//! the engine, and the [`abi`] module, which defines the calling contract
//! between the host executable and hot-reloadable game modules.
//!
//! This is split off of the main engine crate so that game modules only need
//! to depend on this small crate, not the whole engine, and so that the engine
//! and the platform implementation can be compiled independently.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod abi;
mod audio;

pub use audio::*;
