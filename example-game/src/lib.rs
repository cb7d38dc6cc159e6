// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The example game, built as a dynamic library which the example host loads,
//! and reloads whenever it's rebuilt.
//!
//! Try changing [`BEEP_INTERVAL`] while the example is running.

use platform::{
    abi::{Game, Host, LogLevel},
    export_game,
};

/// How many frames to wait between beeps.
pub const BEEP_INTERVAL: u32 = 120;

/// Counts frames and beeps every now and then.
pub struct ExampleGame {
    frame: u32,
}

impl Game for ExampleGame {
    fn create(host: Host) -> Option<Self> {
        host.log(
            LogLevel::Info,
            &format!("Example game loaded, beeping every {BEEP_INTERVAL} frames."),
        );
        Some(ExampleGame { frame: 0 })
    }

    fn run_frame(&mut self, host: Host) {
        if self.frame % BEEP_INTERVAL == 0 && !host.play_sound("beep", false) {
            host.log(LogLevel::Debug, "No sound called \"beep\" has been loaded.");
        }
        self.frame = self.frame.wrapping_add(1);
    }
}

export_game!(ExampleGame);
