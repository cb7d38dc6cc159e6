// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{env, path::PathBuf};

use bpaf::{batteries::verbose_by_slice, construct, long, OptionParser, Parser};
use engine::mixer::MAX_VOLUME;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone)]
pub struct Options {
    pub verbosity_level: LevelFilter,
    pub config_path: PathBuf,
    pub staging_dir: PathBuf,
    pub audio_device: Option<String>,
    pub volume: i32,
    pub sounds: Vec<String>,
}

pub fn options() -> OptionParser<Options> {
    let verbosity_level = verbose_by_slice(
        3,
        [
            LevelFilter::OFF,
            LevelFilter::ERROR,
            LevelFilter::WARN,
            LevelFilter::INFO,
            LevelFilter::DEBUG,
            LevelFilter::TRACE,
        ],
    );

    let config_path = long("config")
        .help("The manifest naming the game module and the other hot reloaded files")
        .argument("FILE")
        .complete_shell(bpaf::ShellComp::File {
            mask: Some("*.json"),
        })
        .fallback(PathBuf::from("data/config.json"))
        .debug_fallback();

    let staging_dir = long("staging-dir")
        .help("Where to copy the game module to before loading it")
        .argument("DIR")
        .complete_shell(bpaf::ShellComp::Dir { mask: None })
        .fallback_with(|| Ok::<_, String>(env::temp_dir().join("hot-reload-modules")));

    let audio_device = long("device")
        .help("The audio output device to play sounds on, instead of the default one")
        .argument("NAME")
        .optional();

    let volume = long("volume")
        .help("Volume of all sounds, from 0 to 128")
        .argument::<i32>("N")
        .guard(
            |volume| (0..=MAX_VOLUME as i32).contains(volume),
            "the volume must be between 0 and 128",
        )
        .fallback(MAX_VOLUME as i32)
        .display_fallback();

    let sounds = long("sound")
        .help("Name of a sound in the manifest to load at startup, can be repeated")
        .argument("NAME")
        .many();

    construct!(Options {
        verbosity_level,
        config_path,
        staging_dir,
        audio_device,
        volume,
        sounds,
    })
    .to_options()
    .descr("Runs the example game, reloading it whenever it's rebuilt")
}
