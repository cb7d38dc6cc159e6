// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

mod cli;

#[cfg(feature = "sdl2")]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use engine::{Engine, EngineConfig};
    use platform_sdl2::Sdl2Platform;
    use tracing::{info, warn};

    #[cfg(feature = "profile")]
    profiling::tracy_client::Client::start();

    let opts = cli::options().run();
    tracing_subscriber::fmt()
        .with_max_level(opts.verbosity_level)
        .init();

    let platform = Sdl2Platform::new("example game")
        .map_err(anyhow::Error::msg)
        .context("Failed to initialize SDL")?;
    let config = EngineConfig {
        manifest_path: opts.config_path,
        staging_dir: opts.staging_dir,
        audio_device: opts.audio_device,
        volume: opts.volume,
        ..EngineConfig::default()
    };
    let mut engine =
        Engine::new(config, platform.audio_output()).context("Failed to start the engine")?;

    engine
        .watch_game_module("game")
        .context("The manifest should name the game module \"game\"")?;

    let shaders = (engine.registry().manifest().names())
        .filter(|name| name.ends_with("_shader"))
        .map(str::to_string)
        .collect::<Vec<_>>();
    for shader in shaders {
        let name = shader.clone();
        engine
            .on_resource_change(&shader, move |path| {
                // Shaders are compiled by the renderer, this only reports the change.
                info!("Shader {name} changed: {}", path.display());
            })
            .with_context(|| format!("Failed to watch shader {shader}"))?;
    }

    for sound in &opts.sounds {
        if let Err(err) = engine.load_sound(sound) {
            warn!("Could not load sound {sound}: {err}");
        }
    }

    let devices = engine.mixer().device_names();
    info!("Available audio devices: {devices:?}");

    platform
        .run_game_loop(&mut engine)
        .map_err(anyhow::Error::msg)
        .context("The game loop failed")
}

#[cfg(not(any(feature = "sdl2")))]
fn main() {
    compile_error!("at least one of the following platform features is required: 'sdl2'");
}
