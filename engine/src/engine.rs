// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    cell::{Cell, Ref, RefCell, RefMut},
    collections::HashMap,
    env,
    ffi::c_void,
    path::{Path, PathBuf},
    ptr::NonNull,
    rc::Rc,
    slice, str,
    time::Duration,
};

use platform::{
    abi::{HostContext, LogLevel},
    AudioOutput, AudioSpec,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    audio_file::load_sound_file,
    hot_reload::{WatcherRegistry, DEFAULT_SETTLE_INTERVAL},
    mixer::{Mixer, SoundHandle, MAX_VOLUME},
    module_loader::{ModuleLoader, ModuleOpener, NativeOpener},
    Result,
};

/// Everything needed to start up an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The JSON manifest naming the game module, shaders, sounds, etc.
    pub manifest_path: PathBuf,
    /// Where copies of the game module are loaded from.
    pub staging_dir: PathBuf,
    /// The audio output device to open, None for the system default.
    pub audio_device: Option<String>,
    /// The spec to ask the audio device for.
    pub audio_spec: AudioSpec,
    /// See [`ChangeWatcher`](crate::hot_reload::ChangeWatcher).
    pub settle_interval: Duration,
    /// Initial volume, see [`Mixer::set_volume`].
    pub volume: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            manifest_path: PathBuf::from("data/config.json"),
            staging_dir: env::temp_dir().join("hot-reload-modules"),
            audio_device: None,
            audio_spec: AudioSpec::DEFAULT,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            volume: MAX_VOLUME as i32,
        }
    }
}

/// The engine state reachable by game modules through the [`HostContext`].
struct HostServices {
    mixer: Mixer,
    sounds: HashMap<String, SoundHandle>,
}

impl HostServices {
    fn play_sound(&mut self, name: &str, looped: bool) -> bool {
        match self.sounds.get(name) {
            Some(&handle) => self.mixer.play(handle, looped),
            None => {
                debug!("Tried to play unknown sound {name:?}.");
                false
            }
        }
    }
}

/// The top-level structure of the runtime, which owns the hot reloading
/// machinery, the audio mixer and the currently loaded game.
///
/// Created once in `main` and then driven by calling [`Engine::run_frame`]
/// once per iteration of the platform's main loop.
pub struct Engine {
    registry: WatcherRegistry,
    loader: ModuleLoader,
    services: Rc<RefCell<HostServices>>,
    /// Leaked from a [`Box`] in [`Engine::with_opener`], freed in the drop,
    /// after the game module has been unloaded. The `user_data` points to the
    /// `RefCell` inside `services`.
    host: NonNull<HostContext>,
    game_module: Option<String>,
    /// Set by the game module's change callback, and for the initial load.
    reload_requested: Rc<Cell<bool>>,
}

impl Engine {
    /// Loads the manifest and opens the audio device. The game module is
    /// loaded on the first frame after [`Engine::watch_game_module`].
    pub fn new(config: EngineConfig, output: Box<dyn AudioOutput>) -> Result<Engine> {
        Engine::with_opener(config, output, NativeOpener)
    }

    /// Like [`Engine::new`], with a different way of loading game modules.
    pub fn with_opener(
        config: EngineConfig,
        output: Box<dyn AudioOutput>,
        opener: impl ModuleOpener + 'static,
    ) -> Result<Engine> {
        let registry = WatcherRegistry::new(&config.manifest_path)?
            .with_settle_interval(config.settle_interval);
        let loader = ModuleLoader::with_opener(&config.staging_dir, opener);
        let mut mixer = Mixer::new(output, config.audio_device.as_deref(), config.audio_spec)?;
        mixer.set_volume(config.volume)?;

        let services = Rc::new(RefCell::new(HostServices {
            mixer,
            sounds: HashMap::new(),
        }));
        let host = Box::new(HostContext {
            user_data: Rc::as_ptr(&services) as *mut c_void,
            log: host_log,
            play_sound: host_play_sound,
        });

        Ok(Engine {
            registry,
            loader,
            services,
            host: NonNull::from(Box::leak(host)),
            game_module: None,
            reload_requested: Rc::new(Cell::new(false)),
        })
    }

    /// Makes the resource called `name` in the manifest the game module,
    /// which gets (re)loaded at the start of the next frame, and whenever
    /// the file changes after that.
    pub fn watch_game_module(&mut self, name: &str) -> Result<()> {
        let reload_requested = self.reload_requested.clone();
        self.registry.register(name, move |_| reload_requested.set(true))?;
        if let Some(previous) = self.game_module.replace(name.to_string()) {
            if previous != name {
                self.registry.unregister(&previous);
            }
        }
        self.reload_requested.set(true);
        Ok(())
    }

    /// Calls `hook` with the file's path whenever the resource called `name`
    /// in the manifest changes, e.g. to recompile a shader.
    pub fn on_resource_change(
        &mut self,
        name: &str,
        hook: impl FnMut(&Path) + 'static,
    ) -> Result<()> {
        self.registry.register(name, hook)
    }

    /// Decodes the sound file called `name` in the manifest, and adds it to
    /// the mixer under the same name, replacing any sound previously loaded
    /// under it.
    pub fn load_sound(&mut self, name: &str) -> Result<SoundHandle> {
        let path = self.registry.manifest().get(name)?;
        let sound = load_sound_file(path)?;
        let mut services = self.services.borrow_mut();
        let handle = services.mixer.add_sound(sound)?;
        if let Some(previous) = services.sounds.insert(name.to_string(), handle) {
            services.mixer.remove_sound(previous);
        }
        info!("Loaded sound {name} from {}.", path.display());
        Ok(handle)
    }

    /// Plays a sound loaded with [`Engine::load_sound`] from the start.
    /// Returns false if there's no sound called `name`.
    pub fn play_sound(&mut self, name: &str, looped: bool) -> bool {
        self.services.borrow_mut().play_sound(name, looped)
    }

    /// The audio mixer.
    pub fn mixer(&self) -> Ref<'_, Mixer> {
        Ref::map(self.services.borrow(), |services| &services.mixer)
    }

    /// The audio mixer, e.g. for changing the volume or the output device.
    pub fn mixer_mut(&mut self) -> RefMut<'_, Mixer> {
        RefMut::map(self.services.borrow_mut(), |services| &mut services.mixer)
    }

    /// The hot reloading registry, for inspecting the manifest.
    pub fn registry(&self) -> &WatcherRegistry {
        &self.registry
    }

    /// Returns true if a game module is currently loaded.
    pub fn has_game_module(&self) -> bool {
        self.loader.current().is_some()
    }

    /// Replaces the current game instance with a fresh one from the game
    /// module registered with [`Engine::watch_game_module`].
    pub fn reload_game_module(&mut self) -> Result<()> {
        let Some(name) = &self.game_module else {
            return Ok(());
        };
        let path = self.registry.manifest().get(name)?.to_path_buf();
        // Safety: the host context is freed only in our drop, after the
        // loader has unloaded the module.
        unsafe { self.loader.reload(&path, self.host) }?;
        Ok(())
    }

    fn game_module_settling(&self) -> bool {
        (self.game_module.as_deref()).is_some_and(|name| self.registry.is_settling(name))
    }

    /// Runs one frame: checks for changed files (running their callbacks),
    /// reloads the game module if it changed, and runs a frame of the game.
    ///
    /// Reload failures are logged and leave the engine without a game until
    /// the next successful reload, which is not considered fatal.
    pub fn run_frame(&mut self) {
        profiling::function_scope!();
        self.registry.poll_once();

        // A retried reload waits for the watcher to confirm the file is done
        // being written, the same as a reload triggered by a change.
        if self.reload_requested.get() && !self.game_module_settling() {
            self.reload_requested.set(false);
            match self.reload_game_module() {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    debug!("Game module not reloadable yet, retrying next frame: {err}");
                    self.reload_requested.set(true);
                }
                Err(err) => error!("Failed to reload the game module: {err}"),
            }
        }

        if let Some(module) = self.loader.current_mut() {
            // Safety: the host context is valid (see the field docs), and the
            // host services aren't borrowed outside of this call.
            unsafe { module.run_frame(self.host) };
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.loader.unload();
        // Safety: allocated with Box in Engine::with_opener, and the only
        // user of the pointer (the game module) is gone.
        drop(unsafe { Box::from_raw(self.host.as_ptr()) });
    }
}

unsafe extern "C" fn host_log(
    _user_data: *mut c_void,
    level: LogLevel,
    message: *const u8,
    len: usize,
) {
    // Safety: Host::log passes in the pointer and length of a live &str.
    let message = unsafe { slice::from_raw_parts(message, len) };
    let message = String::from_utf8_lossy(message);
    match level {
        LogLevel::Error => error!(target: "game", "{message}"),
        LogLevel::Warn => warn!(target: "game", "{message}"),
        LogLevel::Info => info!(target: "game", "{message}"),
        LogLevel::Debug => debug!(target: "game", "{message}"),
        LogLevel::Trace => trace!(target: "game", "{message}"),
    }
}

unsafe extern "C" fn host_play_sound(
    user_data: *mut c_void,
    name: *const u8,
    len: usize,
    looped: bool,
) -> bool {
    // Safety: Host::play_sound passes in the pointer and length of a live &str.
    let name = unsafe { slice::from_raw_parts(name, len) };
    let Ok(name) = str::from_utf8(name) else {
        return false;
    };
    // Safety: user_data is the RefCell in Engine::services, which outlives
    // every game instance.
    let services = unsafe { &*(user_data as *const RefCell<HostServices>) };
    let Ok(mut services) = services.try_borrow_mut() else {
        warn!("Game tried to play {name:?} while the engine was using the mixer.");
        return false;
    };
    services.play_sound(name, looped)
}
