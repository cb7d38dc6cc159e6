// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Loading, swapping and unloading the game module.

mod library;

use std::{
    ffi::{c_void, OsString},
    fs,
    mem::transmute,
    path::{Path, PathBuf},
    process,
    ptr::NonNull,
};

use platform::abi::{CreateFn, DestroyFn, GameInstance, HostContext, CREATE_SYMBOL, DESTROY_SYMBOL};
use tracing::{debug, info};

use crate::{Error, Result};

pub use library::{ModuleLibrary, ModuleOpener, NativeOpener};

/// A loaded game module and the game instance it created.
///
/// Dropping this destroys the instance, unloads the library, and deletes the
/// staged copy of the library file, in that order.
pub struct GameModule {
    instance: NonNull<GameInstance>,
    destroy: DestroyFn,
    /// Always Some until dropped, taken in the drop to unload the library
    /// before the staged file is removed.
    library: Option<Box<dyn ModuleLibrary>>,
    source_path: PathBuf,
    staged_path: PathBuf,
}

impl GameModule {
    /// The path the module was loaded from (not the staged copy).
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// The path of the copy of the module that is actually loaded.
    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    /// Runs one frame of the game.
    ///
    /// ### Safety
    ///
    /// `host` must point to a valid [`HostContext`] for the duration of the
    /// call, and nothing else may be accessing the host state behind it.
    pub unsafe fn run_frame(&mut self, host: NonNull<HostContext>) {
        profiling::function_scope!();
        let instance = self.instance.as_ptr();
        // Safety: the instance was created by this module and is destroyed
        // only in our drop, so the header is valid to read and call. The host
        // pointer is guaranteed by the caller.
        unsafe { ((*instance).run_frame)(instance, host.as_ptr()) };
    }
}

impl Drop for GameModule {
    fn drop(&mut self) {
        // Safety: the instance was returned by this library's create and
        // hasn't been destroyed yet, and the library is still loaded.
        unsafe { (self.destroy)(self.instance.as_ptr()) };
        drop(self.library.take());
        if let Err(err) = fs::remove_file(&self.staged_path) {
            debug!("Could not remove staged module {}: {err}", self.staged_path.display());
        }
        info!("Unloaded game module {}.", self.source_path.display());
    }
}

/// Owner of the currently loaded [`GameModule`], if any.
///
/// The library file is never loaded from where the build put it. It's first
/// copied into the staging directory under a name unique to this process and
/// reload, so that the build can overwrite the original while the copy is
/// loaded, and so that the platform's loader doesn't hand back the previous
/// (cached) library for the same path.
pub struct ModuleLoader {
    staging_dir: PathBuf,
    opener: Box<dyn ModuleOpener>,
    current: Option<GameModule>,
    generation: u64,
}

impl ModuleLoader {
    /// Creates a loader which loads modules with the platform's dynamic
    /// linker, staging them in `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>) -> ModuleLoader {
        ModuleLoader::with_opener(staging_dir, NativeOpener)
    }

    /// Creates a loader which loads modules with the given opener.
    pub fn with_opener(
        staging_dir: impl Into<PathBuf>,
        opener: impl ModuleOpener + 'static,
    ) -> ModuleLoader {
        ModuleLoader {
            staging_dir: staging_dir.into(),
            opener: Box::new(opener),
            current: None,
            generation: 0,
        }
    }

    /// The currently loaded module.
    pub fn current(&self) -> Option<&GameModule> {
        self.current.as_ref()
    }

    /// The currently loaded module.
    pub fn current_mut(&mut self) -> Option<&mut GameModule> {
        self.current.as_mut()
    }

    /// Destroys the current game instance and unloads its module, if there
    /// is one.
    pub fn unload(&mut self) {
        self.current = None;
    }

    /// Replaces the current module (if any) with a freshly loaded copy of the
    /// module at `path`, and creates a new game instance from it.
    ///
    /// The old instance is always destroyed and its library unloaded before
    /// the new library is loaded, so at most one instance exists at a time.
    /// If `path` doesn't exist, this fails without touching the old module.
    /// On any later failure, no module is loaded afterwards.
    ///
    /// ### Safety
    ///
    /// `host` must stay valid until the returned module is dropped (i.e.
    /// until the next `reload`, [`ModuleLoader::unload`], or the drop of this
    /// loader).
    pub unsafe fn reload(
        &mut self,
        path: &Path,
        host: NonNull<HostContext>,
    ) -> Result<&mut GameModule> {
        profiling::function_scope!();

        fs::metadata(path).map_err(|source| Error::ResourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(previous) = self.current.take() {
            drop(previous);
        }

        self.generation += 1;
        let staged_path = self.stage(path)?;
        let module = match load_staged(&*self.opener, path, &staged_path, host) {
            Ok(module) => module,
            Err(err) => {
                // The library, if it was opened, was already unloaded.
                let _ = fs::remove_file(&staged_path);
                return Err(err);
            }
        };

        info!(
            "Loaded game module {} (generation {}).",
            path.display(),
            self.generation,
        );
        Ok(self.current.insert(module))
    }

    fn stage(&self, path: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging_dir).map_err(|source| Error::ResourceUnavailable {
            path: self.staging_dir.clone(),
            source,
        })?;

        let mut file_name = path.file_stem().map(OsString::from).unwrap_or_else(|| "module".into());
        file_name.push(format!("-{}-{}", process::id(), self.generation));
        if let Some(extension) = path.extension() {
            file_name.push(".");
            file_name.push(extension);
        }
        let staged_path = self.staging_dir.join(file_name);

        fs::copy(path, &staged_path).map_err(|source| Error::ResourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Staged {} as {}.", path.display(), staged_path.display());
        Ok(staged_path)
    }
}

fn load_staged(
    opener: &dyn ModuleOpener,
    source_path: &Path,
    staged_path: &Path,
    host: NonNull<HostContext>,
) -> Result<GameModule> {
    let library = opener.open(staged_path)?;
    let resolve = |symbol: &'static str| -> Result<*const c_void> {
        library.symbol(symbol).ok_or_else(|| Error::SymbolResolutionFailed {
            path: source_path.to_path_buf(),
            symbol,
        })
    };
    let create = resolve(CREATE_SYMBOL)?;
    let destroy = resolve(DESTROY_SYMBOL)?;

    // Safety: game modules export these symbols as functions with exactly
    // these signatures, see platform::abi.
    let (create, destroy) = unsafe {
        (
            transmute::<*const c_void, CreateFn>(create),
            transmute::<*const c_void, DestroyFn>(destroy),
        )
    };

    // Safety: create is a CreateFn by the module contract, and the host
    // outlives the instance as promised to ModuleLoader::reload.
    let instance = unsafe { create(host.as_ptr()) };
    let Some(instance) = NonNull::new(instance) else {
        return Err(Error::InstanceConstructionFailed {
            path: source_path.to_path_buf(),
        });
    };

    Ok(GameModule {
        instance,
        destroy,
        library: Some(library),
        source_path: source_path.to_path_buf(),
        staged_path: staged_path.to_path_buf(),
    })
}
