// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{ffi::c_void, path::Path};

use libloading::Library;

use crate::{Error, Result};

/// A loaded module. Dropping it unloads the module.
pub trait ModuleLibrary {
    /// Returns the address of the exported symbol called `name`, or None if
    /// there's no such symbol.
    fn symbol(&self, name: &str) -> Option<*const c_void>;
}

/// Something that can load modules from files, i.e. the platform's dynamic
/// linker, or a stand-in for it.
pub trait ModuleOpener {
    /// Loads the module at `path`.
    ///
    /// Note that this can run arbitrary code from the module (e.g. its static
    /// initializers), so the file should come from a trusted source, e.g. the
    /// game's own build.
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>>;
}

/// Loads modules with the platform's dynamic linker, via [`libloading`].
pub struct NativeOpener;

impl ModuleOpener for NativeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>> {
        // Safety: loading a library runs its initializers, which is as safe as
        // the library is. Game modules are built by the same developers as the
        // host, so they're trusted as much as the host's own code.
        let library = unsafe { Library::new(path) }.map_err(|source| Error::ModuleLoadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(NativeLibrary(library)))
    }
}

struct NativeLibrary(Library);

impl ModuleLibrary for NativeLibrary {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        // Safety: the symbol is read as a plain address, which is what a
        // pointer-typed symbol dereferences into. Interpreting the address as
        // something callable is up to the caller.
        let symbol = unsafe { self.0.get::<*const c_void>(name.as_bytes()) }.ok()?;
        let address = *symbol;
        (!address.is_null()).then_some(address)
    }
}
