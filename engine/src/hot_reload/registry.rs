// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::Result;

use super::{ChangeWatcher, ManifestStore, DEFAULT_SETTLE_INTERVAL};

/// Called with the changed file's path when a watched resource has finished
/// changing.
pub type ChangeCallback = Box<dyn FnMut(&Path)>;

struct WatchedResource {
    name: String,
    watcher: ChangeWatcher,
    on_change: ChangeCallback,
}

/// The hot reloading facade: a manifest of named resources, and callbacks to
/// run when those resources change on disk.
///
/// Driven by calling [`WatcherRegistry::poll_once`] once per frame from the
/// main loop. Everything happens synchronously on that thread, including the
/// callbacks.
pub struct WatcherRegistry {
    manifest: ManifestStore,
    manifest_watcher: ChangeWatcher,
    /// In registration order, which is also the order they're polled in.
    resources: Vec<WatchedResource>,
    settle_interval: Duration,
}

impl WatcherRegistry {
    /// Loads the manifest at `manifest_path` and starts watching it for
    /// changes.
    pub fn new(manifest_path: impl Into<PathBuf>) -> Result<WatcherRegistry> {
        let manifest = ManifestStore::load(manifest_path)?;
        let manifest_watcher = ChangeWatcher::new(manifest.path());
        Ok(WatcherRegistry {
            manifest,
            manifest_watcher,
            resources: Vec::new(),
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        })
    }

    /// Sets the settle interval of the manifest's watcher and of every
    /// resource registered after this. See [`ChangeWatcher`].
    pub fn with_settle_interval(mut self, settle_interval: Duration) -> WatcherRegistry {
        self.settle_interval = settle_interval;
        self.manifest_watcher = self.manifest_watcher.with_settle_interval(settle_interval);
        self
    }

    /// The manifest, as of the last successful (re)load.
    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    /// Starts watching the resource called `name` in the manifest, calling
    /// `on_change` whenever its file has finished changing.
    ///
    /// The file's current state counts as already seen, so this doesn't cause
    /// a call on the next poll. Registering the same name again replaces the
    /// previous callback.
    pub fn register(&mut self, name: &str, on_change: impl FnMut(&Path) + 'static) -> Result<()> {
        let path = self.manifest.get(name)?;
        let resource = WatchedResource {
            name: name.to_string(),
            watcher: ChangeWatcher::new(path).with_settle_interval(self.settle_interval),
            on_change: Box::new(on_change),
        };
        debug!("Watching {name} at {}.", path.display());

        if let Some(existing) = self.resources.iter_mut().find(|r| r.name == name) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
        Ok(())
    }

    /// Stops watching the resource, returning false if it wasn't registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let len_before = self.resources.len();
        self.resources.retain(|resource| resource.name != name);
        self.resources.len() != len_before
    }

    /// Returns true if `name` has been registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.resources.iter().any(|resource| resource.name == name)
    }

    /// Returns true if the resource called `name` has changed recently, and
    /// the change hasn't been confirmed yet. False for unregistered names.
    pub fn is_settling(&self, name: &str) -> bool {
        (self.resources.iter())
            .find(|resource| resource.name == name)
            .is_some_and(|resource| resource.watcher.is_settling())
    }

    /// Checks the manifest and every registered resource for changes, calling
    /// the callbacks of the resources which changed.
    ///
    /// A changed manifest is reloaded first, which only affects the paths
    /// used by later registrations. Errors are logged and retried on the next
    /// call, they don't stop other resources from being checked.
    ///
    /// Must not be called from within a callback.
    pub fn poll_once(&mut self) {
        profiling::function_scope!();

        match self.manifest_watcher.poll() {
            Ok(true) => match self.manifest.reload() {
                Ok(()) => info!("Reloaded manifest {}.", self.manifest.path().display()),
                Err(err) => warn!("Keeping the previous manifest: {err}"),
            },
            Ok(false) => {}
            Err(err) => debug!("Could not check the manifest for changes: {err}"),
        }

        for resource in &mut self.resources {
            match resource.watcher.poll() {
                Ok(true) => {
                    info!("Resource {} changed, reloading.", resource.name);
                    (resource.on_change)(resource.watcher.path());
                }
                Ok(false) => {}
                Err(err) => debug!("Could not check {} for changes: {err}", resource.name),
            }
        }
    }
}
