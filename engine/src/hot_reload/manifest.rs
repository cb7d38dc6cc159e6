// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// The on-disk format: a flat JSON object mapping names to paths.
#[derive(Deserialize)]
#[serde(transparent)]
struct ManifestFile(BTreeMap<String, String>);

/// Mapping from logical resource names (e.g. "game", "fragment_shader") to
/// the files backing them, loaded from a JSON manifest file.
///
/// Relative paths in the manifest are relative to the manifest file's own
/// directory, so the same manifest works regardless of the working directory
/// of the process.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    entries: HashMap<String, PathBuf>,
}

impl ManifestStore {
    /// Reads and parses the manifest at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<ManifestStore> {
        let mut manifest = ManifestStore {
            path: path.into(),
            entries: HashMap::new(),
        };
        manifest.reload()?;
        Ok(manifest)
    }

    /// Re-reads the manifest file, replacing all entries if and only if the
    /// whole file parses. On error, the previous entries are kept.
    pub fn reload(&mut self) -> Result<()> {
        let contents =
            fs::read_to_string(&self.path).map_err(|source| Error::ResourceUnavailable {
                path: self.path.clone(),
                source,
            })?;
        let ManifestFile(raw_entries) =
            serde_json::from_str(&contents).map_err(|source| Error::MalformedManifest {
                path: self.path.clone(),
                source,
            })?;

        let base_dir = self.path.parent().unwrap_or(Path::new(""));
        self.entries = raw_entries
            .into_iter()
            .map(|(name, path)| (name, resolve(base_dir, Path::new(&path))))
            .collect();

        debug!(
            "Loaded {} resource paths from manifest {}.",
            self.entries.len(),
            self.path.display(),
        );
        Ok(())
    }

    /// Returns the resolved path of the resource called `name`.
    pub fn get(&self, name: &str) -> Result<&Path> {
        self.entries
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::UnknownResource {
                name: name.to_string(),
            })
    }

    /// The path of the manifest file itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all the resources in the manifest, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    // has_root also catches paths like "\foo" on Windows, which aren't
    // absolute (no drive letter) but shouldn't be joined either.
    if path.is_absolute() || path.has_root() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::Error;

    use super::ManifestStore;

    #[test]
    fn relative_paths_resolve_against_the_manifest_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("config.json");
        let absolute = dir.path().join("elsewhere").join("game.so");
        fs::write(
            &manifest_path,
            format!(
                r#"{{ "shader": "shaders/frag.glsl", "game": {:?} }}"#,
                absolute.to_str().unwrap(),
            ),
        )
        .unwrap();

        let manifest = ManifestStore::load(&manifest_path).unwrap();
        assert_eq!(
            dir.path().join("shaders/frag.glsl"),
            manifest.get("shader").unwrap(),
        );
        assert_eq!(absolute, manifest.get("game").unwrap());
    }

    #[test]
    fn unparseable_edit_keeps_the_previous_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("config.json");
        fs::write(&manifest_path, r#"{ "a": "a.txt" }"#).unwrap();
        let mut manifest = ManifestStore::load(&manifest_path).unwrap();

        fs::write(&manifest_path, r#"{ "a": "a2.txt", "b": "#).unwrap();
        assert!(matches!(
            manifest.reload(),
            Err(Error::MalformedManifest { .. })
        ));
        fs::write(&manifest_path, r#"{ "a": 5 }"#).unwrap();
        assert!(matches!(
            manifest.reload(),
            Err(Error::MalformedManifest { .. })
        ));
        fs::write(&manifest_path, r#"["a.txt"]"#).unwrap();
        assert!(matches!(
            manifest.reload(),
            Err(Error::MalformedManifest { .. })
        ));

        assert_eq!(dir.path().join("a.txt"), manifest.get("a").unwrap());
        assert!(matches!(
            manifest.get("b"),
            Err(Error::UnknownResource { .. })
        ));
    }

    #[test]
    fn reload_replaces_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("config.json");
        fs::write(&manifest_path, r#"{ "a": "a.txt", "b": "b.txt" }"#).unwrap();
        let mut manifest = ManifestStore::load(&manifest_path).unwrap();

        fs::write(&manifest_path, r#"{ "b": "new_b.txt" }"#).unwrap();
        manifest.reload().unwrap();

        assert!(
            manifest.get("a").is_err(),
            "a resource removed from the manifest should not be found anymore",
        );
        assert_eq!(dir.path().join("new_b.txt"), manifest.get("b").unwrap());
        assert_eq!(vec!["b"], manifest.names().collect::<Vec<_>>());
    }

    #[test]
    fn missing_manifest_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = ManifestStore::load(dir.path().join("nope.json"));
        assert!(matches!(result, Err(Error::ResourceUnavailable { .. })));
    }
}
