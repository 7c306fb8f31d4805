//! Support for the on-disk incremental build cache

use crate::{
    artifact_output::ArtifactStore,
    error::{Result, SolcError},
    planner::CompilerConfig,
    resolver::ResolvedFile,
    utils,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// `_format` tag of the cache file schema this version reads and writes
pub const CACHE_FORMAT_VERSION: &str = "solbuild-cache-1";

/// The file name of the default cache file
pub const SOLIDITY_FILES_CACHE_FILENAME: &str = "solidity-files-cache.json";

/// The cache of a whole project, one entry per source file keyed by its absolute path.
///
/// The cache is read once at the start of a build, mutated in memory while jobs complete and
/// written back atomically at the end. A cache file written by a different schema version, or one
/// that fails to parse, is treated as empty: stale caches cost a recompile, never a build.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BuildCache {
    #[serde(rename = "_format")]
    pub format: String,
    pub files: BTreeMap<PathBuf, CacheEntry>,
}

impl Default for BuildCache {
    fn default() -> Self {
        Self { format: CACHE_FORMAT_VERSION.to_string(), files: BTreeMap::new() }
    }
}

impl BuildCache {
    /// Reads the cache file from the given path.
    ///
    /// Never fails: a missing, unreadable or forward-incompatible cache yields an empty one.
    pub fn read(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::trace!("no usable cache at \"{}\": {}", path.display(), err);
                return Self::default()
            }
        };
        match serde_json::from_str::<BuildCache>(&content) {
            Ok(cache) if cache.format == CACHE_FORMAT_VERSION => cache,
            Ok(cache) => {
                tracing::trace!(
                    "ignoring cache with unknown format \"{}\" at \"{}\"",
                    cache.format,
                    path.display()
                );
                Self::default()
            }
            Err(err) => {
                tracing::trace!("failed to parse cache at \"{}\": {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Writes the cache as json to the given path, atomically: the content goes to a temporary
    /// file in the same directory first and is moved into place afterwards.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .ok_or_else(|| SolcError::msg(format!("invalid cache path \"{}\"", path.display())))?;
        fs::create_dir_all(dir).map_err(|err| SolcError::io(err, dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|err| SolcError::io(err, dir))?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.persist(path).map_err(|err| SolcError::io(err.error, path))?;
        tracing::trace!("wrote cache with {} entries to \"{}\"", self.files.len(), path.display());
        Ok(())
    }

    /// Returns the entry for the given absolute path
    pub fn entry(&self, file: impl AsRef<Path>) -> Option<&CacheEntry> {
        self.files.get(file.as_ref())
    }

    /// Inserts an entry for the given file
    pub fn insert(&mut self, file: impl Into<PathBuf>, entry: CacheEntry) {
        self.files.insert(file.into(), entry);
    }

    /// Returns true if the file needs to be compiled again, because any of: no entry exists, the
    /// stored content hash differs, or (if provided) the stored compiler config differs.
    ///
    /// The config is only passed for files that emit artifacts: a dependency compiled under a
    /// different config but with unchanged content does not invalidate on its own.
    pub fn has_file_changed(
        &self,
        file: impl AsRef<Path>,
        content_hash: &str,
        config: Option<&CompilerConfig>,
    ) -> bool {
        let Some(entry) = self.files.get(file.as_ref()) else { return true };
        if entry.content_hash != content_hash {
            return true
        }
        if let Some(config) = config {
            if config != &entry.solc_config {
                return true
            }
        }
        false
    }

    /// Removes all entries of files that no longer exist on disk
    pub fn remove_missing_files(&mut self) {
        self.files.retain(|file, _| file.exists())
    }

    /// Drops every entry that lists an artifact which is missing from the artifact store.
    ///
    /// This compensates for artifacts deleted behind the driver's back: the owning source file
    /// loses its entry and is recompiled on the next build.
    pub fn invalidate_missing_artifacts(&mut self, store: &dyn ArtifactStore) {
        self.files.retain(|file, entry| {
            let complete = entry.artifacts.iter().all(|contract| {
                store.artifact_exists(&utils::fully_qualified_name(&entry.source_name, contract))
            });
            if !complete {
                tracing::trace!(
                    "dropping cache entry for \"{}\", at least one artifact is missing",
                    file.display()
                );
            }
            complete
        })
    }
}

/// A cache entry of a single file
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// the last modification time of this file
    pub last_modification_date: u64,
    pub content_hash: String,
    pub source_name: String,
    pub solc_config: CompilerConfig,
    pub imports: Vec<String>,
    pub version_pragmas: Vec<String>,
    /// names of the contracts whose artifacts were emitted for this file
    pub artifacts: Vec<String>,
}

impl CacheEntry {
    /// Creates the entry for a freshly compiled file
    pub fn new(file: &ResolvedFile, config: &CompilerConfig, artifacts: Vec<String>) -> Self {
        Self {
            last_modification_date: file.last_modification_date,
            content_hash: file.content_hash(),
            source_name: file.source_name.clone(),
            solc_config: config.clone(),
            imports: file.imports.clone(),
            version_pragmas: file.version_pragmas.clone(),
            artifacts,
        }
    }
}
