use crate::{
    cache::SOLIDITY_FILES_CACHE_FILENAME,
    error::{Result, SolcError, SolcIoError},
    utils,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

/// Where to find all files or where to write them
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectPathsConfig {
    /// Project root
    pub root: PathBuf,
    /// Path to the cache file
    pub cache: PathBuf,
    /// Where to store build artifacts
    pub artifacts: PathBuf,
    /// Where to store the build info files
    pub build_infos: PathBuf,
    /// Where to find sources
    pub sources: PathBuf,
    /// Where to find installed third-party packages
    pub node_modules: PathBuf,
}

impl ProjectPathsConfig {
    pub fn builder() -> ProjectPathsConfigBuilder {
        ProjectPathsConfigBuilder::default()
    }

    /// Creates a new hardhat style config instance which points to the canonicalized root path
    pub fn hardhat(root: impl AsRef<Path>) -> Result<Self> {
        let root = utils::canonicalize(root)?;
        Ok(Self::builder().sources(root.join("contracts")).build_with_root(root))
    }

    /// Creates a new config with the current directory as the root
    pub fn current_hardhat() -> Result<Self> {
        Self::hardhat(std::env::current_dir().map_err(|err| SolcError::io(err, "."))?)
    }

    /// Creates all configured dirs and files
    pub fn create_all(&self) -> std::result::Result<(), SolcIoError> {
        if let Some(parent) = self.cache.parent() {
            fs::create_dir_all(parent).map_err(|err| SolcIoError::new(err, parent))?;
        }
        fs::create_dir_all(&self.artifacts)
            .map_err(|err| SolcIoError::new(err, &self.artifacts))?;
        fs::create_dir_all(&self.build_infos)
            .map_err(|err| SolcIoError::new(err, &self.build_infos))?;
        fs::create_dir_all(&self.sources).map_err(|err| SolcIoError::new(err, &self.sources))?;
        Ok(())
    }

    /// Returns all solidity file paths under the project's configured `sources` dir
    pub fn input_files(&self) -> Vec<PathBuf> {
        utils::source_files(&self.sources)
    }

    /// Returns the source names of all input files
    pub fn input_source_names(&self) -> Vec<String> {
        self.input_files().iter().map(|file| self.source_name(file)).collect()
    }

    /// Returns the forward-slash source name of the given project file
    pub fn source_name(&self, file: &Path) -> String {
        utils::source_name(file, &self.root)
    }
}

impl fmt::Display for ProjectPathsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root: {}", self.root.display())?;
        writeln!(f, "contracts: {}", self.sources.display())?;
        writeln!(f, "artifacts: {}", self.artifacts.display())?;
        writeln!(f, "cache: {}", self.cache.display())?;
        writeln!(f, "node_modules: {}", self.node_modules.display())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProjectPathsConfigBuilder {
    root: Option<PathBuf>,
    cache: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    build_infos: Option<PathBuf>,
    sources: Option<PathBuf>,
    node_modules: Option<PathBuf>,
}

impl ProjectPathsConfigBuilder {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(utils::canonicalized(root));
        self
    }

    pub fn cache(mut self, cache: impl Into<PathBuf>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    pub fn artifacts(mut self, artifacts: impl Into<PathBuf>) -> Self {
        self.artifacts = Some(artifacts.into());
        self
    }

    pub fn build_infos(mut self, build_infos: impl Into<PathBuf>) -> Self {
        self.build_infos = Some(build_infos.into());
        self
    }

    pub fn sources(mut self, sources: impl Into<PathBuf>) -> Self {
        self.sources = Some(sources.into());
        self
    }

    pub fn node_modules(mut self, node_modules: impl Into<PathBuf>) -> Self {
        self.node_modules = Some(node_modules.into());
        self
    }

    pub fn build_with_root(self, root: impl Into<PathBuf>) -> ProjectPathsConfig {
        let root = utils::canonicalized(root);
        let artifacts = self.artifacts.unwrap_or_else(|| root.join("artifacts"));
        ProjectPathsConfig {
            cache: self
                .cache
                .unwrap_or_else(|| root.join("cache").join(SOLIDITY_FILES_CACHE_FILENAME)),
            build_infos: self.build_infos.unwrap_or_else(|| artifacts.join("build-info")),
            artifacts,
            sources: self.sources.unwrap_or_else(|| root.join("contracts")),
            node_modules: self.node_modules.unwrap_or_else(|| root.join("node_modules")),
            root,
        }
    }

    pub fn build(self) -> std::result::Result<ProjectPathsConfig, SolcIoError> {
        let root = self
            .root
            .clone()
            .map(Ok)
            .unwrap_or_else(std::env::current_dir)
            .map_err(|err| SolcIoError::new(err, "."))?;
        Ok(self.build_with_root(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardhat_layout_defaults() {
        let tmp = utils::tempdir("paths").unwrap();
        let root = tmp.path();
        let paths = ProjectPathsConfig::hardhat(root).unwrap();

        let root = utils::canonicalized(root);
        assert_eq!(paths.sources, root.join("contracts"));
        assert_eq!(paths.artifacts, root.join("artifacts"));
        assert_eq!(paths.build_infos, root.join("artifacts").join("build-info"));
        assert_eq!(paths.cache, root.join("cache").join(SOLIDITY_FILES_CACHE_FILENAME));
        assert_eq!(paths.node_modules, root.join("node_modules"));
    }

    #[test]
    fn source_names_use_forward_slashes() {
        let tmp = utils::tempdir("paths").unwrap();
        let paths = ProjectPathsConfig::hardhat(tmp.path()).unwrap();
        let file = paths.sources.join("tokens").join("A.sol");
        assert_eq!(paths.source_name(&file), "contracts/tokens/A.sol");
    }
}
