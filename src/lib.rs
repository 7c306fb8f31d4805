#![doc = include_str!("../README.md")]

pub mod artifact_output;
pub mod artifacts;
pub mod buildinfo;
pub mod cache;
mod compile;
mod config;
pub mod error;
pub mod graph;
pub mod planner;
pub mod report;
pub mod resolver;
pub mod utils;

/// Utilities for creating, mocking and testing of (temporary) projects
#[cfg(feature = "project-util")]
pub mod project_util;

pub use artifact_output::{ArtifactStore, DiskArtifacts};
pub use artifacts::{CompilerInput, CompilerOutput, Severity};
pub use compile::{
    install::Installer, project::ProjectCompileOutput, project::ProjectCompiler, Compiler,
    CompilerSupplier, Solc, SolcBuild,
};
pub use config::{ProjectPathsConfig, ProjectPathsConfigBuilder};
pub use error::{Result, SolcError, SolcIoError};
pub use graph::DependencyGraph;
pub use planner::{CompilationJob, CompilerConfig, JobCreationError, JobCreationErrors};
pub use resolver::{NodeModulesLookup, PackageLookup, ResolvedFile, Resolver};

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// A cooperative cancellation handle.
///
/// Cloned into the caller's hands before a long build, checked by the pipeline at every
/// suspension point. Cancelling never corrupts on-disk state: the cache is written atomically at
/// the very end of a build only.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the build this token was handed to
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SolcError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Represents a project workspace and handles compiling of all contracts in that workspace.
pub struct Project<T: ArtifactStore = DiskArtifacts> {
    /// The layout of the project
    pub paths: ProjectPathsConfig,
    /// The compiler configurations jobs may be assigned to
    pub compilers: Vec<CompilerConfig>,
    /// Per source name compiler overrides
    pub overrides: BTreeMap<String, CompilerConfig>,
    /// Whether caching is enabled
    pub cached: bool,
    /// Whether writing artifacts to disk is disabled
    pub no_artifacts: bool,
    /// Whether progress reporting is suppressed
    pub quiet: bool,
    /// How to persist artifacts and build infos
    artifacts: T,
    /// Where compilers come from
    supplier: Box<dyn CompilerSupplier>,
    cancel: CancelToken,
}

impl<T: ArtifactStore> fmt::Debug for Project<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("paths", &self.paths)
            .field("compilers", &self.compilers)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Convenience function to call `ProjectBuilder::default()`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use solbuild::Project;
    /// let project = Project::builder().build().unwrap();
    /// ```
    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }
}

impl<T: ArtifactStore> Project<T> {
    /// Returns the path to the artifacts directory
    pub fn artifacts_path(&self) -> &PathBuf {
        &self.paths.artifacts
    }

    /// Returns the path to the sources directory
    pub fn sources_path(&self) -> &PathBuf {
        &self.paths.sources
    }

    /// Returns the path to the cache file
    pub fn cache_path(&self) -> &PathBuf {
        &self.paths.cache
    }

    /// Returns the configured artifact store
    pub fn artifacts_handler(&self) -> &T {
        &self.artifacts
    }

    /// Returns the configured compiler supplier
    pub fn supplier(&self) -> &dyn CompilerSupplier {
        &*self.supplier
    }

    /// Returns a handle that cancels this project's running build when triggered
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Attempts to compile all contracts found under the configured sources path.
    ///
    /// If caching is enabled, everything that is up to date is skipped; a build with no changed
    /// files performs zero compiler invocations.
    ///
    /// NOTE: this does not fail on compiler diagnostics, see
    /// [`ProjectCompileOutput::has_compiler_errors()`].
    #[tracing::instrument(skip_all, name = "compile")]
    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        ProjectCompiler::new(self)?.compile()
    }

    /// Removes the project's artifacts and cache file
    pub fn cleanup(&self) -> std::result::Result<(), SolcIoError> {
        tracing::trace!("clean up project");
        if self.cache_path().exists() {
            fs::remove_file(self.cache_path())
                .map_err(|err| SolcIoError::new(err, self.cache_path()))?;
            tracing::trace!("removed cache file \"{}\"", self.cache_path().display());
        }
        if self.paths.artifacts.exists() {
            fs::remove_dir_all(self.artifacts_path())
                .map_err(|err| SolcIoError::new(err, self.artifacts_path().clone()))?;
            tracing::trace!("removed artifacts dir \"{}\"", self.artifacts_path().display());
        }
        Ok(())
    }
}

pub struct ProjectBuilder<T: ArtifactStore = DiskArtifacts> {
    paths: Option<ProjectPathsConfig>,
    compilers: Vec<CompilerConfig>,
    overrides: BTreeMap<String, CompilerConfig>,
    /// Whether caching is enabled, default is true.
    cached: bool,
    /// Whether writing artifacts to disk is disabled, default is false.
    no_artifacts: bool,
    quiet: bool,
    artifacts: Option<T>,
    supplier: Option<Box<dyn CompilerSupplier>>,
}

impl<T: ArtifactStore> ProjectBuilder<T> {
    #[must_use]
    pub fn paths(mut self, paths: ProjectPathsConfig) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Adds a compiler configuration jobs may be assigned to
    #[must_use]
    pub fn compiler(mut self, config: CompilerConfig) -> Self {
        self.compilers.push(config);
        self
    }

    /// Adds multiple compiler configurations
    #[must_use]
    pub fn compilers<I>(mut self, configs: I) -> Self
    where
        I: IntoIterator<Item = CompilerConfig>,
    {
        self.compilers.extend(configs);
        self
    }

    /// Pins the compiler configuration of a single file
    #[must_use]
    pub fn compiler_override(
        mut self,
        source_name: impl Into<String>,
        config: CompilerConfig,
    ) -> Self {
        self.overrides.insert(source_name.into(), config);
        self
    }

    /// Disables cached builds
    #[must_use]
    pub fn ephemeral(mut self) -> Self {
        self.cached = false;
        self
    }

    /// Disables writing artifacts to disk
    #[must_use]
    pub fn no_artifacts(mut self) -> Self {
        self.no_artifacts = true;
        self
    }

    /// Suppresses all reporter events
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Sets where compilers are acquired from
    #[must_use]
    pub fn supplier(mut self, supplier: Box<dyn CompilerSupplier>) -> Self {
        self.supplier = Some(supplier);
        self
    }

    /// Set an arbitrary [ArtifactStore] implementation
    pub fn artifacts<A: ArtifactStore>(self, store: A) -> ProjectBuilder<A> {
        let ProjectBuilder {
            paths,
            compilers,
            overrides,
            cached,
            no_artifacts,
            quiet,
            supplier,
            ..
        } = self;
        ProjectBuilder {
            paths,
            compilers,
            overrides,
            cached,
            no_artifacts,
            quiet,
            artifacts: Some(store),
            supplier,
        }
    }

    /// Builds the project, requires an explicitly configured artifact store
    pub fn try_build(self) -> Result<Project<T>> {
        let Self { paths, compilers, overrides, cached, no_artifacts, quiet, artifacts, supplier } =
            self;

        let paths = paths.map(Ok).unwrap_or_else(ProjectPathsConfig::current_hardhat)?;
        let artifacts =
            artifacts.ok_or_else(|| SolcError::msg("no artifact store configured"))?;
        let supplier: Box<dyn CompilerSupplier> = match supplier {
            Some(supplier) => supplier,
            None => Box::new(Installer::new()?),
        };

        Ok(Project {
            paths,
            compilers,
            overrides,
            cached,
            no_artifacts,
            quiet,
            artifacts,
            supplier,
            cancel: CancelToken::new(),
        })
    }
}

impl ProjectBuilder<DiskArtifacts> {
    /// Builds the project with the default on-disk artifact layout
    pub fn build(mut self) -> Result<Project<DiskArtifacts>> {
        if self.artifacts.is_none() {
            let paths = match self.paths.as_ref() {
                Some(paths) => paths.clone(),
                None => ProjectPathsConfig::current_hardhat()?,
            };
            self.paths = Some(paths.clone());
            self.artifacts = Some(DiskArtifacts::new(paths.artifacts, paths.build_infos));
        }
        self.try_build()
    }
}

impl<T: ArtifactStore> Default for ProjectBuilder<T> {
    fn default() -> Self {
        Self {
            paths: None,
            compilers: Vec::new(),
            overrides: BTreeMap::new(),
            cached: true,
            no_artifacts: false,
            quiet: false,
            artifacts: None,
            supplier: None,
        }
    }
}
