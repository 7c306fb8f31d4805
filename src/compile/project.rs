//! Manages compiling of a `Project`
//!
//! The compilation of a project is performed in several steps.
//!
//! First all root files are read and resolved into the [DependencyGraph], which holds the
//! relationships between the files. The graph's connected components are then partitioned into
//! [CompilationJob]s: one compiler configuration per rooted file, merged whenever two jobs use a
//! value-equal configuration.
//!
//! Before anything is compiled the cache decides which jobs can be skipped altogether. A job is
//! dropped if every one of its artifact-emitting files is clean: its content hash and compiler
//! config match the cache entry, all its listed artifacts still exist on disk and no transitive
//! dependency changed its content. A job with a single dirty emitter keeps its full input set so
//! the compiler always sees every import.
//!
//! The surviving jobs run strictly sequentially in ascending compiler version order, which keeps
//! the progress output and the artifact writes deterministic. Each job acquires its compiler
//! through the configured [crate::CompilerSupplier], feeds it the standard JSON input and
//! collects the output. Artifacts and build-info records are handed to the [ArtifactStore], the
//! cache is
//! updated in memory and flushed atomically once at the very end, so a cancelled or failed build
//! never leaves a half-written cache behind.

use crate::{
    artifact_output::ArtifactStore,
    artifacts::{CompilerInput, CompilerOutput, Sources},
    buildinfo::RawBuildInfo,
    cache::{BuildCache, CacheEntry},
    error::Result,
    graph::DependencyGraph,
    planner::{self, CompilationJob, CompilerConfig, Planner},
    report,
    resolver::{NodeModulesLookup, Resolver},
    Project,
};
use semver::Version;
use std::{collections::BTreeMap, fmt, path::PathBuf};

#[derive(Debug)]
pub struct ProjectCompiler<'a, T: ArtifactStore> {
    project: &'a Project<T>,
    /// Contains the relationship of the source files and their imports
    graph: DependencyGraph,
}

impl<'a, T: ArtifactStore> ProjectCompiler<'a, T> {
    /// Bootstraps the compilation process by resolving the project's sources and all their
    /// imports
    pub fn new(project: &'a Project<T>) -> Result<Self> {
        Self::with_sources(project, project.paths.input_source_names())
    }

    /// Bootstraps the compilation process for the given root files
    pub fn with_sources(project: &'a Project<T>, roots: Vec<String>) -> Result<Self> {
        project.cancel_token().check()?;
        let resolver = Resolver::new(
            project.paths.root.clone(),
            Box::new(NodeModulesLookup::new(project.paths.node_modules.clone())),
        );
        let graph = DependencyGraph::resolve(&resolver, &roots)?;
        Ok(Self { project, graph })
    }

    /// Compiles all the sources of the `Project`, reusing unchanged artifacts
    ///
    /// # Example
    ///
    /// ```no_run
    /// use solbuild::Project;
    ///
    /// let project = Project::builder().build().unwrap();
    /// let output = project.compile().unwrap();
    /// ```
    pub fn compile(self) -> Result<ProjectCompileOutput> {
        // drive the compiler statemachine to completion
        self.preprocess()?.compile()?.write_artifacts()?.write_cache()
    }

    /// Loads the cache, plans the jobs and filters out everything that is up to date
    fn preprocess(self) -> Result<PreprocessedState<'a, T>> {
        let Self { project, graph } = self;
        project.cancel_token().check()?;

        let mut cache = if project.cached {
            BuildCache::read(&project.paths.cache)
        } else {
            BuildCache::default()
        };
        cache.remove_missing_files();
        cache.invalidate_missing_artifacts(project.artifacts_handler());

        let planner = Planner::new(
            &graph,
            &project.compilers,
            &project.overrides,
            project.supplier().known_versions(),
        );
        let jobs = planner.plan()?;
        tracing::trace!("planned {} compile jobs", jobs.len());

        let jobs = if project.cached {
            planner::filter_unchanged(jobs, |source_name, config| {
                is_dirty(&graph, &cache, source_name, config)
            })
        } else {
            jobs
        };
        tracing::trace!("{} jobs left after the cache filter", jobs.len());

        Ok(PreprocessedState { project, graph, cache, jobs })
    }
}

/// Returns true if the file itself changed, or if any of its transitive dependencies did.
///
/// The compiler config is compared for the file itself only: a dependency compiled under a
/// different config with unchanged content does not invalidate its dependents.
fn is_dirty(
    graph: &DependencyGraph,
    cache: &BuildCache,
    source_name: &str,
    config: &CompilerConfig,
) -> bool {
    let Some(file) = graph.find(source_name) else { return true };
    if cache.has_file_changed(&file.path, &file.content_hash(), Some(config)) {
        return true
    }
    graph
        .transitive_dependencies(source_name)
        .iter()
        .any(|dep| cache.has_file_changed(&dep.path, &dep.content_hash(), None))
}

/// A series of states that comprise the [`ProjectCompiler::compile()`] state machine
///
/// The main reason is to debug all states individually
#[derive(Debug)]
struct PreprocessedState<'a, T: ArtifactStore> {
    project: &'a Project<T>,
    graph: DependencyGraph,
    cache: BuildCache,
    /// surviving jobs, in ascending compiler version order
    jobs: Vec<CompilationJob>,
}

impl<'a, T: ArtifactStore> PreprocessedState<'a, T> {
    /// advance to the next state by compiling all jobs sequentially
    fn compile(self) -> Result<CompiledState<'a, T>> {
        let PreprocessedState { project, graph, cache, jobs } = self;

        let mut compiled = Vec::with_capacity(jobs.len());
        for job in jobs {
            project.cancel_token().check()?;

            let compiler = project.supplier().acquire(&job.config.version, project.quiet)?;
            let build = compiler.build().clone();

            let sources: Sources = job
                .inputs()
                .filter_map(|name| {
                    graph.find(name).map(|file| (name.to_string(), file.source.clone()))
                })
                .collect();
            let input =
                CompilerInput::with_sources(sources).settings(job.config.settings.clone());

            if !project.quiet {
                report::compile_start(&build.version, &input, job.emitted().count());
            }
            tracing::trace!(
                "compiling {} sources with solc {} ({})",
                input.sources.len(),
                build.version,
                build.long_version
            );
            let output = compiler.compile(&input)?;
            if !project.quiet {
                report::compile_success(&build.version);
                for err in output.errors.iter().filter(|err| err.is_console_log_hint()) {
                    report::console_log_hint(&err.message);
                }
            }
            compiled.push(CompiledJob { job, input, output, version: build.version, long_version: build.long_version });
        }

        Ok(CompiledState { project, graph, cache, compiled })
    }
}

/// The outcome of one compiler invocation
#[derive(Debug)]
struct CompiledJob {
    job: CompilationJob,
    input: CompilerInput,
    output: CompilerOutput,
    version: Version,
    long_version: String,
}

/// Represents the state after all compilers were successfully invoked
#[derive(Debug)]
struct CompiledState<'a, T: ArtifactStore> {
    project: &'a Project<T>,
    graph: DependencyGraph,
    cache: BuildCache,
    compiled: Vec<CompiledJob>,
}

impl<'a, T: ArtifactStore> CompiledState<'a, T> {
    /// advance to the next state by persisting all artifacts and build infos
    ///
    /// Nothing is written if any job produced an error severity diagnostic, the diagnostics are
    /// surfaced through the returned output instead
    fn write_artifacts(self) -> Result<ArtifactsState<'a, T>> {
        let CompiledState { project, graph, cache, compiled } = self;
        project.cancel_token().check()?;

        let has_error = compiled.iter().any(|job| job.output.has_error());
        let skip = has_error || project.no_artifacts;
        if has_error {
            tracing::trace!("skip writing artifacts due to compiler errors");
        }

        // entries of this build, keyed by absolute path; emitting files take precedence over
        // plain dependency entries of later jobs
        let mut new_entries: BTreeMap<PathBuf, CacheEntry> = BTreeMap::new();
        for CompiledJob { job, input, output, version, long_version } in &compiled {
            let build_info = if skip {
                None
            } else {
                let raw = RawBuildInfo::new(input, output, version, long_version)?;
                Some(project.artifacts_handler().save_build_info(&raw)?)
            };

            for file in job.inputs().filter_map(|name| graph.find(name)) {
                let emits = job.emits_artifacts(&file.source_name);
                let mut artifacts = Vec::new();
                if emits {
                    for contract in output.contract_names_of(&file.source_name) {
                        if !skip {
                            let contract_output = &output.contracts[&file.source_name][&contract];
                            project.artifacts_handler().save_artifact(
                                &file.source_name,
                                &contract,
                                contract_output,
                                build_info.as_deref(),
                            )?;
                        }
                        artifacts.push(contract);
                    }
                }

                let entry = CacheEntry::new(file, &job.config, artifacts);
                if emits {
                    new_entries.insert(file.path.clone(), entry);
                } else {
                    new_entries.entry(file.path.clone()).or_insert(entry);
                }
            }
        }

        Ok(ArtifactsState { project, cache, compiled, new_entries, has_error })
    }
}

/// Represents the state after all artifacts were written to disk
#[derive(Debug)]
struct ArtifactsState<'a, T: ArtifactStore> {
    project: &'a Project<T>,
    cache: BuildCache,
    compiled: Vec<CompiledJob>,
    new_entries: BTreeMap<PathBuf, CacheEntry>,
    has_error: bool,
}

impl<'a, T: ArtifactStore> ArtifactsState<'a, T> {
    /// Updates and flushes the cache and removes everything the cache no longer tracks,
    /// this concludes the [`crate::Project::compile()`] statemachine
    fn write_cache(self) -> Result<ProjectCompileOutput> {
        let ArtifactsState { project, mut cache, compiled, new_entries, has_error } = self;
        project.cancel_token().check()?;

        if project.cached && !has_error {
            cache.files.extend(new_entries);
            project.artifacts_handler().remove_obsolete(&cache.files)?;
            project.artifacts_handler().remove_obsolete_build_infos()?;
            cache.write(&project.paths.cache)?;
        }

        let mut versions = Vec::with_capacity(compiled.len());
        let mut output = CompilerOutput::default();
        let jobs_compiled = compiled.len();
        for job in compiled {
            versions.push(job.version);
            output.merge(job.output);
        }
        Ok(ProjectCompileOutput { compiler_output: output, jobs_compiled, versions })
    }
}

/// The outcome of [`crate::Project::compile()`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectCompileOutput {
    /// The merged output of all compiler invocations of this build
    compiler_output: CompilerOutput,
    /// How many compiler invocations this build performed, `0` for a fully cached build
    jobs_compiled: usize,
    /// The compiler versions used, ascending
    versions: Vec<Version>,
}

impl ProjectCompileOutput {
    /// Get the merged compiler output
    pub fn output(&self) -> &CompilerOutput {
        &self.compiler_output
    }

    pub fn into_output(self) -> CompilerOutput {
        self.compiler_output
    }

    /// Whether the build reused the cache for everything and never invoked a compiler
    pub fn is_unchanged(&self) -> bool {
        self.jobs_compiled == 0
    }

    /// How many compiler invocations this build performed
    pub fn jobs_compiled(&self) -> usize {
        self.jobs_compiled
    }

    /// The compiler versions used by this build, in the order they ran
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Whether there were errors
    pub fn has_compiler_errors(&self) -> bool {
        self.compiler_output.has_error()
    }

    /// Whether there were warnings
    pub fn has_compiler_warnings(&self) -> bool {
        self.compiler_output.has_warning()
    }

    /// Finds the first contract with the given name
    pub fn find(&self, contract: &str) -> Option<&crate::artifacts::Contract> {
        self.compiler_output.find(contract)
    }

    /// The process exit code of this outcome: `0` on success, `1` when the compiler reported
    /// errors. Planning and acquisition failures never produce an output, they surface as
    /// [crate::SolcError] and map through [crate::SolcError::exit_code()].
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_compiler_errors())
    }
}

impl fmt::Display for ProjectCompileOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unchanged() {
            f.write_str("Nothing to compile")
        } else {
            for err in &self.compiler_output.errors {
                writeln!(f, "{err}")?;
            }
            Ok(())
        }
    }
}
