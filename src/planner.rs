//! Partitioning of the dependency graph into compilation jobs.
//!
//! Planning happens per weakly connected component. For every root file the planner determines
//! the effective version range, the intersection of the file's own pragmas with the pragmas of
//! everything it transitively imports, and picks the newest configured compiler that satisfies
//! it. Candidate jobs with value-equal configurations (version _and_ settings) are merged so a
//! multi-contract project compiles in as few compiler invocations as possible, while two
//! configurations that only share the version never collide.
//!
//! Whether a version range is empty is decided against the set of known compiler releases, the
//! same approach the solc version auto-detection uses: solving the constraint graph symbolically
//! is intractable, checking it against ~100 released versions is trivial.

use crate::{
    artifacts::Settings,
    graph::DependencyGraph,
    resolver::ResolvedFile,
    utils,
};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// A compiler version paired with the settings it is invoked with
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    pub version: Version,
    #[serde(default)]
    pub settings: Settings,
    /// whether this config was selected through a per-file user override
    #[serde(default, skip_serializing_if = "is_false")]
    pub from_override: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl CompilerConfig {
    pub fn new(version: Version) -> Self {
        Self { version, settings: Settings::default(), from_override: false }
    }

    pub fn with_settings(version: Version, settings: Settings) -> Self {
        Self { version, settings, from_override: false }
    }

    /// The key jobs are merged under. `serde_json`'s map is ordered, so equal settings always
    /// produce an equal key.
    fn merge_key(&self) -> (Version, String) {
        let settings = serde_json::to_string(&self.settings).unwrap_or_default();
        (self.version.clone(), settings)
    }
}

/// Equality is `(version, settings)`: override provenance does not change the produced output
impl PartialEq for CompilerConfig {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.settings == other.settings
    }
}

impl Eq for CompilerConfig {}

/// A single compiler invocation: one configuration, a closed input set and the subset of inputs
/// whose artifacts must be written.
///
/// Files are referenced by source name, the [DependencyGraph] of the build owns the
/// [ResolvedFile]s.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompilationJob {
    pub config: CompilerConfig,
    inputs: BTreeSet<String>,
    emits: BTreeSet<String>,
}

impl CompilationJob {
    fn new(config: CompilerConfig, root: &ResolvedFile, deps: &[&ResolvedFile]) -> Self {
        let mut inputs: BTreeSet<String> =
            deps.iter().map(|dep| dep.source_name.clone()).collect();
        inputs.insert(root.source_name.clone());
        let emits = BTreeSet::from([root.source_name.clone()]);
        Self { config, inputs, emits }
    }

    /// All files the compiler gets to see for this job
    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str)
    }

    /// The files whose artifacts must be written, dependencies that are only included as
    /// compiler inputs are excluded
    pub fn emitted(&self) -> impl Iterator<Item = &str> {
        self.emits.iter().map(String::as_str)
    }

    pub fn emits_artifacts(&self, source_name: &str) -> bool {
        self.emits.contains(source_name)
    }

    pub fn contains(&self, source_name: &str) -> bool {
        self.inputs.contains(source_name)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Combines two jobs with value-equal configurations: input sets are unioned, the artifact
    /// emission predicates are OR-ed
    pub fn merge(&mut self, other: CompilationJob) {
        debug_assert!(self.config == other.config);
        self.inputs.extend(other.inputs);
        self.emits.extend(other.emits);
    }
}

/// Errors that can occur while picking a compiler configuration for a root file
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobCreationError {
    /// The effective range is non-empty but no configured compiler satisfies it
    NoCompatibleVersion { file: ResolvedFile },
    /// The override configured for the file does not satisfy the file's own pragmas
    IncompatibleOverride { file: ResolvedFile, version: Version },
    /// The file's pragmas conflict with one or more of its direct imports
    DirectlyImportsIncompatible { file: ResolvedFile, incompatible: Vec<ResolvedFile> },
    /// The file's pragmas conflict with a transitive import, reported with the import path
    IndirectlyImportsIncompatible {
        file: ResolvedFile,
        incompatible: Vec<(ResolvedFile, Vec<String>)>,
    },
    /// Everything else, e.g. a pragma that is not valid semver
    Other { file: ResolvedFile, detail: String },
}

impl JobCreationError {
    /// The file the error was raised for
    pub fn file(&self) -> &ResolvedFile {
        match self {
            JobCreationError::NoCompatibleVersion { file } |
            JobCreationError::IncompatibleOverride { file, .. } |
            JobCreationError::DirectlyImportsIncompatible { file, .. } |
            JobCreationError::IndirectlyImportsIncompatible { file, .. } |
            JobCreationError::Other { file, .. } => file,
        }
    }
}

fn fmt_pragmas(file: &ResolvedFile) -> String {
    if file.version_pragmas.is_empty() {
        "*".to_string()
    } else {
        file.version_pragmas.join(" ")
    }
}

impl fmt::Display for JobCreationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobCreationError::NoCompatibleVersion { file } => {
                write!(
                    f,
                    "{} ({}) is not compatible with any of the configured compiler versions",
                    file.source_name,
                    fmt_pragmas(file)
                )
            }
            JobCreationError::IncompatibleOverride { file, version } => {
                write!(
                    f,
                    "the compiler override {version} for {} does not satisfy its pragma ({})",
                    file.source_name,
                    fmt_pragmas(file)
                )
            }
            JobCreationError::DirectlyImportsIncompatible { file, incompatible } => {
                write!(f, "{} ({}) imports incompatible files:", file.source_name, fmt_pragmas(file))?;
                for dep in incompatible {
                    write!(f, "\n    {} ({})", dep.source_name, fmt_pragmas(dep))?;
                }
                Ok(())
            }
            JobCreationError::IndirectlyImportsIncompatible { file, incompatible } => {
                write!(
                    f,
                    "{} ({}) transitively imports incompatible files:",
                    file.source_name,
                    fmt_pragmas(file)
                )?;
                for (dep, path) in incompatible {
                    write!(
                        f,
                        "\n    {} ({}), imported via {}",
                        dep.source_name,
                        fmt_pragmas(dep),
                        path.join(" -> ")
                    )?;
                }
                Ok(())
            }
            JobCreationError::Other { file, detail } => {
                write!(f, "{}: {detail}", file.source_name)
            }
        }
    }
}

/// All planning errors of a build rolled into a single report
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobCreationErrors(pub Vec<JobCreationError>);

impl fmt::Display for JobCreationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Failed to plan compilation jobs:")?;
        for err in &self.0 {
            writeln!(f, "  {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for JobCreationErrors {}

/// Plans the compilation jobs for a resolved graph
pub struct Planner<'a> {
    graph: &'a DependencyGraph,
    compilers: &'a [CompilerConfig],
    overrides: &'a BTreeMap<String, CompilerConfig>,
    /// all released compiler versions, used to decide whether a version range is empty
    known_versions: Vec<Version>,
}

impl<'a> Planner<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        compilers: &'a [CompilerConfig],
        overrides: &'a BTreeMap<String, CompilerConfig>,
        known_versions: impl IntoIterator<Item = Version>,
    ) -> Self {
        let mut known_versions: Vec<_> = known_versions
            .into_iter()
            .chain(compilers.iter().map(|config| config.version.clone()))
            .collect();
        known_versions.sort_unstable();
        known_versions.dedup();
        Self { graph, compilers, overrides, known_versions }
    }

    /// Creates one candidate job per root file and merges jobs with value-equal configurations.
    ///
    /// All per-file errors are accumulated, a single incompatible file does not hide the
    /// diagnostics of the others.
    pub fn plan(&self) -> Result<Vec<CompilationJob>, JobCreationErrors> {
        let mut errors = Vec::new();
        let mut merged: BTreeMap<(Version, String), CompilationJob> = BTreeMap::new();

        for component in self.graph.connected_components() {
            for idx in component.into_iter().filter(|idx| self.graph.is_input_file(*idx)) {
                let file = self.graph.node(idx);
                let config = match self.select_config(idx) {
                    Ok(config) => config,
                    Err(err) => {
                        errors.push(err);
                        continue
                    }
                };
                let deps = self.graph.transitive_dependencies(&file.source_name);
                let job = CompilationJob::new(config, file, &deps);
                match merged.entry(job.config.merge_key()) {
                    std::collections::btree_map::Entry::Occupied(mut entry) => {
                        entry.get_mut().merge(job)
                    }
                    std::collections::btree_map::Entry::Vacant(entry) => {
                        entry.insert(job);
                    }
                }
            }
        }

        if !errors.is_empty() {
            tracing::error!("failed to plan jobs for {} files", errors.len());
            return Err(JobCreationErrors(errors))
        }

        // BTreeMap keyed by (version, settings) already yields jobs in ascending version order,
        // which is the order they are compiled and reported in
        Ok(merged.into_values().collect())
    }

    /// Picks the compiler configuration for a single root file, Step A of the planning phase
    fn select_config(&self, idx: usize) -> Result<CompilerConfig, JobCreationError> {
        let file = self.graph.node(idx);

        if let Some(config) = self.overrides.get(&file.source_name) {
            let reqs = parse_pragmas(file)?;
            if !reqs.iter().all(|req| req.matches(&config.version)) {
                return Err(JobCreationError::IncompatibleOverride {
                    file: file.clone(),
                    version: config.version.clone(),
                })
            }
            return Ok(CompilerConfig { from_override: true, ..config.clone() })
        }

        // the effective range: the file's own pragmas plus those of everything it imports
        let mut reqs = parse_pragmas(file)?;
        let dep_ids = self.graph.transitive_ids(idx);
        for dep in dep_ids.iter().copied() {
            reqs.extend(parse_pragmas(self.graph.node(dep))?);
        }

        if !self.known_versions.iter().any(|v| reqs.iter().all(|req| req.matches(v))) {
            return Err(self.classify_incompatibility(idx, &dep_ids))
        }

        // of the allowed configs, the newest version that satisfies the effective range wins
        self.compilers
            .iter()
            .filter(|config| reqs.iter().all(|req| req.matches(&config.version)))
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned()
            .ok_or_else(|| JobCreationError::NoCompatibleVersion { file: file.clone() })
    }

    /// Splits an empty effective range into the direct and the indirect import case.
    ///
    /// The file's pragmas combined with the pragmas of all direct imports _together_ decide the
    /// case: if that joint range is already empty, the conflict is a direct one, even when every
    /// single direct import is pairwise compatible with the file. Only when a strictly deeper
    /// file is required to empty the range is the conflict an indirect one.
    fn classify_incompatibility(&self, idx: usize, dep_ids: &[usize]) -> JobCreationError {
        let file = self.graph.node(idx);
        let direct: Vec<usize> = self.graph.imported_nodes(idx).to_vec();

        let file_reqs = match parse_pragmas(file) {
            Ok(reqs) => reqs,
            Err(err) => return err,
        };
        let mut candidates: Vec<&Version> = self
            .known_versions
            .iter()
            .filter(|v| file_reqs.iter().all(|req| req.matches(v)))
            .collect();

        // narrow the candidate set by the direct imports, remembering every import that
        // actually constrained it
        let mut constraining = Vec::new();
        for dep in direct.iter().copied() {
            let dep_file = self.graph.node(dep);
            let dep_reqs = match parse_pragmas(dep_file) {
                Ok(reqs) => reqs,
                Err(err) => return err,
            };
            let retained: Vec<&Version> = candidates
                .iter()
                .copied()
                .filter(|v| dep_reqs.iter().all(|req| req.matches(v)))
                .collect();
            if retained.len() < candidates.len() {
                constraining.push(dep_file.clone());
            }
            candidates = retained;
        }

        if candidates.is_empty() {
            // prefer the imports that conflict with the file on their own, they are
            // unambiguously at fault; otherwise the conflict only arises in combination and
            // every constraining import is part of it
            let pairwise: Vec<ResolvedFile> = direct
                .iter()
                .copied()
                .filter(|dep| self.conflicts_with(file, self.graph.node(*dep)))
                .map(|dep| self.graph.node(dep).clone())
                .collect();
            let incompatible = if pairwise.is_empty() { constraining } else { pairwise };
            return JobCreationError::DirectlyImportsIncompatible {
                file: file.clone(),
                incompatible,
            }
        }

        // the direct imports leave a non-empty range, so a deeper file empties it
        let deeper: Vec<usize> =
            dep_ids.iter().copied().filter(|dep| !direct.contains(dep)).collect();
        let mut incompatible: Vec<(ResolvedFile, Vec<String>)> = deeper
            .iter()
            .copied()
            .filter(|dep| self.conflicts_with(file, self.graph.node(*dep)))
            .map(|dep| (self.graph.node(dep).clone(), self.source_name_path(idx, dep)))
            .collect();
        if incompatible.is_empty() {
            // no deeper file conflicts with the file on its own, walk them in import order and
            // record the ones that narrow the joint range until it is empty
            for dep in deeper {
                let dep_file = self.graph.node(dep);
                let dep_reqs = match parse_pragmas(dep_file) {
                    Ok(reqs) => reqs,
                    Err(err) => return err,
                };
                let retained: Vec<&Version> = candidates
                    .iter()
                    .copied()
                    .filter(|v| dep_reqs.iter().all(|req| req.matches(v)))
                    .collect();
                if retained.len() < candidates.len() {
                    incompatible.push((dep_file.clone(), self.source_name_path(idx, dep)));
                }
                candidates = retained;
                if candidates.is_empty() {
                    break
                }
            }
        }
        JobCreationError::IndirectlyImportsIncompatible { file: file.clone(), incompatible }
    }

    /// The import path from `from` to `to` as source names, both inclusive
    fn source_name_path(&self, from: usize, to: usize) -> Vec<String> {
        self.graph
            .import_path(from, to)
            .unwrap_or_default()
            .into_iter()
            .map(|id| self.graph.node(id).source_name.clone())
            .collect()
    }

    /// Whether no known release satisfies both files' pragmas at once
    fn conflicts_with(&self, file: &ResolvedFile, dep: &ResolvedFile) -> bool {
        let reqs: Vec<VersionReq> = match parse_pragmas(file)
            .and_then(|mut reqs| {
                reqs.extend(parse_pragmas(dep)?);
                Ok(reqs)
            }) {
            Ok(reqs) => reqs,
            Err(_) => return true,
        };
        !self.known_versions.iter().any(|v| reqs.iter().all(|req| req.matches(v)))
    }
}

/// Drops all jobs in which every artifact-emitting file is clean according to `is_dirty`.
///
/// A job with at least one dirty emitting file continues with its full input set, so the
/// compiler always sees the imports it needs.
pub fn filter_unchanged(
    jobs: Vec<CompilationJob>,
    mut is_dirty: impl FnMut(&str, &CompilerConfig) -> bool,
) -> Vec<CompilationJob> {
    jobs.into_iter()
        .filter(|job| {
            let dirty = job.emitted().any(|file| is_dirty(file, &job.config));
            if !dirty {
                tracing::trace!(
                    "skipping job for solc {}, all {} emitting files unchanged",
                    job.config.version,
                    job.emits.len()
                );
            }
            dirty
        })
        .collect()
}

fn parse_pragmas(file: &ResolvedFile) -> Result<Vec<VersionReq>, JobCreationError> {
    file.version_pragmas
        .iter()
        .map(|pragma| {
            utils::version_req(pragma).map_err(|err| JobCreationError::Other {
                file: file.clone(),
                detail: format!("failed to parse version pragma \"{pragma}\": {err}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{resolver::Resolver, utils};
    use std::{
        fs::{create_dir_all, File},
        io::Write,
        path::Path,
    };

    fn touch(path: &Path, content: &str) {
        create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().write_all(content.as_bytes()).unwrap();
    }

    fn graph_of(files: &[(&str, &str)]) -> (tempfile::TempDir, DependencyGraph) {
        let tmp = utils::tempdir("planner").unwrap();
        let root = tmp.path();
        for (name, content) in files {
            touch(&root.join(name), content);
        }
        let resolver = Resolver::with_node_modules(root);
        let roots: Vec<String> = files.iter().map(|(name, _)| name.to_string()).collect();
        let graph = DependencyGraph::resolve(&resolver, &roots).unwrap();
        (tmp, graph)
    }

    fn configs(versions: &[&str]) -> Vec<CompilerConfig> {
        versions.iter().map(|v| CompilerConfig::new(v.parse().unwrap())).collect()
    }

    #[test]
    fn plans_a_single_job_for_a_single_root() {
        let (_tmp, graph) = graph_of(&[("contracts/A.sol", "pragma solidity ^0.8.0;\n")]);
        let compilers = configs(&["0.8.17"]);
        let overrides = BTreeMap::new();
        let planner = Planner::new(&graph, &compilers, &overrides, []);

        let jobs = planner.plan().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].config.version, "0.8.17".parse().unwrap());
        assert_eq!(jobs[0].inputs().collect::<Vec<_>>(), vec!["contracts/A.sol"]);
        assert!(jobs[0].emits_artifacts("contracts/A.sol"));
    }

    #[test]
    fn diamond_imports_form_one_job_emitting_only_the_root() {
        let tmp = utils::tempdir("planner").unwrap();
        let root = tmp.path();
        touch(
            &root.join("contracts/A.sol"),
            "pragma solidity ^0.8.0;\nimport \"./B.sol\";\nimport \"./C.sol\";\n",
        );
        touch(&root.join("contracts/B.sol"), "pragma solidity ^0.8.0;\nimport \"./D.sol\";\n");
        touch(&root.join("contracts/C.sol"), "pragma solidity ^0.8.0;\nimport \"./D.sol\";\n");
        touch(&root.join("contracts/D.sol"), "pragma solidity ^0.8.0;\n");
        let resolver = Resolver::with_node_modules(root);
        let graph =
            DependencyGraph::resolve(&resolver, &["contracts/A.sol".to_string()]).unwrap();

        let compilers = configs(&["0.8.17"]);
        let overrides = BTreeMap::new();
        let jobs = Planner::new(&graph, &compilers, &overrides, []).plan().unwrap();

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.len(), 4);
        assert!(job.emits_artifacts("contracts/A.sol"));
        assert!(!job.emits_artifacts("contracts/B.sol"));
        assert!(!job.emits_artifacts("contracts/D.sol"));
    }

    #[test]
    fn splits_jobs_by_version() {
        let (_tmp, graph) = graph_of(&[
            ("contracts/A.sol", "pragma solidity ^0.7.0;\n"),
            ("contracts/B.sol", "pragma solidity ^0.8.0;\n"),
        ]);
        let compilers = configs(&["0.7.6", "0.8.17"]);
        let overrides = BTreeMap::new();
        let jobs = Planner::new(&graph, &compilers, &overrides, []).plan().unwrap();

        assert_eq!(jobs.len(), 2);
        // ascending version order
        assert_eq!(jobs[0].config.version, "0.7.6".parse().unwrap());
        assert!(jobs[0].emits_artifacts("contracts/A.sol"));
        assert_eq!(jobs[1].config.version, "0.8.17".parse().unwrap());
        assert!(jobs[1].emits_artifacts("contracts/B.sol"));
    }

    #[test]
    fn merges_only_on_matching_settings() {
        let (_tmp, graph) = graph_of(&[
            ("contracts/A.sol", "pragma solidity ^0.8.0;\n"),
            ("contracts/B.sol", "pragma solidity ^0.8.0;\n"),
        ]);
        let mut optimized = Settings::default();
        optimized
            .insert("optimizer".to_string(), serde_json::json!({ "enabled": true, "runs": 200 }));
        let compilers = vec![CompilerConfig::with_settings("0.8.17".parse().unwrap(), optimized)];
        let mut overrides = BTreeMap::new();
        overrides
            .insert("contracts/B.sol".to_string(), CompilerConfig::new("0.8.17".parse().unwrap()));

        let jobs = Planner::new(&graph, &compilers, &overrides, []).plan().unwrap();
        // same version but different settings: the jobs must not collide
        assert_eq!(jobs.len(), 2);
        assert_ne!(jobs[0].config, jobs[1].config);
    }

    #[test]
    fn newest_allowed_version_wins() {
        let (_tmp, graph) = graph_of(&[("contracts/A.sol", "pragma solidity ^0.8.0;\n")]);
        let compilers = configs(&["0.8.4", "0.8.17", "0.8.10"]);
        let overrides = BTreeMap::new();
        let jobs = Planner::new(&graph, &compilers, &overrides, []).plan().unwrap();
        assert_eq!(jobs[0].config.version, "0.8.17".parse().unwrap());
    }

    #[test]
    fn no_compatible_version_is_reported() {
        let (_tmp, graph) = graph_of(&[("contracts/A.sol", "pragma solidity ^0.6.0;\n")]);
        let compilers = configs(&["0.8.17"]);
        let overrides = BTreeMap::new();
        // 0.6.12 exists upstream, so the range is not empty, but no configured compiler matches
        let errors = Planner::new(&graph, &compilers, &overrides, ["0.6.12".parse().unwrap()])
            .plan()
            .unwrap_err();
        assert_eq!(errors.0.len(), 1);
        assert!(matches!(errors.0[0], JobCreationError::NoCompatibleVersion { .. }));
    }

    #[test]
    fn incompatible_override_is_reported() {
        let (_tmp, graph) = graph_of(&[("contracts/A.sol", "pragma solidity ^0.7.0;\n")]);
        let compilers = configs(&["0.7.6"]);
        let mut overrides = BTreeMap::new();
        overrides
            .insert("contracts/A.sol".to_string(), CompilerConfig::new("0.8.17".parse().unwrap()));
        let errors =
            Planner::new(&graph, &compilers, &overrides, []).plan().unwrap_err();
        assert!(matches!(errors.0[0], JobCreationError::IncompatibleOverride { .. }));
    }

    #[test]
    fn direct_import_conflicts_are_reported() {
        let (_tmp, graph) = graph_of(&[
            ("contracts/A.sol", "pragma solidity ^0.8.0;\nimport \"./B.sol\";\n"),
            ("contracts/B.sol", "pragma solidity ^0.7.0;\n"),
        ]);
        let compilers = configs(&["0.8.17"]);
        let overrides = BTreeMap::new();
        let errors = Planner::new(&graph, &compilers, &overrides, ["0.7.6".parse().unwrap()])
            .plan()
            .unwrap_err();

        // B itself plans fine against 0.7.6 being known but not configured
        let err = errors
            .0
            .iter()
            .find(|err| err.file().source_name == "contracts/A.sol")
            .expect("error for A");
        match err {
            JobCreationError::DirectlyImportsIncompatible { incompatible, .. } => {
                assert_eq!(incompatible.len(), 1);
                assert_eq!(incompatible[0].source_name, "contracts/B.sol");
            }
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn jointly_conflicting_direct_imports_are_a_direct_conflict() {
        // X and Y are each pairwise compatible with A, only their combination is empty;
        // no deeper file is involved, so this must not be reported as indirect
        let (_tmp, graph) = graph_of(&[
            (
                "contracts/A.sol",
                "pragma solidity >=0.7.0 <0.9.0;\nimport \"./X.sol\";\nimport \"./Y.sol\";\n",
            ),
            ("contracts/X.sol", "pragma solidity >=0.8.0 <0.9.0;\n"),
            ("contracts/Y.sol", "pragma solidity >=0.7.0 <0.8.0;\n"),
        ]);
        let compilers = configs(&["0.7.6", "0.8.17"]);
        let overrides = BTreeMap::new();
        let errors = Planner::new(&graph, &compilers, &overrides, []).plan().unwrap_err();

        let err = errors
            .0
            .iter()
            .find(|err| err.file().source_name == "contracts/A.sol")
            .expect("error for A");
        match err {
            JobCreationError::DirectlyImportsIncompatible { incompatible, .. } => {
                let names: Vec<&str> =
                    incompatible.iter().map(|dep| dep.source_name.as_str()).collect();
                assert_eq!(names, vec!["contracts/X.sol", "contracts/Y.sol"]);
            }
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn indirect_import_conflicts_carry_the_path() {
        let (_tmp, graph) = graph_of(&[
            ("contracts/A.sol", "pragma solidity ^0.8.0;\nimport \"./Mid.sol\";\n"),
            ("contracts/Mid.sol", "import \"./Deep.sol\";\n"),
            ("contracts/Deep.sol", "pragma solidity ^0.7.0;\n"),
        ]);
        let compilers = configs(&["0.8.17"]);
        let overrides = BTreeMap::new();
        let errors = Planner::new(&graph, &compilers, &overrides, ["0.7.6".parse().unwrap()])
            .plan()
            .unwrap_err();

        let err = errors
            .0
            .iter()
            .find(|err| err.file().source_name == "contracts/A.sol")
            .expect("error for A");
        match err {
            JobCreationError::IndirectlyImportsIncompatible { incompatible, .. } => {
                assert_eq!(incompatible.len(), 1);
                let (dep, path) = &incompatible[0];
                assert_eq!(dep.source_name, "contracts/Deep.sol");
                assert_eq!(
                    path,
                    &vec![
                        "contracts/A.sol".to_string(),
                        "contracts/Mid.sol".to_string(),
                        "contracts/Deep.sol".to_string()
                    ]
                );
            }
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn every_job_input_satisfies_the_chosen_version() {
        let (_tmp, graph) = graph_of(&[
            ("contracts/A.sol", "pragma solidity ^0.8.0;\nimport \"./Shared.sol\";\n"),
            ("contracts/B.sol", "pragma solidity >=0.8.4;\nimport \"./Shared.sol\";\n"),
            ("contracts/Shared.sol", "pragma solidity >=0.4.0;\n"),
        ]);
        let compilers = configs(&["0.8.4", "0.8.17"]);
        let overrides = BTreeMap::new();
        let jobs = Planner::new(&graph, &compilers, &overrides, []).plan().unwrap();

        for job in jobs {
            for input in job.inputs() {
                let file = graph.find(input).unwrap();
                for pragma in &file.version_pragmas {
                    assert!(
                        utils::version_req(pragma).unwrap().matches(&job.config.version),
                        "{input} ({pragma}) does not accept {}",
                        job.config.version
                    );
                }
            }
        }
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let file = |name: &str| ResolvedFile {
            source_name: name.to_string(),
            path: std::path::PathBuf::from(name),
            source: crate::artifacts::Source::new("pragma solidity ^0.8.0;\n"),
            last_modification_date: 0,
            imports: vec![],
            version_pragmas: vec!["^0.8.0".to_string()],
            package: None,
        };
        let config = CompilerConfig::new("0.8.17".parse().unwrap());
        let job = |name: &str| CompilationJob::new(config.clone(), &file(name), &[]);

        let (a, b, c) = (job("A.sol"), job("B.sol"), job("C.sol"));

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b.clone();
        ba.merge(a.clone());
        assert_eq!(ab, ba);

        let mut ab_c = ab.clone();
        ab_c.merge(c.clone());
        let mut bc = b;
        bc.merge(c);
        let mut a_bc = a;
        a_bc.merge(bc);
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn filter_drops_fully_clean_jobs_only() {
        let (_tmp, graph) = graph_of(&[
            ("contracts/A.sol", "pragma solidity ^0.8.0;\n"),
            ("contracts/B.sol", "pragma solidity ^0.8.0;\n"),
        ]);
        let compilers = configs(&["0.8.17"]);
        let overrides = BTreeMap::new();
        let jobs = Planner::new(&graph, &compilers, &overrides, []).plan().unwrap();
        assert_eq!(jobs.len(), 1);

        // everything clean: the job disappears
        assert!(filter_unchanged(jobs.clone(), |_, _| false).is_empty());

        // one dirty emitter keeps the whole job, inputs included
        let kept = filter_unchanged(jobs, |file, _| file == "contracts/B.sol");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].len(), 2);
    }
}
