//! Utilities for mocking project workspaces

use crate::{
    artifacts::{CompilerInput, CompilerOutput, Error, Severity, SourceFile},
    compile::{Compiler, CompilerSupplier},
    error::Result,
    planner::CompilerConfig,
    utils, DiskArtifacts, Project, ProjectCompileOutput, ProjectPathsConfig, SolcBuild, SolcError,
};
use semver::Version;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tempfile::TempDir;

/// A [`Project`] wrapper that lives in a new temporary directory and compiles with the
/// [MockCompilerSupplier], so tests never need a real `solc` binary.
///
/// Once `TempProject` is dropped, the temp dir is automatically removed, see [`TempDir::drop()`]
pub struct TempProject {
    /// temporary workspace root
    _root: TempDir,
    /// actual project workspace with the `root` tempdir as its root
    inner: Project<DiskArtifacts>,
    invocations: Arc<AtomicUsize>,
}

impl TempProject {
    /// Creates a new hardhat-layout temp project with the given compiler configurations.
    ///
    /// The mock supplier knows exactly the configured versions.
    pub fn hardhat(compilers: Vec<CompilerConfig>) -> Result<Self> {
        Self::with_supplier_versions(compilers, Vec::new())
    }


    /// Creates a new temp project whose mock compilers identify as the portable build
    pub fn portable(compilers: Vec<CompilerConfig>) -> Result<Self> {
        Self::new(compilers, MockCompilerSupplier::new(Vec::new()).portable())
    }

    /// Creates a new temp project whose supplier additionally knows the given released versions
    pub fn with_supplier_versions(
        compilers: Vec<CompilerConfig>,
        known_versions: Vec<Version>,
    ) -> Result<Self> {
        Self::new(compilers, MockCompilerSupplier::new(known_versions))
    }

    fn new(compilers: Vec<CompilerConfig>, supplier: MockCompilerSupplier) -> Result<Self> {
        let tmp_dir = utils::tempdir("temp-project")?;
        let paths = ProjectPathsConfig::hardhat(tmp_dir.path())?;
        paths.create_all()?;

        let invocations = supplier.invocations();
        let inner = Project::builder()
            .paths(paths)
            .compilers(compilers)
            .quiet()
            .supplier(Box::new(supplier))
            .build()?;
        Ok(Self { _root: tmp_dir, inner, invocations })
    }

    pub fn project(&self) -> &Project<DiskArtifacts> {
        &self.inner
    }

    pub fn project_mut(&mut self) -> &mut Project<DiskArtifacts> {
        &mut self.inner
    }

    pub fn paths(&self) -> &ProjectPathsConfig {
        &self.inner.paths
    }

    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        self.inner.compile()
    }

    /// How many compiler invocations all builds of this project performed so far
    pub fn compiler_invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Adds a solidity file under the sources dir, `name` is relative to it
    pub fn add_source(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.paths().sources.join(name);
        utils::create_parent_dir_all(&path)?;
        fs::write(&path, content).map_err(|err| SolcError::io(err, &path))?;
        Ok(path)
    }

    /// Overwrites an existing source file
    pub fn change_source(&self, name: &str, content: &str) -> Result<()> {
        let path = self.paths().sources.join(name);
        fs::write(&path, content).map_err(|err| SolcError::io(err, &path))?;
        Ok(())
    }

    /// Adds a file to an installed package under `node_modules`
    pub fn add_package_source(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.paths().node_modules.join(name);
        utils::create_parent_dir_all(&path)?;
        fs::write(&path, content).map_err(|err| SolcError::io(err, &path))?;
        Ok(path)
    }

    /// The on-disk location of the artifact for the given contract
    pub fn artifact_path(&self, source_name: &str, contract: &str) -> PathBuf {
        self.inner.artifacts_handler().artifact_path(source_name, contract)
    }
}

/// A [CompilerSupplier] double that hands out [MockCompiler]s and counts invocations
#[derive(Clone, Debug, Default)]
pub struct MockCompilerSupplier {
    known_versions: Vec<Version>,
    invocations: Arc<AtomicUsize>,
    portable: bool,
}

impl MockCompilerSupplier {
    pub fn new(known_versions: Vec<Version>) -> Self {
        Self { known_versions, invocations: Arc::new(AtomicUsize::new(0)), portable: false }
    }

    /// Marks all handed out compilers as portable builds
    #[must_use]
    pub fn portable(mut self) -> Self {
        self.portable = true;
        self
    }

    /// Shared counter of compiler invocations
    pub fn invocations(&self) -> Arc<AtomicUsize> {
        self.invocations.clone()
    }
}

impl CompilerSupplier for MockCompilerSupplier {
    fn acquire(&self, version: &Version, _quiet: bool) -> Result<Box<dyn Compiler>> {
        let build = SolcBuild {
            compiler_path: PathBuf::from(format!("mock-solc-{version}")),
            is_portable: self.portable,
            version: version.clone(),
            long_version: format!("{version}+commit.mock"),
        };
        Ok(Box::new(MockCompiler { build, invocations: self.invocations.clone() }))
    }

    fn known_versions(&self) -> Vec<Version> {
        self.known_versions.clone()
    }
}

/// A deterministic stand-in for `solc`: emits one contract per input file, named after the file
/// stem.
///
/// Error and warning diagnostics are triggered by markers in the source text, so cache and
/// error-policy behavior can be exercised without a real compiler:
/// - `// trigger-error` produces an `error` severity diagnostic for the file
/// - `// trigger-warning` produces a `warning`
/// - a `console.log(` call without `hardhat/console.sol` among the inputs produces the
///   console helper warning
#[derive(Debug)]
pub struct MockCompiler {
    build: SolcBuild,
    invocations: Arc<AtomicUsize>,
}

impl Compiler for MockCompiler {
    fn build(&self) -> &SolcBuild {
        &self.build
    }

    fn compile(&self, input: &CompilerInput) -> Result<CompilerOutput> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let mut output = CompilerOutput::default();
        for (id, (source_name, source)) in input.sources.iter().enumerate() {
            output
                .sources
                .insert(source_name.clone(), SourceFile { id: id as u32, ast: None });

            let contract_name = Path::new(source_name)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("Contract")
                .to_string();
            let bytecode = format!("0x{}", source.content_hash());
            output.contracts.entry(source_name.clone()).or_default().insert(
                contract_name,
                serde_json::json!({
                    "abi": [],
                    "evm": { "bytecode": { "object": bytecode } }
                }),
            );

            if source.content.contains("// trigger-error") {
                output.errors.push(diagnostic(
                    source_name,
                    Severity::Error,
                    "ParserError",
                    "Expected ';' but got end of source",
                ));
            }
            if source.content.contains("// trigger-warning") {
                output.errors.push(diagnostic(
                    source_name,
                    Severity::Warning,
                    "Warning",
                    "Unused local variable.",
                ));
            }
            if source.content.contains("console.log(") &&
                !input.sources.contains_key("hardhat/console.sol")
            {
                output.errors.push(diagnostic(
                    source_name,
                    Severity::Warning,
                    "DeclarationError",
                    "console.log is used but \"hardhat/console.sol\" is not imported",
                ));
            }
        }
        Ok(output)
    }
}

fn diagnostic(source_name: &str, severity: Severity, kind: &str, message: &str) -> Error {
    Error {
        source_location: None,
        r#type: kind.to_string(),
        component: "general".to_string(),
        severity,
        message: message.to_string(),
        formatted_message: Some(format!("{kind}: {message} ({source_name})")),
    }
}
