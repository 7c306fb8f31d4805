//! Resolution of source names to files on disk.
//!
//! Every file is identified by its [source name](https://docs.soliditylang.org/en/develop/path-resolution.html),
//! a forward-slash path that is either relative to the project root (`contracts/Foo.sol`) or
//! rooted in a third-party package (`@openzeppelin/contracts/token/ERC20.sol`). The resolver maps
//! such names to [ResolvedFile]s and canonicalizes every import directive it finds along the way,
//! so the rest of the pipeline only ever deals in source names.
//!
//! Package roots are supplied through the [PackageLookup] seam. The default implementation
//! resolves against the project's `node_modules` directory, tests plug in their own.

use crate::{
    artifacts::Source,
    error::{Result, SolcError},
    utils,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::UNIX_EPOCH,
};

mod parse;
pub use parse::SolData;

/// A source file resolved to its location on disk, with all imports rewritten to canonical
/// source names. Immutable once constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedFile {
    /// canonical forward-slash identifier of the file
    pub source_name: String,
    /// absolute location on disk
    pub path: PathBuf,
    /// the exact content that is passed to the compiler
    pub source: Source,
    /// mtime of the file in millis
    pub last_modification_date: u64,
    /// canonicalized source names of all imports
    pub imports: Vec<String>,
    /// all solidity version pragmas of the file
    pub version_pragmas: Vec<String>,
    /// set if the file was resolved from a third-party package tree
    pub package: Option<String>,
}

impl ResolvedFile {
    /// Returns the content hash of the file, see [`Source::content_hash()`]
    pub fn content_hash(&self) -> String {
        self.source.content_hash()
    }
}

/// How to locate the root directory of a third-party package
pub trait PackageLookup: Send + Sync {
    /// Returns the directory the package's source tree is rooted in, if installed
    fn lookup_package(&self, package: &str) -> Option<PathBuf>;
}

/// Default [PackageLookup] backed by a `node_modules` directory
#[derive(Clone, Debug)]
pub struct NodeModulesLookup {
    node_modules: PathBuf,
}

impl NodeModulesLookup {
    pub fn new(node_modules: impl Into<PathBuf>) -> Self {
        Self { node_modules: node_modules.into() }
    }
}

impl PackageLookup for NodeModulesLookup {
    fn lookup_package(&self, package: &str) -> Option<PathBuf> {
        let dir = self.node_modules.join(package);
        dir.is_dir().then_some(dir)
    }
}

/// A [PackageLookup] that knows no packages, for projects without third-party trees
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPackages;

impl PackageLookup for NoPackages {
    fn lookup_package(&self, _package: &str) -> Option<PathBuf> {
        None
    }
}

/// Resolves source names against a project root and a package lookup.
///
/// Lookups are memoized for the lifetime of the resolver, which is a single build.
pub struct Resolver {
    root: PathBuf,
    packages: Box<dyn PackageLookup>,
    cache: Mutex<HashMap<String, ResolvedFile>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("root", &self.root).finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>, packages: Box<dyn PackageLookup>) -> Self {
        Self { root: root.into(), packages, cache: Mutex::new(HashMap::new()) }
    }

    /// Creates a new resolver whose packages live in `<root>/node_modules`
    pub fn with_node_modules(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let lookup = NodeModulesLookup::new(root.join("node_modules"));
        Self::new(root, Box::new(lookup))
    }

    /// The project root all project-relative source names resolve against
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the source name of the given project file
    pub fn source_name_of(&self, path: &Path) -> String {
        utils::source_name(path, &self.root)
    }

    /// Resolves all given source names, the top-level entry point for a set of root files.
    ///
    /// Reads fan out in parallel, resolution of a single name is purely a function of the
    /// filesystem state.
    pub fn resolve_many(&self, source_names: &[String]) -> Result<Vec<ResolvedFile>> {
        use rayon::prelude::*;

        if source_names.len() < Source::NUM_READ_PAR {
            source_names.iter().map(|name| self.resolve(name)).collect()
        } else {
            source_names.par_iter().map(|name| self.resolve(name)).collect()
        }
    }

    /// Resolves a single source name to a [ResolvedFile]
    pub fn resolve(&self, source_name: &str) -> Result<ResolvedFile> {
        if let Some(cached) = self.cache.lock().unwrap().get(source_name) {
            return Ok(cached.clone())
        }

        let resolved = self.resolve_uncached(source_name)?;
        self.cache
            .lock()
            .unwrap()
            .insert(source_name.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_uncached(&self, source_name: &str) -> Result<ResolvedFile> {
        // a name that maps onto a file under the project root is a project file, everything
        // else is attempted as a package-rooted name
        let project_path = self.root.join(source_name);
        let (path, package) = if project_path.is_file() {
            (project_path, None)
        } else {
            let (package, rest) = split_package(source_name)
                .ok_or_else(|| SolcError::FileNotFound(source_name.to_string()))?;
            let package_root = self
                .packages
                .lookup_package(package)
                .ok_or_else(|| SolcError::PackageNotInstalled(package.to_string()))?;
            let path = package_root.join(rest);
            if !path.is_file() {
                return Err(SolcError::FileNotFound(source_name.to_string()))
            }
            (path, Some(package.to_string()))
        };

        tracing::trace!("resolved \"{}\" at \"{}\"", source_name, path.display());
        let source = Source::read(&path)?;
        let last_modification_date = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|err| SolcError::io(err, &path))?
            .duration_since(UNIX_EPOCH)
            .map_err(|err| SolcError::solc(err.to_string()))?
            .as_millis() as u64;

        let data = SolData::parse(source.as_ref());
        let imports = data
            .imports
            .iter()
            .map(|import| canonicalize_import(source_name, import))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedFile {
            source_name: source_name.to_string(),
            path,
            source,
            last_modification_date,
            imports,
            version_pragmas: data.version_pragmas,
            package,
        })
    }
}

/// Rewrites an import directive into a canonical source name.
///
/// Relative imports are joined against the importing file's source name and normalized, all
/// other imports already are source names.
pub fn canonicalize_import(importer: &str, import: &str) -> Result<String> {
    if import.starts_with("./") || import.starts_with("../") {
        utils::normalize_relative_source_name(importer, import).ok_or_else(|| {
            SolcError::IllegalImport { import: import.to_string(), from: importer.to_string() }
        })
    } else {
        Ok(import.to_string())
    }
}

/// Splits a package-rooted source name into the package name and the in-package path.
///
/// Scoped packages span two segments: `@scope/pkg/contracts/A.sol` -> (`@scope/pkg`,
/// `contracts/A.sol`)
fn split_package(source_name: &str) -> Option<(&str, &str)> {
    let (package, rest) = source_name.split_once('/')?;
    if !package.starts_with('@') {
        return Some((package, rest))
    }
    let (scoped, rest) = rest.split_once('/')?;
    let package_len = package.len() + 1 + scoped.len();
    Some((&source_name[..package_len], rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, File};
    use std::io::Write;

    fn touch(path: &Path, content: &str) {
        create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn can_split_packages() {
        assert_eq!(split_package("pkg/contracts/A.sol"), Some(("pkg", "contracts/A.sol")));
        assert_eq!(
            split_package("@scope/pkg/contracts/A.sol"),
            Some(("@scope/pkg", "contracts/A.sol"))
        );
        assert_eq!(split_package("A.sol"), None);
    }

    #[test]
    fn can_resolve_project_and_package_files() {
        let tmp = utils::tempdir("resolver").unwrap();
        let root = tmp.path();
        touch(
            &root.join("contracts/Greeter.sol"),
            "pragma solidity ^0.8.0;\nimport \"hardhat/console.sol\";\nimport \"./lib/Util.sol\";\n",
        );
        touch(&root.join("contracts/lib/Util.sol"), "pragma solidity ^0.8.0;\n");
        touch(
            &root.join("node_modules/hardhat/console.sol"),
            "pragma solidity >=0.4.22 <0.9.0;\n",
        );

        let resolver = Resolver::with_node_modules(root);

        let greeter = resolver.resolve("contracts/Greeter.sol").unwrap();
        assert_eq!(greeter.source_name, "contracts/Greeter.sol");
        assert_eq!(
            greeter.imports,
            vec!["hardhat/console.sol".to_string(), "contracts/lib/Util.sol".to_string()]
        );
        assert_eq!(greeter.version_pragmas, vec!["^0.8.0".to_string()]);
        assert!(greeter.package.is_none());

        let console = resolver.resolve("hardhat/console.sol").unwrap();
        assert_eq!(console.package.as_deref(), Some("hardhat"));
        assert!(console.path.ends_with("node_modules/hardhat/console.sol"));

        // identity round-trips
        assert_eq!(resolver.resolve("hardhat/console.sol").unwrap().source_name, "hardhat/console.sol");
    }

    #[test]
    fn missing_package_is_reported() {
        let tmp = utils::tempdir("resolver").unwrap();
        let resolver = Resolver::with_node_modules(tmp.path());
        match resolver.resolve("missing-pkg/contracts/A.sol").unwrap_err() {
            SolcError::PackageNotInstalled(pkg) => assert_eq!(pkg, "missing-pkg"),
            err => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn escaping_relative_import_is_illegal() {
        let err = canonicalize_import("contracts/A.sol", "../../Escape.sol").unwrap_err();
        match err {
            SolcError::IllegalImport { import, from } => {
                assert_eq!(import, "../../Escape.sol");
                assert_eq!(from, "contracts/A.sol");
            }
            err => panic!("unexpected error: {err}"),
        }
    }
}
