//! Utility functions

use crate::error::{SolcError, SolcIoError};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::VersionReq;
use serde::de::DeserializeOwned;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A regex that matches the import path of a solidity import statement with the named groups
/// "p1" to "p4", one per quoting/form combination.
pub static RE_SOL_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+(?:(?:"(?P<p1>[^"]*)"|'(?P<p2>[^']*)')(?:\s+as\s+\w+)?\s*;|(?:\*(?:\s+as\s+\w+)?|\{[^}]*\})\s+from\s+(?:"(?P<p3>[^"]*)"|'(?P<p4>[^']*)')\s*;)"#).unwrap()
});

/// A regex that matches the version part of a solidity pragma
/// as follows: `pragma solidity ^0.5.2;` => `^0.5.2`
/// statement with the named group "version".
pub static RE_SOL_PRAGMA_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pragma\s+solidity\s+(?P<version>.+?);").unwrap());

/// Returns all path parts from any solidity import statement in a string,
/// `import "./contracts/Contract.sol";` -> `"./contracts/Contract.sol"`.
///
/// See also <https://docs.soliditylang.org/en/v0.8.9/grammar.html>
pub fn find_import_paths(contract: &str) -> impl Iterator<Item = regex::Match<'_>> {
    RE_SOL_IMPORT.captures_iter(contract).filter_map(|cap| {
        cap.name("p1").or_else(|| cap.name("p2")).or_else(|| cap.name("p3")).or_else(|| cap.name("p4"))
    })
}

/// Returns the solidity version pragma from the given input:
/// `pragma solidity ^0.5.2;` => `^0.5.2`
pub fn find_version_pragma(contract: &str) -> Option<regex::Match<'_>> {
    RE_SOL_PRAGMA_VERSION.captures(contract)?.name("version")
}

/// Returns the corresponding [VersionReq] for the solidity version pragma.
///
/// Solidity declares version ranges with a space: `>=0.8.0 <0.9.0`, whereas the semver package
/// requires them to be separated with a comma.
pub fn version_req(version: &str) -> Result<VersionReq, SolcError> {
    let version = version.replace(' ', ",");

    // Somehow, Solidity semver without an operator is considered to be "exact",
    // but lack of operator automatically marks the operator as Caret, so we need
    // to manually patch it? :shrug:
    let exact = !matches!(&version[0..1], "*" | "^" | "=" | ">" | "<" | "~");
    let mut version = VersionReq::parse(&version)?;
    if exact {
        version.comparators[0].op = semver::Op::Exact;
    }

    Ok(version)
}

/// Returns an iterator that yields all solidity file paths under the root, in no particular order
pub fn source_files_iter(root: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|ext| ext == "sol").unwrap_or_default())
        .map(|e| e.path().into())
}

/// Returns a list of absolute paths to all the solidity files under the root
///
/// NOTE: this does not resolve imports from other locations
pub fn source_files(root: impl AsRef<Path>) -> Vec<PathBuf> {
    source_files_iter(root).collect()
}

/// Attempts to return the path to the current directory's canonical form, `dunce`d to avoid
/// windows UNC paths
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf, SolcIoError> {
    let path = path.as_ref();
    dunce::canonicalize(path).map_err(|err| SolcIoError::new(err, path))
}

/// Canonicalize the path if possible, returning the path unchanged otherwise
pub fn canonicalized(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    canonicalize(&path).unwrap_or(path)
}

/// Returns the forward-slash source name for the given path relative to the project root.
///
/// This is the identifier of the file used in the compiler input and all build artifacts.
pub fn source_name(path: &Path, root: impl AsRef<Path>) -> String {
    use path_slash::PathExt;
    path.strip_prefix(root.as_ref()).unwrap_or(path).to_slash_lossy().into_owned()
}

/// Joins a relative import against the directory of the importing file's source name and
/// normalizes `.` and `..` components.
///
/// Returns `None` if the import walks out of the namespace the source name is rooted in, for
/// example `../../Escape.sol` imported from `contracts/A.sol`.
pub fn normalize_relative_source_name(base: &str, import: &str) -> Option<String> {
    let parent = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    let mut segments = Vec::new();
    let joined = parent.join(import);
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                segments.pop()?;
            }
            Component::Normal(segment) => segments.push(segment.to_string_lossy()),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if segments.is_empty() {
        return None
    }
    Some(segments.join("/"))
}

/// Reads the json file and deserialize it into the provided type
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, SolcError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|err| SolcError::io(err, path))?;
    let file = std::io::BufReader::new(file);
    let val: T = serde_json::from_reader(file)?;
    Ok(val)
}

/// Creates the parent directory of the `file` and all its ancestors
pub fn create_parent_dir_all(file: impl AsRef<Path>) -> Result<(), SolcError> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            SolcError::msg(format!(
                "Failed to create artifact parent folder \"{}\": {}",
                parent.display(),
                err
            ))
        })?;
    }
    Ok(())
}

/// Returns the fully qualified name `<source name>:<contract name>` of a contract
pub fn fully_qualified_name(source_name: &str, contract: &str) -> String {
    format!("{source_name}:{contract}")
}

/// Creates a new named tempdir
#[cfg(any(test, feature = "project-util"))]
pub fn tempdir(name: &str) -> Result<tempfile::TempDir, SolcIoError> {
    tempfile::Builder::new().prefix(name).tempdir().map_err(|err| SolcIoError::new(err, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        fs::{create_dir_all, File},
    };

    #[test]
    fn can_find_solidity_sources() {
        let tmp_dir = tempdir("contracts").unwrap();

        let file_a = tmp_dir.path().join("a.sol");
        let nested = tmp_dir.path().join("nested");
        let file_b = nested.join("b.sol");
        let nested_deep = nested.join("deep");
        let file_c = nested_deep.join("c.sol");
        File::create(&file_a).unwrap();
        create_dir_all(nested_deep).unwrap();
        File::create(&file_b).unwrap();
        File::create(&file_c).unwrap();

        let files: HashSet<_> = source_files(tmp_dir.path()).into_iter().collect();
        let expected: HashSet<_> = [file_a, file_b, file_c].into();
        assert_eq!(files, expected);
    }

    #[test]
    fn can_find_import_paths() {
        let s = r#"//SPDX-License-Identifier: Unlicense
pragma solidity ^0.8.0;
import "hardhat/console.sol";
import "../contract/Contract.sol";
import { T } from "../Test.sol";
import { T } from '../Test2.sol';
"#;
        assert_eq!(
            vec![
                "hardhat/console.sol",
                "../contract/Contract.sol",
                "../Test.sol",
                "../Test2.sol"
            ],
            find_import_paths(s).map(|m| m.as_str()).collect::<Vec<&str>>()
        );
    }

    #[test]
    fn can_find_version() {
        let s = r"//SPDX-License-Identifier: Unlicense
pragma solidity ^0.8.0;
";
        assert_eq!(Some("^0.8.0"), find_version_pragma(s).map(|s| s.as_str()));
    }

    #[test]
    fn can_parse_version_req() {
        assert_eq!(version_req("^0.8.0").unwrap(), VersionReq::parse("^0.8.0").unwrap());
        assert_eq!(
            version_req(">=0.8.0 <0.9.0").unwrap(),
            VersionReq::parse(">=0.8.0,<0.9.0").unwrap()
        );

        // pinned versions are exact, not caret
        let exact = version_req("0.8.17").unwrap();
        assert!(exact.matches(&semver::Version::new(0, 8, 17)));
        assert!(!exact.matches(&semver::Version::new(0, 8, 18)));
    }

    #[test]
    fn can_normalize_relative_source_names() {
        assert_eq!(
            normalize_relative_source_name("contracts/A.sol", "./B.sol").unwrap(),
            "contracts/B.sol"
        );
        assert_eq!(
            normalize_relative_source_name("contracts/tokens/A.sol", "../B.sol").unwrap(),
            "contracts/B.sol"
        );
        assert_eq!(
            normalize_relative_source_name("A.sol", "./sub/B.sol").unwrap(),
            "sub/B.sol"
        );
        // escaping the root is illegal
        assert!(normalize_relative_source_name("A.sol", "../B.sol").is_none());
        assert!(normalize_relative_source_name("contracts/A.sol", "../../../B.sol").is_none());
    }
}
