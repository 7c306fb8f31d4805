//! Types for the `solc --standard-json` input and output

use crate::error::SolcIoError;
use md5::Digest;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};
use yansi::Paint;

/// An ordered list of source names and their content
pub type Sources = BTreeMap<String, Source>;

/// The opaque `settings` object forwarded to the compiler verbatim.
///
/// The driver never interprets individual settings, it only compares them for equality when
/// merging jobs and checking the cache. `serde_json`'s default map is ordered, so two settings
/// maps with the same entries always serialize identically.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Output of a single compiled contract, kept opaque for the artifact store
pub type Contract = serde_json::Value;

/// file -> (contract name -> Contract)
pub type Contracts = BTreeMap<String, BTreeMap<String, Contract>>;

const SOLIDITY: &str = "Solidity";

/// Content of a solidity file
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
}

impl Source {
    /// this is a heuristically measured threshold at which we can generally expect a speedup by
    /// using rayon's `par_iter`, See `Self::read_all_files`
    pub const NUM_READ_PAR: usize = 8;

    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }

    /// Reads the file content
    pub fn read(file: impl AsRef<Path>) -> Result<Self, SolcIoError> {
        let file = file.as_ref();
        Ok(Self { content: fs::read_to_string(file).map_err(|err| SolcIoError::new(err, file))? })
    }

    /// Reads all source files of the given vec
    ///
    /// Depending on the len of the vec it will try to read the files in parallel
    pub fn read_all_files(files: Vec<PathBuf>) -> Result<Vec<(PathBuf, Self)>, SolcIoError> {
        use rayon::prelude::*;

        if files.len() < Self::NUM_READ_PAR {
            files.into_iter().map(|file| Self::read(&file).map(|source| (file, source))).collect()
        } else {
            files
                .into_par_iter()
                .map(|file| Self::read(&file).map(|source| (file, source)))
                .collect()
        }
    }

    /// Returns the stable digest of the exact content that is passed to the compiler
    pub fn content_hash(&self) -> String {
        let mut hasher = md5::Md5::new();
        hasher.update(&self.content);
        let result = hasher.finalize();
        hex::encode(result)
    }
}

impl AsRef<str> for Source {
    fn as_ref(&self) -> &str {
        &self.content
    }
}

/// Input type `solc` expects
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompilerInput {
    pub language: String,
    pub sources: Sources,
    pub settings: Settings,
}

impl CompilerInput {
    /// Creates a new [CompilerInput] with the given sources, keyed by source name
    pub fn with_sources(sources: Sources) -> Self {
        Self { language: SOLIDITY.to_string(), sources, settings: Settings::default() }
    }

    /// Sets the settings for compilation
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}

/// Output type `solc` produces
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilerOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceFile>,
    #[serde(default)]
    pub contracts: Contracts,
}

impl CompilerOutput {
    /// Whether the output contains a compiler error
    pub fn has_error(&self) -> bool {
        self.errors.iter().any(|err| err.severity.is_error())
    }

    /// Whether the output contains a compiler warning
    pub fn has_warning(&self) -> bool {
        self.errors.iter().any(|err| err.severity.is_warning())
    }

    /// Combines the `other` output into self, used when outputs of several jobs are aggregated
    pub fn merge(&mut self, other: CompilerOutput) {
        self.errors.extend(other.errors);
        self.sources.extend(other.sources);
        self.contracts.extend(other.contracts);
    }

    /// Returns the names of all contracts compiled from the given file
    pub fn contract_names_of(&self, source_name: &str) -> Vec<String> {
        self.contracts.get(source_name).map(|c| c.keys().cloned().collect()).unwrap_or_default()
    }

    /// Finds the _first_ contract with the given name
    pub fn find(&self, contract: &str) -> Option<&Contract> {
        self.contracts.values().find_map(|contracts| contracts.get(contract))
    }
}

/// The `sources` entry of the compiler output
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<serde_json::Value>,
}

/// A compiler diagnostic
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    pub r#type: String,
    #[serde(default)]
    pub component: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
}

impl Error {
    /// Whether this diagnostic is the `console.log` helper note, detected by message content
    pub fn is_console_log_hint(&self) -> bool {
        self.message.contains("console.log")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.formatted_message {
            match self.severity {
                Severity::Error => write!(f, "{}", Paint::red(msg)),
                Severity::Warning | Severity::Info => write!(f, "{}", Paint::yellow(msg)),
            }
        } else {
            writeln!(f, "{}: {}", self.severity, self.message)
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub file: String,
    pub start: i32,
    pub end: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("Error"),
            Severity::Warning => f.write_str("Warning"),
            Severity::Info => f.write_str("Info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_parse_compiler_output() {
        let output = r#"{
            "errors": [
                {
                    "sourceLocation": { "file": "contracts/A.sol", "start": 10, "end": 20 },
                    "type": "Warning",
                    "component": "general",
                    "severity": "warning",
                    "message": "Unused local variable.",
                    "formattedMessage": "Warning: Unused local variable."
                }
            ],
            "sources": { "contracts/A.sol": { "id": 0 } },
            "contracts": { "contracts/A.sol": { "A": { "abi": [] } } }
        }"#;
        let output: CompilerOutput = serde_json::from_str(output).unwrap();
        assert!(!output.has_error());
        assert!(output.has_warning());
        assert_eq!(output.contract_names_of("contracts/A.sol"), vec!["A".to_string()]);
    }

    #[test]
    fn content_hash_is_stable() {
        let source = Source::new("pragma solidity ^0.8.0;\n");
        assert_eq!(source.content_hash(), source.clone().content_hash());
        assert_ne!(source.content_hash(), Source::new("pragma solidity ^0.7.0;\n").content_hash());
    }
}
