use crate::planner::JobCreationErrors;
use semver::Version;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolcError>;

/// Various error types
#[derive(Debug, Error)]
pub enum SolcError {
    /// Internal solc error
    #[error("Solc Error: {0}")]
    SolcError(String),
    /// An import or input that could not be mapped to a file on disk
    #[error("failed to resolve \"{0}\": file not found")]
    FileNotFound(String),
    /// A relative import that escapes the root it is resolved against
    #[error("illegal import \"{import}\" in \"{from}\": path escapes the project root")]
    IllegalImport { import: String, from: String },
    /// A package-rooted source name whose package the lookup does not know
    #[error("package \"{0}\" is imported but not installed")]
    PackageNotInstalled(String),
    /// One or more errors that occurred while assembling compilation jobs
    #[error(transparent)]
    Planning(#[from] JobCreationErrors),
    /// Neither the native nor the portable build of the requested compiler could be used
    #[error("unable to acquire solc {version}: {detail}")]
    CannotAcquireCompiler { version: Version, detail: String },
    #[error(
        "checksum mismatch for solc {version}: expected {expected}, found {detected} for \"{}\"",
        file.display()
    )]
    ChecksumMismatch { version: Version, expected: String, detected: String, file: PathBuf },
    #[error("no solc {version} build for platform \"{platform}\"")]
    PlatformUnsupported { version: Version, platform: String },
    #[error("no entry for solc {0} in the build index")]
    VersionNotFound(Version),
    /// The compiler produced output that is not valid standard JSON
    #[error("malformed compiler output: {0}")]
    CompilerProtocol(String),
    #[error("build was cancelled")]
    Cancelled,
    #[error(transparent)]
    SemverError(#[from] semver::Error),
    /// Deserialization error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Filesystem IO error
    #[error(transparent)]
    Io(#[from] SolcIoError),
    /// General purpose message
    #[error("{0}")]
    Message(String),
}

impl SolcError {
    pub(crate) fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        SolcIoError::new(err, path).into()
    }

    pub(crate) fn solc(msg: impl Into<String>) -> Self {
        SolcError::SolcError(msg.into())
    }

    pub(crate) fn msg(msg: impl Into<String>) -> Self {
        SolcError::Message(msg.into())
    }

    /// The process exit code this error maps to: `2` for planning failures, `3` for compiler
    /// acquisition failures and `1` for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            SolcError::Planning(_) => 2,
            SolcError::CannotAcquireCompiler { .. } |
            SolcError::ChecksumMismatch { .. } |
            SolcError::PlatformUnsupported { .. } |
            SolcError::VersionNotFound(_) => 3,
            _ => 1,
        }
    }
}

#[derive(Debug, Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct SolcIoError {
    io: io::Error,
    path: PathBuf,
}

impl SolcIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<SolcIoError> for io::Error {
    fn from(err: SolcIoError) -> Self {
        err.io
    }
}
