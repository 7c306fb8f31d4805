//! Represents an entire build

use crate::{
    artifacts::{CompilerInput, CompilerOutput},
    utils, SolcError,
};
use md5::Digest;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BUILD_INFO_FORMAT_VERSION: &str = "solbuild-build-info-1";

/// A hardhat compatible build info representation
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub id: String,
    #[serde(rename = "_format")]
    pub format: String,
    pub solc_version: Version,
    pub solc_long_version: String,
    pub input: CompilerInput,
    pub output: CompilerOutput,
}

impl BuildInfo {
    /// Deserializes the `BuildInfo` object from the given file
    pub fn read(path: impl AsRef<Path>) -> Result<Self, SolcError> {
        utils::read_json_file(path)
    }
}

/// A serialized [BuildInfo] together with the hash that identifies it
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawBuildInfo {
    /// The hash that identifies the build
    pub id: String,
    /// serialized `BuildInfo` json
    pub build_info: String,
}

impl RawBuildInfo {
    /// Serializes a `BuildInfo` object, its id is the digest over the compiler identity and the
    /// full compiler input, so the same input compiled by the same compiler maps to the same
    /// build info
    pub fn new(
        input: &CompilerInput,
        output: &CompilerOutput,
        version: &Version,
        long_version: &str,
    ) -> serde_json::Result<RawBuildInfo> {
        let solc_short = format!("{}.{}.{}", version.major, version.minor, version.patch);

        let mut hasher = md5::Md5::new();
        hasher.update(BUILD_INFO_FORMAT_VERSION);
        hasher.update(&solc_short);
        hasher.update(long_version);
        hasher.update(serde_json::to_vec(input)?);
        let id = hex::encode(hasher.finalize());

        let info = BuildInfo {
            id: id.clone(),
            format: BUILD_INFO_FORMAT_VERSION.to_string(),
            solc_version: version.clone(),
            solc_long_version: long_version.to_string(),
            input: input.clone(),
            output: output.clone(),
        };
        Ok(RawBuildInfo { id, build_info: serde_json::to_string_pretty(&info)? })
    }
}
