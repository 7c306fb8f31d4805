//! Output artifact handling

use crate::{
    artifacts::Contract,
    buildinfo::RawBuildInfo,
    cache::CacheEntry,
    error::{Result, SolcError},
    utils,
};
use serde_json::json;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

/// How emitted artifacts and build-info records are persisted.
///
/// The driver never interprets the contract output, it hands every emitted contract of a job to
/// the store together with the path of the job's build-info record. Swapping the implementation
/// changes where and how artifacts land without touching the pipeline, tests use an in-memory
/// double.
pub trait ArtifactStore {
    /// Persists a single contract artifact of the given file
    fn save_artifact(
        &self,
        source_name: &str,
        contract_name: &str,
        contract: &Contract,
        build_info: Option<&Path>,
    ) -> Result<()>;

    /// Persists the build info record of a completed job and returns its location
    fn save_build_info(&self, build_info: &RawBuildInfo) -> Result<PathBuf>;

    /// Whether an artifact exists for the `<source name>:<contract name>` identifier
    fn artifact_exists(&self, fully_qualified_name: &str) -> bool;

    /// Deletes all artifacts that do not belong to any of the given cache entries
    fn remove_obsolete(&self, entries: &BTreeMap<PathBuf, CacheEntry>) -> Result<()>;

    /// Deletes all build info records that no remaining artifact references
    fn remove_obsolete_build_infos(&self) -> Result<()>;
}

/// Hardhat-style artifact layout on disk: `<artifacts>/<source name>/<Contract>.json` plus a
/// `build-info` dir with one record per compiler invocation
#[derive(Clone, Debug)]
pub struct DiskArtifacts {
    artifacts_dir: PathBuf,
    build_infos_dir: PathBuf,
}

impl DiskArtifacts {
    pub fn new(artifacts_dir: impl Into<PathBuf>, build_infos_dir: impl Into<PathBuf>) -> Self {
        Self { artifacts_dir: artifacts_dir.into(), build_infos_dir: build_infos_dir.into() }
    }

    /// The location of the artifact for the given contract
    pub fn artifact_path(&self, source_name: &str, contract_name: &str) -> PathBuf {
        self.artifacts_dir.join(source_name).join(format!("{contract_name}.json"))
    }

    /// Maps an artifact path back to its `(source name, contract name)` identity
    fn artifact_identity(&self, path: &Path) -> Option<(String, String)> {
        let relative = path.strip_prefix(&self.artifacts_dir).ok()?;
        let contract = relative.file_stem()?.to_str()?.to_string();
        let source_name = utils::source_name(relative.parent()?, "");
        Some((source_name, contract))
    }

    fn artifact_files(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.artifacts_dir)
            .into_iter()
            .filter_entry(|entry| entry.path() != self.build_infos_dir)
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().map(|ext| ext == "json").unwrap_or_default())
            .map(|entry| entry.path().to_path_buf())
            .collect()
    }
}

impl ArtifactStore for DiskArtifacts {
    fn save_artifact(
        &self,
        source_name: &str,
        contract_name: &str,
        contract: &Contract,
        build_info: Option<&Path>,
    ) -> Result<()> {
        let path = self.artifact_path(source_name, contract_name);
        utils::create_parent_dir_all(&path)?;

        let build_info = build_info
            .map(|info| {
                // artifacts reference their build info relative to the artifact file
                pathdiff(info, path.parent().expect("artifact path has a parent"))
            })
            .unwrap_or_default();

        let mut artifact = json!({
            "_format": "hh-sol-artifact-1",
            "contractName": contract_name,
            "sourceName": source_name,
            "buildInfo": build_info,
        });
        if let (Some(artifact), Some(contract)) = (artifact.as_object_mut(), contract.as_object())
        {
            for (key, value) in contract {
                artifact.insert(key.clone(), value.clone());
            }
        }

        let file = fs::File::create(&path).map_err(|err| SolcError::io(err, &path))?;
        serde_json::to_writer_pretty(file, &artifact)?;
        tracing::trace!("wrote artifact \"{}\"", path.display());
        Ok(())
    }

    fn save_build_info(&self, build_info: &RawBuildInfo) -> Result<PathBuf> {
        let path = self.build_infos_dir.join(format!("{}.json", build_info.id));
        utils::create_parent_dir_all(&path)?;
        fs::write(&path, &build_info.build_info).map_err(|err| SolcError::io(err, &path))?;
        Ok(path)
    }

    fn artifact_exists(&self, fully_qualified_name: &str) -> bool {
        let Some((source_name, contract)) = fully_qualified_name.rsplit_once(':') else {
            return false
        };
        self.artifact_path(source_name, contract).is_file()
    }

    fn remove_obsolete(&self, entries: &BTreeMap<PathBuf, CacheEntry>) -> Result<()> {
        let valid: BTreeSet<(String, String)> = entries
            .values()
            .flat_map(|entry| {
                entry
                    .artifacts
                    .iter()
                    .map(|contract| (entry.source_name.clone(), contract.clone()))
            })
            .collect();

        for file in self.artifact_files() {
            let Some(identity) = self.artifact_identity(&file) else { continue };
            if !valid.contains(&identity) {
                tracing::trace!("removing obsolete artifact \"{}\"", file.display());
                fs::remove_file(&file).map_err(|err| SolcError::io(err, &file))?;
                // prune now empty dirs up to the artifacts root
                let mut dir = file.parent();
                while let Some(candidate) = dir {
                    if candidate == self.artifacts_dir || fs::remove_dir(candidate).is_err() {
                        break
                    }
                    dir = candidate.parent();
                }
            }
        }
        Ok(())
    }

    fn remove_obsolete_build_infos(&self) -> Result<()> {
        if !self.build_infos_dir.is_dir() {
            return Ok(())
        }
        // collect the records the remaining artifacts still point at
        let mut referenced = BTreeSet::new();
        for file in self.artifact_files() {
            if let Ok(artifact) = utils::read_json_file::<serde_json::Value>(&file) {
                if let Some(info) = artifact.get("buildInfo").and_then(|v| v.as_str()) {
                    if let Some(name) = Path::new(info).file_name() {
                        referenced.insert(name.to_os_string());
                    }
                }
            }
        }

        for entry in fs::read_dir(&self.build_infos_dir)
            .map_err(|err| SolcError::io(err, &self.build_infos_dir))?
        {
            let entry = entry.map_err(|err| SolcError::io(err, &self.build_infos_dir))?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or_default() &&
                path.file_name().map(|name| !referenced.contains(name)).unwrap_or_default()
            {
                tracing::trace!("removing obsolete build info \"{}\"", path.display());
                fs::remove_file(&path).map_err(|err| SolcError::io(err, &path))?;
            }
        }
        Ok(())
    }
}

/// Best effort relative path from `base` to `path`, used for the artifact -> build info link
fn pathdiff(path: &Path, base: &Path) -> String {
    let mut base_components: Vec<_> = base.components().collect();
    let path_components: Vec<_> = path.components().collect();
    let mut shared = 0;
    while shared < base_components.len() &&
        shared < path_components.len() &&
        base_components[shared] == path_components[shared]
    {
        shared += 1;
    }
    base_components.drain(..shared);
    let mut parts: Vec<String> = base_components.iter().map(|_| "..".to_string()).collect();
    parts.extend(
        path_components[shared..].iter().map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::CompilerConfig;
    use serde_json::json;

    fn store(tmp: &Path) -> DiskArtifacts {
        DiskArtifacts::new(tmp.join("artifacts"), tmp.join("artifacts").join("build-info"))
    }

    fn cache_entry(source_name: &str, artifacts: &[&str]) -> CacheEntry {
        CacheEntry {
            last_modification_date: 0,
            content_hash: "hash".to_string(),
            source_name: source_name.to_string(),
            solc_config: CompilerConfig::new("0.8.17".parse().unwrap()),
            imports: vec![],
            version_pragmas: vec![],
            artifacts: artifacts.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn artifacts_round_trip_on_disk() {
        let tmp = utils::tempdir("artifacts").unwrap();
        let store = store(tmp.path());

        let contract = json!({ "abi": [], "evm": { "bytecode": { "object": "0x" } } });
        store.save_artifact("contracts/A.sol", "A", &contract, None).unwrap();

        assert!(store.artifact_exists("contracts/A.sol:A"));
        assert!(!store.artifact_exists("contracts/A.sol:B"));
        assert!(!store.artifact_exists("not-a-fqn"));

        let written: serde_json::Value =
            utils::read_json_file(store.artifact_path("contracts/A.sol", "A")).unwrap();
        assert_eq!(written["contractName"], "A");
        assert_eq!(written["sourceName"], "contracts/A.sol");
        assert_eq!(written["abi"], json!([]));
    }

    #[test]
    fn removes_obsolete_artifacts() {
        let tmp = utils::tempdir("artifacts").unwrap();
        let store = store(tmp.path());

        let contract = json!({ "abi": [] });
        store.save_artifact("contracts/A.sol", "A", &contract, None).unwrap();
        store.save_artifact("contracts/Gone.sol", "Gone", &contract, None).unwrap();

        let entries = BTreeMap::from([(
            PathBuf::from("/project/contracts/A.sol"),
            cache_entry("contracts/A.sol", &["A"]),
        )]);
        store.remove_obsolete(&entries).unwrap();

        assert!(store.artifact_exists("contracts/A.sol:A"));
        assert!(!store.artifact_exists("contracts/Gone.sol:Gone"));
    }

    #[test]
    fn removes_unreferenced_build_infos() {
        let tmp = utils::tempdir("artifacts").unwrap();
        let store = store(tmp.path());

        let referenced = RawBuildInfo { id: "live".to_string(), build_info: "{}".to_string() };
        let obsolete = RawBuildInfo { id: "dead".to_string(), build_info: "{}".to_string() };
        let live_path = store.save_build_info(&referenced).unwrap();
        let dead_path = store.save_build_info(&obsolete).unwrap();

        store
            .save_artifact("contracts/A.sol", "A", &json!({ "abi": [] }), Some(&live_path))
            .unwrap();

        store.remove_obsolete_build_infos().unwrap();
        assert!(live_path.exists());
        assert!(!dead_path.exists());
    }
}
