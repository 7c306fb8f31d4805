//! Locating and downloading platform-native `solc` binaries.
//!
//! Binaries are resolved through a per-platform build index, the manifest published at
//! <https://binaries.soliditylang.org>: one entry per release with the download path and its
//! `sha256` and `keccak256` digests. Both digests are pinned: a download or a cached binary that
//! does not match its index entry is an error, never a warning.
//!
//! A freshly resolved native binary is probed with `--version` before it is trusted. Statically
//! hosted binaries routinely break on exotic hosts (musl, missing libc symbols), in which case
//! the portable soljson build of the same version takes over.

use crate::{
    compile::{probe_version, Compiler, CompilerSupplier, Solc, SolcBuild, VERSION_PROBE_TIMEOUT},
    error::{Result, SolcError},
    report,
};
use fs4::FileExt;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::{
    collections::{HashMap, HashSet},
    env, fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tiny_keccak::{Hasher, Keccak};

/// The base url all build indexes and binaries are fetched from
pub const SOLC_RELEASES_URL: &str = "https://binaries.soliditylang.org";

/// The platform identifier of the portable (soljson) builds
pub const PORTABLE_PLATFORM: &str = "wasm";

/// Overrides the compiler cache directory
pub const CACHE_DIR_ENV: &str = "CACHE_DIR";

/// Set to forbid all downloads, only already cached compilers are usable
pub const OFFLINE_ENV: &str = "OFFLINE";

/// Default limit for establishing a connection to the release endpoint
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit for a whole download
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Returns the identifier of the preferred native build platform, `None` if upstream publishes
/// no native binaries for this host
pub fn native_platform() -> Option<&'static str> {
    match (env::consts::OS, env::consts::ARCH) {
        ("linux", "x86_64") => Some("linux-amd64"),
        // aarch64 macs run the amd64 binaries through rosetta
        ("macos", "x86_64") | ("macos", "aarch64") => Some("macosx-amd64"),
        ("windows", "x86_64") => Some("windows-amd64"),
        _ => None,
    }
}

/// The default directory compilers and build indexes are cached in, `~/.solbuild` unless
/// overridden with `CACHE_DIR`
pub fn default_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var(CACHE_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir))
        }
    }
    home::home_dir()
        .map(|dir| dir.join(".solbuild"))
        .ok_or_else(|| SolcError::msg("could not detect the home directory"))
}

fn offline() -> bool {
    match env::var(OFFLINE_ENV) {
        Ok(val) => !val.is_empty() && val != "0" && val != "false",
        Err(_) => false,
    }
}

/// The per-platform build index
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildIndex {
    #[serde(default)]
    pub builds: Vec<IndexEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_release: Option<String>,
}

impl BuildIndex {
    fn entry(&self, version: &Version) -> Option<&IndexEntry> {
        self.builds.iter().find(|entry| &entry.version == version)
    }
}

/// A single build of the index manifest
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub version: Version,
    pub long_version: String,
    /// file name of the binary relative to the platform dir
    pub path: String,
    pub keccak256: String,
    pub sha256: String,
}

/// Resolves compiler versions to verified executables, downloading them on demand.
///
/// Concurrent acquisitions of the same version, also across processes, are serialized through a
/// per-version lock file in the cache directory so a binary is never downloaded twice.
pub struct Installer {
    cache_dir: PathBuf,
    base_url: String,
    offline: bool,
    client: reqwest::blocking::Client,
    /// memoized per-platform indexes
    index: Mutex<HashMap<String, BuildIndex>>,
    /// native binaries that failed the version probe in this process
    failed_native: Mutex<HashSet<Version>>,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("cache_dir", &self.cache_dir)
            .field("base_url", &self.base_url)
            .field("offline", &self.offline)
            .finish_non_exhaustive()
    }
}

impl Installer {
    pub fn new() -> Result<Self> {
        Ok(Self::with_cache_dir(default_cache_dir()?))
    }

    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            base_url: SOLC_RELEASES_URL.to_string(),
            offline: offline(),
            client: client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT),
            index: Mutex::new(HashMap::new()),
            failed_native: Mutex::new(HashSet::new()),
        }
    }

    /// Points the installer at a different release index, used by mirrors and tests
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the download timeouts, `connect` for establishing the connection and `total`
    /// for a whole transfer
    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, total: Duration) -> Self {
        self.client = client(connect, total);
        self
    }

    /// Resolves the requested version to a usable compiler build.
    ///
    /// The native binary of the host platform is preferred. If it cannot be acquired or fails
    /// the `--version` probe, the portable build of the same version is used instead. `quiet`
    /// suppresses the reporter events.
    pub fn acquire(&self, version: &Version, quiet: bool) -> Result<SolcBuild> {
        match self.try_acquire(version, quiet) {
            Ok(build) => Ok(build),
            // digest and planning related failures keep their identity
            Err(err @ SolcError::ChecksumMismatch { .. }) |
            Err(err @ SolcError::PlatformUnsupported { .. }) => Err(err),
            Err(err) => Err(SolcError::CannotAcquireCompiler {
                version: version.clone(),
                detail: err.to_string(),
            }),
        }
    }

    fn try_acquire(&self, version: &Version, quiet: bool) -> Result<SolcBuild> {
        if let Some(platform) = native_platform() {
            if !self.failed_native.lock().unwrap().contains(version) {
                match self.acquire_platform(version, platform, quiet) {
                    Ok(build) => match probe_version(&build.compiler_path, VERSION_PROBE_TIMEOUT) {
                        Ok(_) => return Ok(build),
                        Err(err) => {
                            // remember the broken binary so later jobs skip the probe
                            self.failed_native.lock().unwrap().insert(version.clone());
                            if !quiet {
                                report::portable_fallback(version, &err.to_string());
                            }
                            tracing::warn!(
                                "native solc {} failed the version probe: {}",
                                version,
                                err
                            );
                        }
                    },
                    Err(err @ SolcError::ChecksumMismatch { .. }) => return Err(err),
                    Err(err) => {
                        tracing::warn!("failed to acquire native solc {}: {}", version, err);
                    }
                }
            }
        }
        self.acquire_platform(version, PORTABLE_PLATFORM, quiet)
    }

    /// Acquires the build of one specific platform, reusing a cached binary when it verifies
    fn acquire_platform(&self, version: &Version, platform: &str, quiet: bool) -> Result<SolcBuild> {
        let index = self.index_of(platform)?;
        if index.builds.is_empty() {
            return Err(SolcError::PlatformUnsupported {
                version: version.clone(),
                platform: platform.to_string(),
            })
        }
        let entry =
            index.entry(version).ok_or_else(|| SolcError::VersionNotFound(version.clone()))?;

        let binary = self.cache_dir.join(platform).join(&entry.path);
        let build = SolcBuild {
            compiler_path: binary.clone(),
            is_portable: platform == PORTABLE_PLATFORM,
            version: version.clone(),
            long_version: entry.long_version.clone(),
        };

        if binary.is_file() {
            verify_file(&binary, entry)?;
            return Ok(build)
        }
        if self.offline {
            return Err(SolcError::msg(format!(
                "solc {version} ({platform}) is not cached and downloads are forbidden in offline mode"
            )))
        }

        let _lock = self.version_lock(version)?;
        // another process may have won the race while we waited on the lock
        if binary.is_file() {
            verify_file(&binary, entry)?;
            return Ok(build)
        }

        if !quiet {
            report::installation_start(version);
        }
        tracing::trace!("downloading solc {} for {}", version, platform);
        let url = format!("{}/{}/{}", self.base_url, platform, entry.path);
        let bytes = match self.download(&url) {
            Ok(bytes) => bytes,
            Err(err) => {
                if !quiet {
                    report::installation_error(version, &err.to_string());
                }
                return Err(err)
            }
        };
        if let Err(err) = verify_bytes(&bytes, entry, &binary) {
            if !quiet {
                report::installation_error(version, &err.to_string());
            }
            return Err(err)
        }

        crate::utils::create_parent_dir_all(&binary)?;
        fs::write(&binary, bytes).map_err(|err| SolcError::io(err, &binary))?;
        #[cfg(unix)]
        if platform != PORTABLE_PLATFORM {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))
                .map_err(|err| SolcError::io(err, &binary))?;
        }

        if !quiet {
            report::installation_success(version);
        }
        Ok(build)
    }

    /// Returns the build index for the platform, from memory, disk, or the release endpoint
    fn index_of(&self, platform: &str) -> Result<BuildIndex> {
        if let Some(index) = self.index.lock().unwrap().get(platform) {
            return Ok(index.clone())
        }

        let cached = self.cache_dir.join(platform).join("list.json");
        let index: BuildIndex = if cached.is_file() {
            crate::utils::read_json_file(&cached)?
        } else {
            if self.offline {
                return Err(SolcError::msg(format!(
                    "no cached build index for \"{platform}\" and downloads are forbidden in offline mode"
                )))
            }
            let bytes = self.download(&format!("{}/{}/list.json", self.base_url, platform))?;
            let index = serde_json::from_slice(&bytes)?;
            crate::utils::create_parent_dir_all(&cached)?;
            fs::write(&cached, &bytes).map_err(|err| SolcError::io(err, &cached))?;
            index
        };

        self.index.lock().unwrap().insert(platform.to_string(), index.clone());
        Ok(index)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        tracing::trace!("downloading \"{}\"", url);
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| SolcError::msg(format!("failed to download \"{url}\": {err}")))?;
        let bytes = response
            .bytes()
            .map_err(|err| SolcError::msg(format!("failed to download \"{url}\": {err}")))?;
        Ok(bytes.to_vec())
    }

    /// Takes the exclusive per-version lock, blocking until it is free
    fn version_lock(&self, version: &Version) -> Result<LockedFile> {
        fs::create_dir_all(&self.cache_dir).map_err(|err| SolcError::io(err, &self.cache_dir))?;
        let path = self.cache_dir.join(format!(".lock-solc-{version}"));
        let file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| SolcError::io(err, &path))?;
        file.lock_exclusive().map_err(|err| SolcError::io(err, &path))?;
        Ok(LockedFile(file))
    }
}

impl CompilerSupplier for Installer {
    fn acquire(&self, version: &Version, quiet: bool) -> Result<Box<dyn Compiler>> {
        let build = Installer::acquire(self, version, quiet)?;
        Ok(Box::new(Solc::new(build)))
    }

    fn known_versions(&self) -> Vec<Version> {
        let platform = native_platform().unwrap_or(PORTABLE_PLATFORM);
        match self.index_of(platform) {
            Ok(index) => index.builds.into_iter().map(|entry| entry.version).collect(),
            Err(err) => {
                tracing::trace!("no build index available: {}", err);
                Vec::new()
            }
        }
    }
}

fn client(connect: Duration, total: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .connect_timeout(connect)
        .timeout(total)
        .build()
        .expect("reqwest client config is static")
}

/// Unlocks on drop
struct LockedFile(fs::File);

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

fn verify_file(binary: &Path, entry: &IndexEntry) -> Result<()> {
    let bytes = fs::read(binary).map_err(|err| SolcError::io(err, binary))?;
    verify_bytes(&bytes, entry, binary)
}

/// Verifies both published digests of a build, sha256 and keccak256
fn verify_bytes(bytes: &[u8], entry: &IndexEntry, file: &Path) -> Result<()> {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    let sha256 = hex::encode(hasher.finalize());
    if !digest_eq(&sha256, &entry.sha256) {
        return Err(SolcError::ChecksumMismatch {
            version: entry.version.clone(),
            expected: entry.sha256.clone(),
            detected: sha256,
            file: file.to_path_buf(),
        })
    }

    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(bytes);
    keccak.finalize(&mut output);
    let keccak256 = hex::encode(output);
    if !digest_eq(&keccak256, &entry.keccak256) {
        return Err(SolcError::ChecksumMismatch {
            version: entry.version.clone(),
            expected: entry.keccak256.clone(),
            detected: keccak256,
            file: file.to_path_buf(),
        })
    }
    Ok(())
}

fn digest_eq(detected: &str, expected: &str) -> bool {
    let expected = expected.strip_prefix("0x").unwrap_or(expected);
    detected.eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;

    fn entry_for(bytes: &[u8], version: &str) -> IndexEntry {
        let mut hasher = sha2::Sha256::new();
        hasher.update(bytes);
        let sha256 = format!("0x{}", hex::encode(hasher.finalize()));

        let mut keccak = Keccak::v256();
        let mut output = [0u8; 32];
        keccak.update(bytes);
        keccak.finalize(&mut output);

        IndexEntry {
            version: version.parse().unwrap(),
            long_version: format!("{version}+commit.deadbeef"),
            path: format!("solc-{version}"),
            keccak256: format!("0x{}", hex::encode(output)),
            sha256,
        }
    }

    #[test]
    fn verifies_both_digests() {
        let bytes = b"definitely a compiler";
        let entry = entry_for(bytes, "0.8.17");
        verify_bytes(bytes, &entry, Path::new("solc-0.8.17")).unwrap();

        let mut tampered = entry.clone();
        tampered.sha256 = format!("0x{}", hex::encode([0u8; 32]));
        assert!(matches!(
            verify_bytes(bytes, &tampered, Path::new("solc-0.8.17")),
            Err(SolcError::ChecksumMismatch { .. })
        ));

        let mut tampered = entry;
        tampered.keccak256 = format!("0x{}", hex::encode([0u8; 32]));
        assert!(matches!(
            verify_bytes(bytes, &tampered, Path::new("solc-0.8.17")),
            Err(SolcError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn reuses_a_verified_cached_binary() {
        let tmp = utils::tempdir("installer").unwrap();
        let cache_dir = tmp.path();
        let platform = native_platform().unwrap_or(PORTABLE_PLATFORM);

        let bytes = b"#!/bin/sh\necho Version: 0.8.17+commit.deadbeef\n";
        let entry = entry_for(bytes, "0.8.17");
        let index =
            BuildIndex { builds: vec![entry.clone()], latest_release: Some("0.8.17".to_string()) };

        let platform_dir = cache_dir.join(platform);
        fs::create_dir_all(&platform_dir).unwrap();
        fs::write(platform_dir.join("list.json"), serde_json::to_vec(&index).unwrap()).unwrap();
        fs::write(platform_dir.join(&entry.path), bytes).unwrap();

        let installer = Installer::with_cache_dir(cache_dir)
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(60));
        let build = installer.acquire_platform(&entry.version, platform, true).unwrap();
        assert_eq!(build.long_version, entry.long_version);
        assert_eq!(build.compiler_path, platform_dir.join(&entry.path));

        // a tampered binary must not be reused
        fs::write(platform_dir.join(&entry.path), b"tampered").unwrap();
        assert!(matches!(
            installer.acquire_platform(&entry.version, platform, true),
            Err(SolcError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn missing_version_is_reported() {
        let tmp = utils::tempdir("installer").unwrap();
        let platform = native_platform().unwrap_or(PORTABLE_PLATFORM);
        let platform_dir = tmp.path().join(platform);
        fs::create_dir_all(&platform_dir).unwrap();
        let index = BuildIndex {
            builds: vec![entry_for(b"other", "0.8.16")],
            latest_release: None,
        };
        fs::write(platform_dir.join("list.json"), serde_json::to_vec(&index).unwrap()).unwrap();

        let installer = Installer::with_cache_dir(tmp.path());
        assert!(matches!(
            installer.acquire_platform(&"0.8.17".parse().unwrap(), platform, true),
            Err(SolcError::VersionNotFound(_))
        ));
    }

    #[test]
    fn known_versions_come_from_the_index() {
        let tmp = utils::tempdir("installer").unwrap();
        let platform = native_platform().unwrap_or(PORTABLE_PLATFORM);
        let platform_dir = tmp.path().join(platform);
        fs::create_dir_all(&platform_dir).unwrap();
        let index = BuildIndex {
            builds: vec![entry_for(b"a", "0.8.16"), entry_for(b"b", "0.8.17")],
            latest_release: None,
        };
        fs::write(platform_dir.join("list.json"), serde_json::to_vec(&index).unwrap()).unwrap();

        let installer = Installer::with_cache_dir(tmp.path());
        let versions = CompilerSupplier::known_versions(&installer);
        assert_eq!(versions.len(), 2);
    }
}
