//! Driving the external `solc` compiler over the standard JSON interface

use crate::{
    artifacts::{CompilerInput, CompilerOutput},
    error::{Result, SolcError},
};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{BufRead, Read, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    str::FromStr,
    time::{Duration, Instant},
};

pub mod install;
pub mod project;

/// How long the `--version` probe of a freshly acquired native binary may take before the
/// binary is considered broken
pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard cap on the bytes read from a compiler's stdout, everything beyond it is a protocol
/// violation rather than an allocation
const MAX_COMPILER_OUTPUT: u64 = 64 * 1024 * 1024;

/// The javascript interpreter used to run the portable compiler
const DEFAULT_JS_RUNTIME: &str = "node";

/// Loads the portable soljson build and round-trips standard JSON over stdio, the same calling
/// convention the native binary has with `--standard-json`
const PORTABLE_SHIM: &str = r#"
const fs = require('fs');
const soljson = require(process.argv[1]);
const compile = soljson.cwrap('solc_compile', 'string', ['string', 'number', 'number']);
const input = fs.readFileSync(0, 'utf8');
process.stdout.write(compile(input, 0, 0));
"#;

/// A usable compiler for one exact version, either a platform-native binary or the portable
/// (soljson) fallback
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcBuild {
    /// Path of the executable, or of the soljson bundle for portable builds
    pub compiler_path: PathBuf,
    /// Whether this is the platform independent fallback compiler
    pub is_portable: bool,
    pub version: Version,
    /// The upstream identifier, e.g. `0.8.17+commit.8df45f5f`
    pub long_version: String,
}

/// Seam between the pipeline and an actual compiler process, implemented by [Solc] and swapped
/// for a double in tests
pub trait Compiler {
    fn build(&self) -> &SolcBuild;

    /// Compiles the standard JSON input and returns the parsed output
    fn compile(&self, input: &CompilerInput) -> Result<CompilerOutput>;
}

/// How the pipeline obtains a [Compiler] for a requested version, implemented by
/// [install::Installer]
pub trait CompilerSupplier {
    fn acquire(&self, version: &Version, quiet: bool) -> Result<Box<dyn Compiler>>;

    /// All compiler versions known to exist, used to decide whether a pragma range is
    /// satisfiable at all
    fn known_versions(&self) -> Vec<Version> {
        Vec::new()
    }
}

/// Abstraction over the `solc` command line utility
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Solc {
    build: SolcBuild,
    /// interpreter used when the build is portable
    js_runtime: PathBuf,
    /// Additional arguments passed to the `solc` executable
    pub args: Vec<String>,
}

impl Solc {
    /// A new instance for the given build
    pub fn new(build: SolcBuild) -> Self {
        Solc { build, js_runtime: PathBuf::from(DEFAULT_JS_RUNTIME), args: Vec::new() }
    }

    /// Sets the interpreter used to execute portable builds
    #[must_use]
    pub fn with_js_runtime(mut self, runtime: impl Into<PathBuf>) -> Self {
        self.js_runtime = runtime.into();
        self
    }

    /// Adds an argument to pass to the `solc` command.
    #[must_use]
    pub fn arg<T: Into<String>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Runs `solc --standard-json` and returns the raw bytes of its stdout
    pub fn compile_output(&self, input: &CompilerInput) -> Result<Vec<u8>> {
        let mut cmd = if self.build.is_portable {
            let mut cmd = Command::new(&self.js_runtime);
            cmd.arg("-e").arg(PORTABLE_SHIM).arg(&self.build.compiler_path);
            cmd
        } else {
            let mut cmd = Command::new(&self.build.compiler_path);
            cmd.args(&self.args).arg("--standard-json");
            cmd
        };

        tracing::trace!("spawning \"{}\"", self.build.compiler_path.display());
        let mut child = cmd
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| SolcError::io(err, &self.build.compiler_path))?;

        let mut stdin = child.stdin.take().expect("stdin is piped");
        serde_json::to_writer(&mut stdin, input)?;
        stdin.flush().map_err(|err| SolcError::io(err, &self.build.compiler_path))?;
        // closing stdin signals the compiler that the input is complete
        drop(stdin);

        // drain stderr on the side so a chatty compiler can not deadlock on a full pipe
        let stderr = child.stderr.take().expect("stderr is piped");
        let stderr = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let mut stderr = stderr;
            stderr.read_to_end(&mut buf).ok();
            buf
        });

        let mut output = Vec::new();
        let stdout = child.stdout.take().expect("stdout is piped");
        stdout
            .take(MAX_COMPILER_OUTPUT + 1)
            .read_to_end(&mut output)
            .map_err(|err| SolcError::io(err, &self.build.compiler_path))?;
        if output.len() as u64 > MAX_COMPILER_OUTPUT {
            let _ = child.kill();
            return Err(SolcError::CompilerProtocol(format!(
                "output exceeded {MAX_COMPILER_OUTPUT} bytes"
            )))
        }

        let status = child
            .wait()
            .map_err(|err| SolcError::io(err, &self.build.compiler_path))?;
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            return Err(SolcError::solc(String::from_utf8_lossy(&stderr).to_string()))
        }
        Ok(output)
    }

    /// Returns the version reported by the configured executable
    pub fn version(&self) -> Result<Version> {
        probe_version(&self.build.compiler_path, VERSION_PROBE_TIMEOUT)
    }
}

impl Compiler for Solc {
    fn build(&self) -> &SolcBuild {
        &self.build
    }

    fn compile(&self, input: &CompilerInput) -> Result<CompilerOutput> {
        let output = self.compile_output(input)?;
        serde_json::from_slice(&output)
            .map_err(|err| SolcError::CompilerProtocol(err.to_string()))
    }
}

impl fmt::Display for Solc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build.compiler_path.display())?;
        if !self.args.is_empty() {
            write!(f, " {}", self.args.join(" "))?;
        }
        Ok(())
    }
}

impl AsRef<Path> for Solc {
    fn as_ref(&self) -> &Path {
        &self.build.compiler_path
    }
}

/// Invokes `<binary> --version` and parses the reported version.
///
/// The probe enforces a timeout: a native binary downloaded for the wrong libc or a broken
/// interpreter line tends to hang rather than exit, and a hanging probe must fail over to the
/// portable build instead of stalling the whole compilation.
pub fn probe_version(binary: &Path, timeout: Duration) -> Result<Version> {
    let mut child = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|err| SolcError::io(err, binary))?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().map_err(|err| SolcError::io(err, binary))? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SolcError::solc(format!(
                        "\"{}\" did not answer --version within {timeout:?}",
                        binary.display()
                    )))
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    };

    let mut stdout = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_end(&mut stdout).map_err(|err| SolcError::io(err, binary))?;
    }
    if !status.success() {
        let mut stderr = Vec::new();
        if let Some(mut err) = child.stderr.take() {
            err.read_to_end(&mut stderr).ok();
        }
        return Err(SolcError::solc(String::from_utf8_lossy(&stderr).to_string()))
    }

    let version = stdout
        .lines()
        .map_while(std::result::Result::ok)
        .filter(|l| !l.trim().is_empty())
        .last()
        .ok_or_else(|| SolcError::solc("version not found in solc output"))?;
    // NOTE: semver doesn't like `+` in g++ in build metadata which is invalid semver
    Ok(Version::from_str(&version.trim_start_matches("Version: ").replace(".g++", ".gcc"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_parse_version_metadata() {
        let _version = Version::from_str("0.6.6+commit.6c089d02.Linux.gcc").unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn probe_reports_version() {
        use std::{fs, os::unix::fs::PermissionsExt};

        let tmp = crate::utils::tempdir("probe").unwrap();
        let binary = tmp.path().join("solc");
        fs::write(&binary, "#!/bin/sh\necho 'solc, the solidity compiler'\necho 'Version: 0.8.17+commit.8df45f5f.Linux.gcc'\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        let version = probe_version(&binary, VERSION_PROBE_TIMEOUT).unwrap();
        assert_eq!((version.major, version.minor, version.patch), (0, 8, 17));
    }

    #[test]
    #[cfg(unix)]
    fn probe_times_out_on_hanging_binaries() {
        use std::{fs, os::unix::fs::PermissionsExt};

        let tmp = crate::utils::tempdir("probe").unwrap();
        let binary = tmp.path().join("solc");
        fs::write(&binary, "#!/bin/sh\nsleep 60\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        let start = Instant::now();
        let err = probe_version(&binary, Duration::from_millis(200)).unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(err.to_string().contains("--version"));
    }

    #[test]
    #[cfg(unix)]
    fn probe_rejects_failing_binaries() {
        use std::{fs, os::unix::fs::PermissionsExt};

        let tmp = crate::utils::tempdir("probe").unwrap();
        let binary = tmp.path().join("solc");
        fs::write(&binary, "#!/bin/sh\necho 'illegal instruction' >&2\nexit 4\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(probe_version(&binary, VERSION_PROBE_TIMEOUT).is_err());
    }
}
