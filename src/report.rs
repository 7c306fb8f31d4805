//! Subscribe to events in the compiler pipeline
//!
//! The orchestrator emits an event before and after every compiler invocation and around every
//! compiler installation. A `Reporter` is entirely passive and only listens to incoming events,
//! the default prints progress to `stdout` the way users expect from a build tool.

use crate::artifacts::CompilerInput;
use once_cell::sync::OnceCell;
use semver::Version;
use std::{error::Error, fmt, sync::Arc};

/// Trait representing the functions required to emit information about various steps in the
/// compiler pipeline.
pub trait Reporter: 'static + Send + Sync {
    /// Callback invoked right before a compiler is invoked for a job
    fn on_compile_start(&self, _version: &Version, _input: &CompilerInput, _dirty: usize) {}

    /// Invoked after a job's compiler produced its output without a protocol failure
    fn on_compile_success(&self, _version: &Version) {}

    /// Invoked before a new compiler version is downloaded
    fn on_installation_start(&self, _version: &Version) {}

    /// Invoked after a new compiler version was downloaded and verified
    fn on_installation_success(&self, _version: &Version) {}

    /// Invoked when a download or verification failed
    fn on_installation_error(&self, _version: &Version, _error: &str) {}

    /// Invoked when a native binary failed the `--version` probe and the portable build is
    /// used instead
    fn on_portable_fallback(&self, _version: &Version, _error: &str) {}

    /// Invoked when the compiler mentions `console.log` in a diagnostic, a hint that the
    /// console helper import is missing
    fn on_console_log_hint(&self, _message: &str) {}
}

/// A no-op [`Reporter`] that does nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoReporter(());

impl Reporter for NoReporter {}

/// A [`Reporter`] that emits some general information to `stdout`
#[derive(Copy, Clone, Debug, Default)]
pub struct BasicStdoutReporter(());

impl Reporter for BasicStdoutReporter {
    fn on_compile_start(&self, version: &Version, input: &CompilerInput, dirty: usize) {
        println!(
            "Compiling {} files ({} changed) with {}.{}.{}",
            input.sources.len(),
            dirty,
            version.major,
            version.minor,
            version.patch
        );
    }

    fn on_compile_success(&self, _version: &Version) {
        println!("Compilation finished successfully");
    }

    fn on_installation_start(&self, version: &Version) {
        println!("Downloading solc {version}");
    }

    fn on_installation_success(&self, version: &Version) {
        println!("Successfully installed solc {version}");
    }

    fn on_installation_error(&self, version: &Version, error: &str) {
        eprintln!("Failed to install solc {version}: {error}");
    }

    fn on_portable_fallback(&self, version: &Version, error: &str) {
        eprintln!("The native solc {version} binary is unusable ({error}), falling back to the portable build");
    }

    fn on_console_log_hint(&self, message: &str) {
        println!("note: {message}\nimport \"hardhat/console.sol\" to use console.log");
    }
}

/// Returned if setting the global reporter fails.
#[derive(Debug)]
pub struct SetGlobalReporterError {
    // private marker so this type can't be initiated
    _priv: (),
}

impl fmt::Display for SetGlobalReporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("a global reporter has already been set")
    }
}

impl Error for SetGlobalReporterError {}

/// `Report` trace data to a [`Reporter`].
pub struct Report {
    reporter: Arc<dyn Reporter>,
}

impl Report {
    /// Returns a new `Report` that does nothing
    pub fn none() -> Self {
        Report { reporter: Arc::new(NoReporter::default()) }
    }

    /// Returns a `Report` that forwards to the given [`Reporter`].
    pub fn new<S>(reporter: S) -> Self
    where
        S: Reporter,
    {
        Self { reporter: Arc::new(reporter) }
    }
}

static GLOBAL_REPORTER: OnceCell<Report> = OnceCell::new();

/// Install this `Reporter` as the global default.
///
/// # Errors
/// Returns an Error if a global reporter was already installed by another
/// call to `try_init`.
pub fn try_init<T>(reporter: T) -> Result<(), SetGlobalReporterError>
where
    T: Reporter,
{
    GLOBAL_REPORTER.set(Report::new(reporter)).map_err(|_| SetGlobalReporterError { _priv: () })
}

/// Install this `Reporter` as the global default if one is not already set.
///
/// # Panics
///
/// Panics if the initialization was unsuccessful, likely because a
/// global reporter was already installed.
pub fn init<T>(reporter: T)
where
    T: Reporter,
{
    try_init(reporter).expect("Failed to install global reporter")
}

fn with_global(f: impl FnOnce(&Report)) {
    if let Some(report) = GLOBAL_REPORTER.get() {
        f(report)
    }
}

pub(crate) fn compile_start(version: &Version, input: &CompilerInput, dirty: usize) {
    with_global(|r| r.reporter.on_compile_start(version, input, dirty));
}

pub(crate) fn compile_success(version: &Version) {
    with_global(|r| r.reporter.on_compile_success(version));
}

pub(crate) fn installation_start(version: &Version) {
    with_global(|r| r.reporter.on_installation_start(version));
}

pub(crate) fn installation_success(version: &Version) {
    with_global(|r| r.reporter.on_installation_success(version));
}

pub(crate) fn installation_error(version: &Version, error: &str) {
    with_global(|r| r.reporter.on_installation_error(version, error));
}

pub(crate) fn portable_fallback(version: &Version, error: &str) {
    with_global(|r| r.reporter.on_portable_fallback(version, error));
}

pub(crate) fn console_log_hint(message: &str) {
    with_global(|r| r.reporter.on_console_log_hint(message));
}
