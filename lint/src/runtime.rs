//! Analyzer runtime discovery.
//!
//! Probes each candidate command, reads its version, keeps the highest, and
//! checks that it can load the capability package the analyzers import.
//! The outcome is computed once per [`RuntimeLocator`] and cached;
//! [`RuntimeLocator::shared`] holds the one locator the process uses.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::error::LintError;
use crate::types::RuntimeConfig;

const PROBE_TIMEOUT_SECS: u64 = 5;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("valid version regex")
});

/// A `major.minor.patch` triple, ordered component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RuntimeVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the first version triple from probe output like `Python 3.11.4`.
    /// A missing patch component reads as 0.
    #[must_use]
    pub fn parse(output: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(output)?;
        let part = |i: usize| -> Option<u32> {
            caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
        };
        Some(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A resolved runtime executable that analyzer workers are launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    executable: PathBuf,
    version: RuntimeVersion,
}

impl Runtime {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, version: RuntimeVersion) -> Self {
        Self {
            executable: executable.into(),
            version,
        }
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn version(&self) -> RuntimeVersion {
        self.version
    }
}

/// Finds the runtime once and remembers the answer, success or failure.
pub struct RuntimeLocator {
    config: RuntimeConfig,
    located: OnceCell<Result<Runtime, String>>,
}

impl RuntimeLocator {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            located: OnceCell::new(),
        }
    }

    /// The process-wide locator. The first caller's config wins; later calls
    /// get the same locator and therefore the same cached outcome.
    pub fn shared(config: &RuntimeConfig) -> &'static Self {
        static SHARED: OnceLock<RuntimeLocator> = OnceLock::new();
        SHARED.get_or_init(|| Self::new(config.clone()))
    }

    /// Resolve the runtime. Only the first call probes; later calls return
    /// the cached outcome.
    pub async fn locate(&self) -> Result<Runtime, LintError> {
        self.located
            .get_or_init(|| probe(&self.config))
            .await
            .clone()
            .map_err(|reason| LintError::RuntimeUnavailable { reason })
    }
}

async fn probe(config: &RuntimeConfig) -> Result<Runtime, String> {
    let mut found = Vec::new();
    for name in &config.candidates {
        let path = match which::which(name) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(candidate = %name, "Runtime candidate not found: {e}");
                continue;
            }
        };
        match probe_version(&path, &config.version_args).await {
            Some(version) => {
                tracing::debug!(candidate = %name, %version, path = %path.display(), "Runtime candidate found");
                found.push(Runtime::new(path, version));
            }
            None => {
                tracing::debug!(candidate = %name, "Runtime candidate reported no version");
            }
        }
    }

    let best = select_highest(found)
        .ok_or_else(|| format!("none of {:?} resolved to a runtime", config.candidates))?;

    if let Some(capability) = &config.capability
        && !has_capability(&best, capability, &config.capability_args).await
    {
        return Err(format!(
            "{} {} cannot load required package '{capability}'",
            best.executable.display(),
            best.version,
        ));
    }

    tracing::info!(
        path = %best.executable.display(),
        version = %best.version,
        "Analyzer runtime located"
    );
    Ok(best)
}

/// Highest version wins; on a tie the earlier (preferred) candidate is kept.
fn select_highest(found: Vec<Runtime>) -> Option<Runtime> {
    found
        .into_iter()
        .reduce(|best, next| if next.version > best.version { next } else { best })
}

async fn probe_version(path: &Path, args: &[String]) -> Option<RuntimeVersion> {
    let output = tokio::time::timeout(
        Duration::from_secs(PROBE_TIMEOUT_SECS),
        Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    // Older runtimes print their version on stderr.
    RuntimeVersion::parse(&String::from_utf8_lossy(&output.stdout))
        .or_else(|| RuntimeVersion::parse(&String::from_utf8_lossy(&output.stderr)))
}

async fn has_capability(runtime: &Runtime, capability: &str, args: &[String]) -> bool {
    let args: Vec<String> = args
        .iter()
        .map(|arg| arg.replace("{capability}", capability))
        .collect();
    let status = tokio::time::timeout(
        Duration::from_secs(PROBE_TIMEOUT_SECS),
        Command::new(runtime.executable())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status(),
    )
    .await;
    matches!(status, Ok(Ok(status)) if status.success())
}
