//! Host facts: what the target is, probed once per run

use crate::error::Result;
use crate::executor::Executor;
use crate::shell;
use crate::types::Architecture;
use crate::version::Version;

/// Probe for the release number (`16.04`, `10`)
pub const PROBE_RELEASE: &str = "lsb_release -sr";
/// Probe for the release codename (`xenial`, `buster`)
pub const PROBE_CODENAME: &str = "lsb_release -sc";
/// Probe for the distribution id, lower-cased (`ubuntu`, `debian`)
pub const PROBE_DISTRIBUTION: &str = "lsb_release -is | tr '[:upper:]' '[:lower:]'";
/// Directory whose presence marks a 64-bit userland
pub const LIB64_DIR: &str = "/lib64";

/// Recorded release when `lsb_release` gave no answer
pub const UNKNOWN_RELEASE: &str = "0";
/// Recorded codename or distribution id when `lsb_release` gave no answer
pub const UNKNOWN: &str = "unknown";

/// Descriptive attributes of the target host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub release: String,
    pub codename: String,
    pub architecture: Architecture,
    pub distribution_id: String,
}

impl HostFacts {
    /// Query the host with the fixed probe sequence
    ///
    /// Probes are run failure-tolerant. Empty answers fall back to
    /// conservative defaults so that gated actions report "unsupported"
    /// instead of the whole run failing.
    pub fn probe(exec: &dyn Executor) -> Result<Self> {
        let release = answer(exec, PROBE_RELEASE, UNKNOWN_RELEASE)?;
        let codename = answer(exec, PROBE_CODENAME, UNKNOWN)?;
        let x64 = exec.run(&shell::test_dir(LIB64_DIR), false, true)?;
        let distribution_id = answer(exec, PROBE_DISTRIBUTION, UNKNOWN)?;

        let architecture = if x64.succeeded {
            Architecture::X64
        } else {
            log::warn!("{LIB64_DIR} not found on host, assuming 32-bit");
            Architecture::X86
        };

        let facts = Self {
            release,
            codename,
            architecture,
            distribution_id,
        };
        log::debug!("host facts: {facts:?}");
        Ok(facts)
    }

    /// Whether every distribution probe answered
    ///
    /// Actions that write the distribution, release or codename into apt
    /// sources or download URLs must not run when this is false.
    pub fn is_known(&self) -> bool {
        self.release != UNKNOWN_RELEASE && self.codename != UNKNOWN && self.distribution_id != UNKNOWN
    }

    /// The release as a comparable version, if it parses
    pub fn release_version(&self) -> Option<Version> {
        Version::parse(&self.release).ok()
    }

    /// Whether the release is at least `min` (unparseable releases are not)
    pub fn release_at_least(&self, min: &str) -> bool {
        self.release_version().is_some_and(|v| v.at_least(min))
    }

    pub fn is_64bit(&self) -> bool {
        self.architecture == Architecture::X64
    }

    pub fn is_debian(&self) -> bool {
        self.distribution_id == "debian"
    }

    pub fn is_ubuntu(&self) -> bool {
        self.distribution_id == "ubuntu"
    }
}

fn answer(exec: &dyn Executor, command: &str, fallback: &str) -> Result<String> {
    let result = exec.run(command, false, true)?;
    let value = result.first_line();
    if result.failed() || value.is_empty() {
        log::warn!("probe `{command}` gave no answer, using {fallback:?}");
        return Ok(fallback.to_string());
    }
    Ok(value.to_string())
}
