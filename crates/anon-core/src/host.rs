//! Seams to the hosting database engine.
//!
//! The engine reports its version and share directory, executes statements
//! against its privilege catalog, and bulk-loads delimited files. All of
//! that lives outside this crate; these traits are what it consumes.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("engine query failed: {0}")]
    Query(String),

    #[error("statement rejected: {statement}: {reason}")]
    Statement { statement: String, reason: String },

    #[error("dataset load failed for {target}: {reason}")]
    Load { target: String, reason: String },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid server_version_num: {0:?}")]
    InvalidNum(String),

    #[error("unrecognized engine version string: {0:?}")]
    Unrecognized(String),
}

/// Engine version in `server_version_num` form (15.4 is `150004`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EngineVersion(u32);

lazy_static! {
    static ref HUMAN_VERSION: Regex =
        Regex::new(r"^PostgreSQL (?<major>\d+)(?:\.(?<minor>\d+))?(?:\.(?<patch>\d+))?")
            .expect("static regex");
}

impl EngineVersion {
    pub const fn from_num(num: u32) -> Self {
        Self(num)
    }

    pub fn num(&self) -> u32 {
        self.0
    }

    pub fn major(&self) -> u32 {
        self.0 / 10_000
    }

    /// Parse the `server_version_num` setting.
    pub fn parse_num(s: &str) -> Result<Self, VersionError> {
        let trimmed = s.trim();
        match trimmed.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Self(n)),
            _ => Err(VersionError::InvalidNum(s.to_string())),
        }
    }

    /// Parse a human-readable version such as `PostgreSQL 15.4`.
    ///
    /// Pre-release (`17devel`, `16beta2`, `17rc1`) and extra-version
    /// (`15.4foobar`) suffixes are accepted; they count as minor 0 or the
    /// leading digits respectively.
    pub fn parse_human(s: &str) -> Result<Self, VersionError> {
        let caps = HUMAN_VERSION
            .captures(s.trim())
            .ok_or_else(|| VersionError::Unrecognized(s.to_string()))?;
        let part = |name: &str| -> Result<u32, VersionError> {
            caps.name(name)
                .map(|m| m.as_str().parse::<u32>())
                .transpose()
                .map(|v| v.unwrap_or(0))
                .map_err(|_| VersionError::Unrecognized(s.to_string()))
        };
        let (major, minor, patch) = (part("major")?, part("minor")?, part("patch")?);
        if major == 0 || major > 999 || minor > 99 || patch > 99 {
            return Err(VersionError::Unrecognized(s.to_string()));
        }
        let num = if major >= 10 {
            major * 10_000 + minor
        } else {
            major * 10_000 + minor * 100 + patch
        };
        Ok(Self(num))
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The hosting engine as seen from the extension.
pub trait HostEngine: Send + Sync {
    /// Running engine version.
    fn version(&self) -> Result<EngineVersion, HostError>;

    /// Installed-extension share directory reported by the engine.
    fn share_dir(&self) -> Result<PathBuf, HostError>;

    /// Execute a statement against the engine's catalogs.
    fn execute(&self, statement: &str) -> Result<(), HostError>;
}

/// Bulk loader for one delimited file into one relation. Loads overwrite
/// the target, so running the same load twice leaves one copy.
pub trait DatasetSink: Send + Sync {
    fn load(&self, target: &str, path: &Path) -> Result<(), HostError>;
}
