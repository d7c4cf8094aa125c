//! Engine stand-ins for operator commands.
//!
//! The CLI never talks SQL to a live server. `PgConfigHost` asks the
//! installed `pg_config` for version and share directory; `OfflineHost`
//! takes them from flags and records statements instead of executing them.

use anon_core::{DatasetSink, EngineVersion, HostEngine, HostError};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

pub struct PgConfigHost {
    pg_config: PathBuf,
}

impl PgConfigHost {
    pub fn new(pg_config: impl Into<PathBuf>) -> Self {
        Self {
            pg_config: pg_config.into(),
        }
    }

    /// Output of `pg_config <flag>`, e.g. `--sharedir` or `--version`.
    fn query(&self, flag: &str) -> Result<String, HostError> {
        let output = Command::new(&self.pg_config).arg(flag).output()?;
        if !output.status.success() {
            return Err(HostError::Query(format!(
                "{} {flag} exited with {}",
                self.pg_config.display(),
                output.status
            )));
        }
        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| HostError::Query(format!("pg_config output is not UTF-8: {e}")))?;
        Ok(stdout.trim().to_string())
    }
}

impl HostEngine for PgConfigHost {
    fn version(&self) -> Result<EngineVersion, HostError> {
        Ok(EngineVersion::parse_human(&self.query("--version")?)?)
    }

    fn share_dir(&self) -> Result<PathBuf, HostError> {
        Ok(PathBuf::from(self.query("--sharedir")?))
    }

    fn execute(&self, statement: &str) -> Result<(), HostError> {
        Err(HostError::Statement {
            statement: statement.to_string(),
            reason: "pg_config cannot execute statements".to_string(),
        })
    }
}

/// Engine described by command-line flags; statements are recorded
/// instead of executed.
#[derive(Default)]
pub struct OfflineHost {
    version: Option<EngineVersion>,
    share_dir: Option<PathBuf>,
    statements: Mutex<Vec<String>>,
}

impl OfflineHost {
    pub fn with_version(version: EngineVersion) -> Self {
        Self {
            version: Some(version),
            ..Default::default()
        }
    }

    pub fn with_share_dir(share_dir: impl Into<PathBuf>) -> Self {
        Self {
            share_dir: Some(share_dir.into()),
            ..Default::default()
        }
    }

    /// Statements "executed" so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl HostEngine for OfflineHost {
    fn version(&self) -> Result<EngineVersion, HostError> {
        self.version
            .ok_or_else(|| HostError::Query("engine version not provided".to_string()))
    }

    fn share_dir(&self) -> Result<PathBuf, HostError> {
        self.share_dir
            .clone()
            .ok_or_else(|| HostError::Query("share directory not provided".to_string()))
    }

    fn execute(&self, statement: &str) -> Result<(), HostError> {
        self.statements
            .lock()
            .map_err(|_| HostError::Query("statement log poisoned".to_string()))?
            .push(statement.to_string());
        Ok(())
    }
}

/// Dry-run sink: checks that each dataset file opens instead of loading it.
pub struct ProbeSink;

impl DatasetSink for ProbeSink {
    fn load(&self, target: &str, path: &Path) -> Result<(), HostError> {
        let meta = File::open(path)
            .and_then(|f| f.metadata())
            .map_err(|e| HostError::Load {
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(HostError::Load {
                target: target.to_string(),
                reason: "not a non-empty regular file".to_string(),
            });
        }
        Ok(())
    }
}
