//! Operator configuration.
//!
//! Loaded from YAML with every field defaulted; selected fields can be
//! overridden through `ANON_*` environment variables. Nothing here comes
//! from the SQL caller.

use crate::catalog::validate_subdir;
use crate::loader::AggregationPolicy;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[a-z_][a-z0-9_$]{0,62}$").expect("static regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnonConfig {
    /// Extension schema.
    pub schema: String,
    /// Role DEFINER routines run as.
    pub owner_role: String,
    /// Role receiving the schema, table and masking-toggle grants.
    pub operator_role: String,
    /// Reference data location below the engine share directory.
    pub data_subdir: PathBuf,
    pub aggregation: AggregationPolicy,
}

impl Default for AnonConfig {
    fn default() -> Self {
        Self {
            schema: "anon".to_string(),
            owner_role: "anon_owner".to_string(),
            operator_role: "anon_masker".to_string(),
            data_subdir: PathBuf::from("extension/anon"),
            aggregation: AggregationPolicy::default(),
        }
    }
}

impl AnonConfig {
    /// Load config from YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `ANON_SCHEMA`, `ANON_OPERATOR_ROLE` and `ANON_AGGREGATION`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = env::var("ANON_SCHEMA") {
            self.schema = v;
        }
        if let Ok(v) = env::var("ANON_OPERATOR_ROLE") {
            self.operator_role = v;
        }
        if let Ok(v) = env::var("ANON_AGGREGATION") {
            self.aggregation = AggregationPolicy::parse(&v)
                .with_context(|| format!("ANON_AGGREGATION must be 'any' or 'all', got {v:?}"))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Role and schema names are interpolated into statements, so they
    /// must be plain lowercase identifiers.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("schema", &self.schema),
            ("owner_role", &self.owner_role),
            ("operator_role", &self.operator_role),
        ] {
            if !IDENTIFIER.is_match(value) {
                anyhow::bail!("{field} is not a plain identifier: {value:?}");
            }
        }
        validate_subdir(&self.data_subdir)?;
        Ok(())
    }
}
