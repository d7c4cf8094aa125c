//! Capability grants applied at extension install/upgrade.
//!
//! Grants are a table of `(min_version, effect)` rules. A rule whose gate
//! the running engine does not meet is skipped before its statement is ever
//! built; the engine is never asked to run a grant for a feature it lacks.

use crate::host::{EngineVersion, HostEngine, HostError};
use serde::Serialize;
use thiserror::Error;

/// Engines from 15 on support `GRANT SET ON PARAMETER`.
pub const SET_ON_PARAMETER_MIN_VERSION: EngineVersion = EngineVersion::from_num(150000);

/// Setting (under the extension schema) that toggles transparent masking.
pub const TRANSPARENT_MASKING_SETTING: &str = "transparent_dynamic_masking";

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("cannot read engine version: {0}")]
    Version(#[source] HostError),

    #[error("grant failed: {statement}")]
    Statement {
        statement: String,
        #[source]
        source: HostError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrantEffect {
    /// `GRANT ALL ON ALL TABLES IN SCHEMA <schema>`
    AllTablesInSchema,
    /// `GRANT ALL ON SCHEMA <schema>`
    Schema,
    /// `GRANT SET ON PARAMETER <schema>.<setting>`
    SetParameter { setting: &'static str },
}

impl GrantEffect {
    pub fn statement(&self, schema: &str, role: &str) -> String {
        match self {
            Self::AllTablesInSchema => {
                format!("GRANT ALL ON ALL TABLES IN SCHEMA {schema} TO {role}")
            }
            Self::Schema => format!("GRANT ALL ON SCHEMA {schema} TO {role}"),
            Self::SetParameter { setting } => {
                format!("GRANT SET ON PARAMETER {schema}.{setting} TO {role}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrantRule {
    /// `None` means the rule applies on every supported engine.
    pub min_version: Option<EngineVersion>,
    pub effect: GrantEffect,
}

impl GrantRule {
    pub fn applies_to(&self, version: EngineVersion) -> bool {
        !matches!(self.min_version, Some(min) if version < min)
    }
}

pub const VERSION_GATED_GRANTS: &[GrantRule] = &[
    GrantRule {
        min_version: None,
        effect: GrantEffect::AllTablesInSchema,
    },
    GrantRule {
        min_version: None,
        effect: GrantEffect::Schema,
    },
    GrantRule {
        min_version: Some(SET_ON_PARAMETER_MIN_VERSION),
        effect: GrantEffect::SetParameter {
            setting: TRANSPARENT_MASKING_SETTING,
        },
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedGrant {
    pub effect: GrantEffect,
    pub min_version: EngineVersion,
}

/// Statements to issue and rules skipped for one engine version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantReport {
    pub engine_version: EngineVersion,
    pub issued: Vec<String>,
    pub skipped: Vec<SkippedGrant>,
}

pub struct GrantManager<'a> {
    host: &'a dyn HostEngine,
    schema: String,
    role: String,
    rules: &'a [GrantRule],
}

impl<'a> GrantManager<'a> {
    pub fn new(host: &'a dyn HostEngine, schema: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            host,
            schema: schema.into(),
            role: role.into(),
            rules: VERSION_GATED_GRANTS,
        }
    }

    pub fn with_rules(mut self, rules: &'a [GrantRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Evaluate the rules without touching the engine.
    pub fn plan(&self, version: EngineVersion) -> GrantReport {
        plan(self.rules, version, &self.schema, &self.role)
    }

    /// Read the engine version and issue every statement whose gate passes.
    pub fn apply_version_gated_grants(&self) -> Result<GrantReport, GrantError> {
        let version = self.host.version().map_err(GrantError::Version)?;
        let report = self.plan(version);

        for skipped in &report.skipped {
            tracing::warn!(
                engine_version = %version,
                min_version = %skipped.min_version,
                statement = %skipped.effect.statement(&self.schema, &self.role),
                "capability not supported by engine; grant skipped"
            );
        }

        for statement in &report.issued {
            self.host
                .execute(statement)
                .map_err(|source| GrantError::Statement {
                    statement: statement.clone(),
                    source,
                })?;
            tracing::info!(role = %self.role, statement = %statement, "grant issued");
        }

        Ok(report)
    }
}

pub fn plan(rules: &[GrantRule], version: EngineVersion, schema: &str, role: &str) -> GrantReport {
    let mut issued = Vec::new();
    let mut skipped = Vec::new();
    for rule in rules {
        match rule.min_version {
            Some(min) if version < min => skipped.push(SkippedGrant {
                effect: rule.effect,
                min_version: min,
            }),
            _ => issued.push(rule.effect.statement(schema, role)),
        }
    }
    GrantReport {
        engine_version: version,
        issued,
        skipped,
    }
}
