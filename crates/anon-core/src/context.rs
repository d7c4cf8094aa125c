//! Execution context selection.
//!
//! INVOKER routines run as the caller. DEFINER routines run as the extension
//! owner, and only through an [`ElevatedCapability`], which always carries the
//! routine's pinned search path. Name lookups made on behalf of an elevated
//! routine use that path, never the caller's.

use crate::routine::{ExecutionContext, PinnedSearchPath, RoutineDescriptor, RoutineSignature};
use std::collections::BTreeMap;
use thiserror::Error;

/// Schema the engine always searches first, whatever the configured path.
pub const SYSTEM_SCHEMA: &str = "pg_catalog";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("routine {routine} is SECURITY INVOKER and cannot be elevated")]
    NotDefiner { routine: String },
}

/// Identity and session search path of whoever is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerSession {
    pub role: String,
    pub search_path: Vec<String>,
}

impl CallerSession {
    pub fn new(role: impl Into<String>, search_path: &[&str]) -> Self {
        Self {
            role: role.into(),
            search_path: search_path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Role and name-resolution scope a routine body actually runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSession {
    pub role: String,
    pub context: ExecutionContext,
    pub search_path: PinnedSearchPath,
}

/// Token proving a DEFINER routine was selected for elevated execution.
///
/// Only [`ExecutionContextSelector::elevate`] creates one; the search path is
/// a required field, so an elevated call without a pinned path cannot exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedCapability {
    routine: RoutineSignature,
    owner: String,
    search_path: PinnedSearchPath,
}

impl ElevatedCapability {
    pub fn routine(&self) -> &RoutineSignature {
        &self.routine
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn search_path(&self) -> &PinnedSearchPath {
        &self.search_path
    }

    /// Resolve `name` the way the elevated routine body would.
    pub fn resolve<'a>(&self, namespace: &'a Namespace, name: &str) -> Option<&'a NamespaceEntry> {
        namespace.resolve(name, self.search_path.schemas())
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionContextSelector {
    owner_role: String,
}

impl ExecutionContextSelector {
    pub fn new(owner_role: impl Into<String>) -> Self {
        Self {
            owner_role: owner_role.into(),
        }
    }

    pub fn owner_role(&self) -> &str {
        &self.owner_role
    }

    /// Effective identity for `routine` when called from `caller`.
    pub fn select(&self, routine: &RoutineDescriptor, caller: &CallerSession) -> EffectiveSession {
        let role = match routine.execution_context {
            ExecutionContext::Invoker => caller.role.clone(),
            ExecutionContext::Definer => self.owner_role.clone(),
        };
        tracing::debug!(
            routine = %routine.signature,
            context = routine.execution_context.as_sql(),
            role = %role,
            "selected execution context"
        );
        EffectiveSession {
            role,
            context: routine.execution_context,
            search_path: routine.search_path.clone(),
        }
    }

    /// Issue the capability an elevated routine needs to run.
    pub fn elevate(&self, routine: &RoutineDescriptor) -> Result<ElevatedCapability, ContextError> {
        if routine.execution_context != ExecutionContext::Definer {
            return Err(ContextError::NotDefiner {
                routine: routine.signature.to_string(),
            });
        }
        Ok(ElevatedCapability {
            routine: routine.signature.clone(),
            owner: self.owner_role.clone(),
            search_path: routine.search_path.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub schema: String,
    pub name: String,
    pub owner: String,
}

/// Minimal model of the engine's routine namespace, used to reason about
/// what an unqualified or qualified name resolves to under a given path.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: BTreeMap<(String, String), NamespaceEntry>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) `schema.name` owned by `owner`.
    pub fn create(&mut self, schema: &str, name: &str, owner: &str) {
        self.entries.insert(
            (schema.to_string(), name.to_string()),
            NamespaceEntry {
                schema: schema.to_string(),
                name: name.to_string(),
                owner: owner.to_string(),
            },
        );
    }

    /// Qualified names bypass the path. Unqualified names search the system
    /// schema first, then `search_path` in order.
    pub fn resolve(&self, name: &str, search_path: &[String]) -> Option<&NamespaceEntry> {
        if let Some((schema, bare)) = name.split_once('.') {
            return self.entries.get(&(schema.to_string(), bare.to_string()));
        }
        std::iter::once(SYSTEM_SCHEMA)
            .chain(search_path.iter().map(String::as_str))
            .find_map(|schema| self.entries.get(&(schema.to_string(), name.to_string())))
    }
}
