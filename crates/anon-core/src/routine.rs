//! Routine descriptors: the metadata every callable extension routine carries.
//!
//! A descriptor is created at install time, replaced wholesale on upgrade and
//! removed on drop. It is never mutated in place.

use serde::Serialize;
use std::fmt;

/// Trust label published to the engine's security-label layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLabel {
    Trusted,
    #[default]
    Untrusted,
}

impl TrustLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trusted => "TRUSTED",
            Self::Untrusted => "UNTRUSTED",
        }
    }
}

impl fmt::Display for TrustLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a routine body runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionContext {
    /// Caller's identity. Used for orchestration-only routines.
    Invoker,
    /// Extension owner's identity. Used for routines that need privileges
    /// the caller lacks.
    Definer,
}

impl ExecutionContext {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Invoker => "SECURITY INVOKER",
            Self::Definer => "SECURITY DEFINER",
        }
    }
}

/// Name-resolution scope fixed on a routine.
///
/// There is no "inherit from caller" variant: every routine pins its path,
/// and the default is the empty path (fully-qualified names only).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PinnedSearchPath(Vec<String>);

impl PinnedSearchPath {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn schemas(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `SET search_path = ...` clause for the routine definition.
    pub fn to_sql(&self) -> String {
        if self.0.is_empty() {
            "SET search_path = ''".to_string()
        } else {
            format!("SET search_path = {}", self.0.join(", "))
        }
    }
}

/// Fully-qualified routine identity: `schema.name(arg types)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RoutineSignature {
    pub schema: String,
    pub name: String,
    pub arg_types: Vec<String>,
}

impl RoutineSignature {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, arg_types: &[&str]) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            arg_types: arg_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for RoutineSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.schema, self.name, self.arg_types.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutineDescriptor {
    pub signature: RoutineSignature,
    pub trust_label: TrustLabel,
    pub execution_context: ExecutionContext,
    pub search_path: PinnedSearchPath,
}

impl RoutineDescriptor {
    /// Orchestration routine: runs as the caller, untrusted, empty path.
    pub fn invoker(signature: RoutineSignature) -> Self {
        Self {
            signature,
            trust_label: TrustLabel::Untrusted,
            execution_context: ExecutionContext::Invoker,
            search_path: PinnedSearchPath::empty(),
        }
    }

    /// Elevated routine: runs as the extension owner, untrusted, empty path.
    pub fn definer(signature: RoutineSignature) -> Self {
        Self {
            signature,
            trust_label: TrustLabel::Untrusted,
            execution_context: ExecutionContext::Definer,
            search_path: PinnedSearchPath::empty(),
        }
    }

    /// Explicit override of the untrusted default.
    pub fn with_trust(mut self, label: TrustLabel) -> Self {
        self.trust_label = label;
        self
    }

    /// Security clauses appended to the routine definition,
    /// e.g. `SECURITY DEFINER SET search_path = ''`.
    pub fn definition_clauses(&self) -> String {
        format!(
            "{} {}",
            self.execution_context.as_sql(),
            self.search_path.to_sql()
        )
    }
}

pub const INIT_ROUTINE: &str = "init";
pub const LOAD_DATASETS_ROUTINE: &str = "init_datasets";

/// Descriptors for every routine this crate exposes under `schema`.
pub fn core_routines(schema: &str) -> Vec<RoutineDescriptor> {
    vec![
        RoutineDescriptor::invoker(RoutineSignature::new(schema, INIT_ROUTINE, &[])),
        // Kept for callers of the old `init(datapath)` form.
        RoutineDescriptor::invoker(RoutineSignature::new(schema, INIT_ROUTINE, &["text"])),
        RoutineDescriptor::definer(RoutineSignature::new(
            schema,
            LOAD_DATASETS_ROUTINE,
            &[],
        )),
    ]
}

/// Descriptor of the elevated dataset loader among [`core_routines`].
pub fn loader_routine(schema: &str) -> RoutineDescriptor {
    RoutineDescriptor::definer(RoutineSignature::new(schema, LOAD_DATASETS_ROUTINE, &[]))
}
