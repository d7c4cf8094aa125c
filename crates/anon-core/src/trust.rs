//! Trust classification of extension routines.
//!
//! The registry is metadata set at install/upgrade time. The engine's own
//! security-label enforcement consumes it; [`RoutineRegistry::authorize`]
//! mirrors that check so callers can reason about it without an engine.

use crate::routine::{RoutineDescriptor, RoutineSignature, TrustLabel};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Security label provider the statements are issued for.
pub const LABEL_PROVIDER: &str = "anon";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("routine not registered: {routine}")]
    UnknownRoutine { routine: String },

    #[error("routine registered twice: {routine}")]
    DuplicateRoutine { routine: String },

    #[error("routines already installed; use upgrade to replace them")]
    AlreadyInstalled,

    #[error("routines not installed")]
    NotInstalled,

    #[error("routine {routine} is UNTRUSTED and has no explicit grant for a trusted-only path")]
    NotTrusted { routine: String },

    #[error("routine registry lock poisoned")]
    Poisoned,
}

/// How a routine is being reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPath {
    /// Plain call by a role that has EXECUTE.
    Direct,
    /// Contexts that only accept trusted routines (row security policies,
    /// restricted roles).
    TrustedOnly,
}

/// Explicit, per-routine permission to use an UNTRUSTED routine on a
/// trusted-only path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedGrant {
    pub routine: RoutineSignature,
    pub granted_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct RoutineRegistry {
    routines: BTreeMap<RoutineSignature, RoutineDescriptor>,
    installed: bool,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Register the descriptor set at extension install.
    pub fn install(&mut self, descriptors: Vec<RoutineDescriptor>) -> Result<(), TrustError> {
        if self.installed {
            return Err(TrustError::AlreadyInstalled);
        }
        self.routines = build_index(descriptors)?;
        self.installed = true;
        Ok(())
    }

    /// Replace the whole descriptor set. On error the previous set stays.
    pub fn upgrade(&mut self, descriptors: Vec<RoutineDescriptor>) -> Result<(), TrustError> {
        if !self.installed {
            return Err(TrustError::NotInstalled);
        }
        self.routines = build_index(descriptors)?;
        Ok(())
    }

    /// Extension drop.
    pub fn drop_all(&mut self) {
        self.routines.clear();
        self.installed = false;
    }

    pub fn descriptor(&self, routine: &RoutineSignature) -> Option<&RoutineDescriptor> {
        self.routines.get(routine)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &RoutineDescriptor> {
        self.routines.values()
    }

    /// Unknown routines classify as UNTRUSTED.
    pub fn classify(&self, routine: &RoutineSignature) -> TrustLabel {
        self.routines
            .get(routine)
            .map(|d| d.trust_label)
            .unwrap_or(TrustLabel::Untrusted)
    }

    pub fn authorize(
        &self,
        routine: &RoutineSignature,
        path: InvocationPath,
        grant: Option<&ElevatedGrant>,
    ) -> Result<&RoutineDescriptor, TrustError> {
        let descriptor = self
            .routines
            .get(routine)
            .ok_or_else(|| TrustError::UnknownRoutine {
                routine: routine.to_string(),
            })?;

        match (path, descriptor.trust_label) {
            (InvocationPath::Direct, _) | (InvocationPath::TrustedOnly, TrustLabel::Trusted) => {
                Ok(descriptor)
            }
            (InvocationPath::TrustedOnly, TrustLabel::Untrusted) => match grant {
                Some(g) if &g.routine == routine => {
                    tracing::info!(
                        routine = %routine,
                        granted_by = %g.granted_by,
                        "untrusted routine allowed by explicit grant"
                    );
                    Ok(descriptor)
                }
                _ => Err(TrustError::NotTrusted {
                    routine: routine.to_string(),
                }),
            },
        }
    }

    /// `SECURITY LABEL` statements publishing every routine's label.
    pub fn security_label_statements(&self) -> Vec<String> {
        self.routines
            .values()
            .map(|d| {
                format!(
                    "SECURITY LABEL FOR {} ON FUNCTION {} IS '{}'",
                    LABEL_PROVIDER, d.signature, d.trust_label
                )
            })
            .collect()
    }
}

/// Registry handle shared by the lifecycle and every [`crate::Bootstrap`]
/// it hands out, so drop and upgrade are seen by callers already holding one.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<RoutineRegistry>>);

impl SharedRegistry {
    pub fn new(registry: RoutineRegistry) -> Self {
        Self(Arc::new(Mutex::new(registry)))
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, RoutineRegistry>, TrustError> {
        self.0.lock().map_err(|_| TrustError::Poisoned)
    }

    /// Point-in-time copy.
    pub fn snapshot(&self) -> Result<RoutineRegistry, TrustError> {
        Ok(self.lock()?.clone())
    }
}

fn build_index(
    descriptors: Vec<RoutineDescriptor>,
) -> Result<BTreeMap<RoutineSignature, RoutineDescriptor>, TrustError> {
    let mut index = BTreeMap::new();
    for d in descriptors {
        if index.contains_key(&d.signature) {
            return Err(TrustError::DuplicateRoutine {
                routine: d.signature.to_string(),
            });
        }
        index.insert(d.signature.clone(), d);
    }
    Ok(index)
}
