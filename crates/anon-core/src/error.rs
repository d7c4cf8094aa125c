use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::context::ContextError;
use crate::grants::GrantError;
use crate::host::HostError;
use crate::state::StateError;
use crate::trust::TrustError;

/// Any failure surfaced by the install/bootstrap lifecycle.
#[derive(Debug, Error)]
pub enum AnonError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Grant(#[from] GrantError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("configuration error: {0}")]
    Config(String),
}
