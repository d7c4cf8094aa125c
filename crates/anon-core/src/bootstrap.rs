//! Bootstrap state machine for reference data.
//!
//! `UNINITIALIZED -> LOADING -> INITIALIZED`. LOADING is never persisted; it
//! is the span of one [`Bootstrap::initialize`] call. A failed load returns
//! to UNINITIALIZED with the flag untouched, so the next call retries.
//!
//! The loader is elevated from its descriptor in the shared routine
//! registry, looked up on every load. A dropped extension (or an upgrade that
//! no longer declares the loader DEFINER) refuses to load.

use crate::context::{ContextError, ExecutionContextSelector};
use crate::loader::{AggregationPolicy, LoadReport, ReferenceDatasetLoader};
use crate::routine::RoutineDescriptor;
use crate::state::{InitTransition, StateError, StateStore};
use crate::trust::{InvocationPath, SharedRegistry, TrustError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Trust(#[from] TrustError),
}

/// Externally observable phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Uninitialized,
    Initialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Flag was already set; nothing loaded.
    AlreadyInitialized,
    /// Load succeeded under the aggregation policy; flag set.
    Initialized(LoadReport),
    /// Load failed under the aggregation policy; flag unset, safe to retry.
    Failed(LoadReport),
    /// Another session was still loading when the wait for its lock ran
    /// out; flag unset, safe to retry.
    Contended,
}

impl BootstrapOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::AlreadyInitialized | Self::Initialized(_))
    }
}

pub struct Bootstrap {
    registry: SharedRegistry,
    state: StateStore,
    loader: ReferenceDatasetLoader,
    selector: ExecutionContextSelector,
    policy: AggregationPolicy,
}

impl Bootstrap {
    pub fn new(
        registry: SharedRegistry,
        state: StateStore,
        loader: ReferenceDatasetLoader,
        selector: ExecutionContextSelector,
        policy: AggregationPolicy,
    ) -> Self {
        Self {
            registry,
            state,
            loader,
            selector,
            policy,
        }
    }

    pub fn phase(&self) -> Result<BootstrapPhase, BootstrapError> {
        Ok(if self.state.is_initialized()? {
            BootstrapPhase::Initialized
        } else {
            BootstrapPhase::Uninitialized
        })
    }

    /// `true` if initialized (now or before), `false` if the load failed.
    pub fn ensure_initialized(&self) -> Result<bool, BootstrapError> {
        Ok(self.initialize()?.succeeded())
    }

    /// Like [`Self::ensure_initialized`], keeping the per-dataset report.
    pub fn initialize(&self) -> Result<BootstrapOutcome, BootstrapError> {
        if self.state.is_initialized()? {
            return Ok(already_initialized());
        }

        let cap = self.selector.elevate(&self.loader_descriptor()?)?;
        let mut report = LoadReport::default();
        let transition = self.state.initialize_with(|| {
            report = self.loader.load_all(&cap);
            report.succeeded(self.policy)
        })?;

        Ok(match transition {
            InitTransition::AlreadyInitialized => already_initialized(),
            InitTransition::Initialized => {
                tracing::info!(
                    loaded = report.loaded_count(),
                    total = report.outcomes.len(),
                    "reference data initialized"
                );
                BootstrapOutcome::Initialized(report)
            }
            InitTransition::LoadFailed => {
                tracing::warn!(
                    loaded = report.loaded_count(),
                    total = report.outcomes.len(),
                    policy = ?self.policy,
                    "reference data initialization failed; will retry on next call"
                );
                BootstrapOutcome::Failed(report)
            }
            InitTransition::Contended => {
                tracing::warn!(
                    "reference data is being loaded by another session; will retry on next call"
                );
                BootstrapOutcome::Contended
            }
        })
    }

    /// Registered descriptor of the loader routine, as currently installed.
    fn loader_descriptor(&self) -> Result<RoutineDescriptor, TrustError> {
        self.registry
            .lock()?
            .authorize(self.loader.routine(), InvocationPath::Direct, None)
            .cloned()
    }

    /// Old `init(datapath)` entry point. The path is ignored: dataset
    /// locations come only from the engine's share directory.
    #[deprecated(note = "the data path is discovered from the engine; use `ensure_initialized`")]
    pub fn init_from_path(&self, _datapath: &str) -> Result<bool, BootstrapError> {
        self.ensure_initialized()
    }
}

fn already_initialized() -> BootstrapOutcome {
    tracing::info!("anonymization extension already initialized");
    BootstrapOutcome::AlreadyInitialized
}
