//! Trust boundary and bootstrap control for the anonymization extension.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Extension (install / upgrade / drop)                             │
//! │   ├─ RoutineRegistry ──▶ SECURITY LABEL ... IS 'UNTRUSTED'       │
//! │   ├─ GrantManager ─────▶ GRANT ... (gated on engine version)     │
//! │   └─ Bootstrap                                                   │
//! │        ├─ StateStore (SQLite, single `initialized` flag)         │
//! │        ├─ ExecutionContextSelector ──▶ ElevatedCapability        │
//! │        └─ ReferenceDatasetLoader ──▶ DatasetSink (engine)        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine itself (version, share directory, statement execution, bulk
//! loads) sits behind the [`host::HostEngine`] and [`host::DatasetSink`]
//! traits.

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod grants;
pub mod host;
pub mod lifecycle;
pub mod loader;
pub mod routine;
pub mod state;
pub mod trust;

pub use bootstrap::{Bootstrap, BootstrapError, BootstrapOutcome, BootstrapPhase};
pub use catalog::{DataDirectory, DatasetSpec, DATASET_CATALOG};
pub use config::AnonConfig;
pub use context::{CallerSession, ElevatedCapability, ExecutionContextSelector, Namespace};
pub use error::AnonError;
pub use grants::{GrantManager, GrantReport, VERSION_GATED_GRANTS};
pub use host::{DatasetSink, EngineVersion, HostEngine, HostError};
pub use lifecycle::{Extension, InstallReport};
pub use loader::{AggregationPolicy, LoadReport, ReferenceDatasetLoader};
pub use routine::{ExecutionContext, RoutineDescriptor, RoutineSignature, TrustLabel};
pub use state::{StateError, StateStore, STATE_SCHEMA};
pub use trust::{InvocationPath, RoutineRegistry, SharedRegistry, TrustError};
