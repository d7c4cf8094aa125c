//! Extension lifecycle: install, upgrade, drop.
//!
//! Owns the routine registry and the state store, publishes trust labels and
//! capability grants to the engine, and hands out a [`Bootstrap`] wired to
//! the same state.

use crate::bootstrap::Bootstrap;
use crate::config::AnonConfig;
use crate::context::ExecutionContextSelector;
use crate::error::AnonError;
use crate::grants::{GrantManager, GrantReport};
use crate::host::{DatasetSink, HostEngine};
use crate::loader::ReferenceDatasetLoader;
use crate::routine::core_routines;
use crate::state::StateStore;
use crate::trust::{RoutineRegistry, SharedRegistry, TrustError};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub security_labels: Vec<String>,
    pub grants: GrantReport,
}

pub struct Extension {
    config: AnonConfig,
    host: Arc<dyn HostEngine>,
    sink: Arc<dyn DatasetSink>,
    state: StateStore,
    registry: SharedRegistry,
}

impl Extension {
    pub fn new(
        config: AnonConfig,
        host: Arc<dyn HostEngine>,
        sink: Arc<dyn DatasetSink>,
        state: StateStore,
    ) -> Self {
        Self {
            config,
            host,
            sink,
            state,
            registry: SharedRegistry::default(),
        }
    }

    pub fn config(&self) -> &AnonConfig {
        &self.config
    }

    /// Copy of the routine registry as currently installed.
    pub fn registry(&self) -> Result<RoutineRegistry, TrustError> {
        self.registry.snapshot()
    }

    /// Register routines, start uninitialized, publish labels and grants.
    ///
    /// The registry only becomes installed once publishing succeeded, so a
    /// failed install can be retried.
    pub fn install(&mut self) -> Result<InstallReport, AnonError> {
        self.config
            .validate()
            .map_err(|e| AnonError::Config(e.to_string()))?;
        if self.registry.lock()?.is_installed() {
            return Err(TrustError::AlreadyInstalled.into());
        }
        let mut next = RoutineRegistry::new();
        next.install(core_routines(&self.config.schema))?;

        let report = self.publish(&next)?;
        self.state.reset()?;
        *self.registry.lock()? = next;
        tracing::info!(schema = %self.config.schema, "extension installed");
        Ok(report)
    }

    /// Replace routine descriptors and re-apply labels and grants. The
    /// initialization flag is kept; on error the previous descriptors stay.
    pub fn upgrade(&mut self) -> Result<InstallReport, AnonError> {
        let mut next = self.registry.snapshot()?;
        next.upgrade(core_routines(&self.config.schema))?;

        let report = self.publish(&next)?;
        *self.registry.lock()? = next;
        tracing::info!(schema = %self.config.schema, "extension upgraded");
        Ok(report)
    }

    pub fn drop_extension(&mut self) -> Result<(), AnonError> {
        self.registry.lock()?.drop_all();
        tracing::info!(schema = %self.config.schema, "extension dropped");
        Ok(())
    }

    /// A bootstrap sharing this extension's registry and state. Routines
    /// dropped or replaced later are seen by it.
    pub fn bootstrap(&self) -> Result<Bootstrap, AnonError> {
        if !self.registry.lock()?.is_installed() {
            return Err(TrustError::NotInstalled.into());
        }
        let loader = ReferenceDatasetLoader::new(
            self.host.clone(),
            self.sink.clone(),
            self.config.schema.clone(),
            self.config.data_subdir.clone(),
        );
        Ok(Bootstrap::new(
            self.registry.clone(),
            self.state.clone(),
            loader,
            ExecutionContextSelector::new(self.config.owner_role.clone()),
            self.config.aggregation,
        ))
    }

    fn publish(&self, registry: &RoutineRegistry) -> Result<InstallReport, AnonError> {
        let security_labels = registry.security_label_statements();
        for statement in &security_labels {
            self.host.execute(statement)?;
        }
        let grants = GrantManager::new(
            self.host.as_ref(),
            self.config.schema.clone(),
            self.config.operator_role.clone(),
        )
        .apply_version_gated_grants()?;
        Ok(InstallReport {
            security_labels,
            grants,
        })
    }
}
