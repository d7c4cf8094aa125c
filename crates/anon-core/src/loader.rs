//! Reference dataset loader.
//!
//! Loads every entry of [`DATASET_CATALOG`] into `<schema>.<target>`. Loads
//! are independent: one failing file is recorded and the rest still run.
//! The loader never fails outward; it returns a [`LoadReport`] and leaves the
//! success decision to the caller through an [`AggregationPolicy`].

use crate::catalog::{DataDirectory, DatasetSpec, DATASET_CATALOG};
use crate::context::ElevatedCapability;
use crate::host::{DatasetSink, HostEngine};
use crate::routine::{loader_routine, RoutineSignature};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How per-dataset outcomes combine into one success signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationPolicy {
    /// Success if any dataset loaded (`bool_or`). A single success hides
    /// every other failure; kept as the default for compatibility.
    #[default]
    #[serde(rename = "any")]
    AnySucceeded,
    /// Success only if every dataset loaded.
    #[serde(rename = "all")]
    AllSucceeded,
}

impl AggregationPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "any" => Some(Self::AnySucceeded),
            "all" => Some(Self::AllSucceeded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnySucceeded => "any",
            Self::AllSucceeded => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetOutcome {
    pub target: String,
    pub path: Option<PathBuf>,
    pub loaded: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub outcomes: Vec<DatasetOutcome>,
}

impl LoadReport {
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.loaded)
    }

    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.loaded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DatasetOutcome> {
        self.outcomes.iter().filter(|o| !o.loaded)
    }

    pub fn loaded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.loaded).count()
    }

    pub fn succeeded(&self, policy: AggregationPolicy) -> bool {
        match policy {
            AggregationPolicy::AnySucceeded => self.any_succeeded(),
            AggregationPolicy::AllSucceeded => self.all_succeeded(),
        }
    }
}

pub struct ReferenceDatasetLoader {
    host: Arc<dyn HostEngine>,
    sink: Arc<dyn DatasetSink>,
    schema: String,
    data_subdir: PathBuf,
    routine: RoutineSignature,
}

impl ReferenceDatasetLoader {
    pub fn new(
        host: Arc<dyn HostEngine>,
        sink: Arc<dyn DatasetSink>,
        schema: impl Into<String>,
        data_subdir: impl Into<PathBuf>,
    ) -> Self {
        let schema = schema.into();
        Self {
            host,
            sink,
            routine: loader_routine(&schema).signature,
            schema,
            data_subdir: data_subdir.into(),
        }
    }

    /// Routine whose registered descriptor must be elevated before calling
    /// [`Self::load_all`].
    pub fn routine(&self) -> &RoutineSignature {
        &self.routine
    }

    pub fn load_all(&self, cap: &ElevatedCapability) -> LoadReport {
        tracing::debug!(
            routine = %cap.routine(),
            owner = cap.owner(),
            search_path = %cap.search_path().to_sql(),
            "loading reference datasets"
        );

        if cap.routine() != &self.routine {
            tracing::warn!(routine = %cap.routine(), "capability issued for another routine");
            return self.fail_all(&format!("capability issued for {}", cap.routine()));
        }

        let dir = match DataDirectory::discover(self.host.as_ref(), &self.data_subdir) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(error = %e, "reference data directory unavailable");
                return self.fail_all(&e.to_string());
            }
        };

        let outcomes = DATASET_CATALOG
            .iter()
            .map(|spec| self.load_one(spec, &spec.resolve(&dir)))
            .collect();
        let report = LoadReport { outcomes };

        if report.any_succeeded() && !report.all_succeeded() {
            tracing::warn!(
                loaded = report.loaded_count(),
                total = report.outcomes.len(),
                "partial reference data load"
            );
        }
        report
    }

    fn fail_all(&self, reason: &str) -> LoadReport {
        LoadReport {
            outcomes: DATASET_CATALOG
                .iter()
                .map(|spec| DatasetOutcome {
                    target: self.target(spec),
                    path: None,
                    loaded: false,
                    error: Some(reason.to_string()),
                })
                .collect(),
        }
    }

    fn target(&self, spec: &DatasetSpec) -> String {
        format!("{}.{}", self.schema, spec.target_name)
    }

    fn load_one(&self, spec: &DatasetSpec, path: &Path) -> DatasetOutcome {
        let target = self.target(spec);
        match self.sink.load(&target, path) {
            Ok(()) => DatasetOutcome {
                target,
                path: Some(path.to_path_buf()),
                loaded: true,
                error: None,
            },
            Err(e) => {
                tracing::warn!(dataset = %target, path = %path.display(), error = %e, "dataset load failed");
                DatasetOutcome {
                    target,
                    path: Some(path.to_path_buf()),
                    loaded: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
