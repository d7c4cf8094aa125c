//! Compiled-in catalog of reference datasets used by fake-data generators.
//!
//! Paths are relative to a [`DataDirectory`], which can only be built from
//! the share directory the engine reports. Nothing here accepts a path from
//! a caller.

use crate::host::{HostEngine, HostError};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetSpec {
    pub target_name: &'static str,
    pub relative_path: &'static str,
}

impl DatasetSpec {
    const fn new(target_name: &'static str, relative_path: &'static str) -> Self {
        Self {
            target_name,
            relative_path,
        }
    }

    pub fn resolve(&self, dir: &DataDirectory) -> PathBuf {
        dir.path().join(self.relative_path)
    }
}

pub const DATASET_CATALOG: [DatasetSpec; 13] = [
    DatasetSpec::new("identifiers_category", "identifiers_category.csv"),
    DatasetSpec::new("identifier", "identifier.csv"),
    DatasetSpec::new("address", "address.csv"),
    DatasetSpec::new("city", "city.csv"),
    DatasetSpec::new("company", "company.csv"),
    DatasetSpec::new("country", "country.csv"),
    DatasetSpec::new("email", "email.csv"),
    DatasetSpec::new("first_name", "first_name.csv"),
    DatasetSpec::new("iban", "iban.csv"),
    DatasetSpec::new("last_name", "last_name.csv"),
    DatasetSpec::new("postcode", "postcode.csv"),
    DatasetSpec::new("siret", "siret.csv"),
    DatasetSpec::new("lorem_ipsum", "lorem_ipsum.csv"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("data subdirectory must be a plain relative path: {0}")]
    InvalidSubdir(String),
}

/// Check that `subdir` cannot climb out of the share directory.
pub fn validate_subdir(subdir: &Path) -> Result<(), CatalogError> {
    let plain = subdir.components().count() > 0
        && subdir
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if plain {
        Ok(())
    } else {
        Err(CatalogError::InvalidSubdir(subdir.display().to_string()))
    }
}

/// Directory holding the dataset files: engine share dir + fixed subpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirectory(PathBuf);

impl DataDirectory {
    pub fn discover(host: &dyn HostEngine, subdir: &Path) -> Result<Self, DiscoveryError> {
        validate_subdir(subdir)?;
        let share = host.share_dir()?;
        let dir = share.join(subdir);
        tracing::debug!(path = %dir.display(), "resolved reference data directory");
        Ok(Self(dir))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("cannot query share directory: {0}")]
    Host(#[from] HostError),
}
