//! End-to-end lifecycle tests: install, bootstrap, retry, upgrade.
//!
//! The engine is replaced by a recording host and a scripted sink whose
//! load counter shows whether the loader ran.

use anon_core::{
    AggregationPolicy, AnonConfig, BootstrapOutcome, BootstrapPhase, DatasetSink, EngineVersion,
    AnonError, BootstrapError, Extension, HostEngine, HostError, InvocationPath, RoutineSignature,
    StateStore, TrustError, TrustLabel, DATASET_CATALOG,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct RecordingHost {
    version: u32,
    share: PathBuf,
    executed: Mutex<Vec<String>>,
    rejected_prefix: Mutex<Option<String>>,
}

impl RecordingHost {
    fn new(version: u32) -> Arc<Self> {
        Arc::new(Self {
            version,
            share: PathBuf::from("/usr/share/postgresql/16"),
            executed: Mutex::new(Vec::new()),
            rejected_prefix: Mutex::new(None),
        })
    }

    fn reject(&self, prefix: Option<&str>) {
        *self.rejected_prefix.lock().unwrap() = prefix.map(str::to_string);
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl HostEngine for RecordingHost {
    fn version(&self) -> Result<EngineVersion, HostError> {
        Ok(EngineVersion::from_num(self.version))
    }
    fn share_dir(&self) -> Result<PathBuf, HostError> {
        Ok(self.share.clone())
    }
    fn execute(&self, statement: &str) -> Result<(), HostError> {
        if let Some(prefix) = self.rejected_prefix.lock().unwrap().as_deref() {
            if statement.starts_with(prefix) {
                return Err(HostError::Statement {
                    statement: statement.to_string(),
                    reason: "no provider".to_string(),
                });
            }
        }
        self.executed.lock().unwrap().push(statement.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedSink {
    failing: Mutex<HashSet<String>>,
    loads: AtomicUsize,
    paths: Mutex<Vec<PathBuf>>,
}

impl ScriptedSink {
    fn fail(&self, targets: impl IntoIterator<Item = String>) {
        *self.failing.lock().unwrap() = targets.into_iter().collect();
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DatasetSink for ScriptedSink {
    fn load(&self, target: &str, path: &Path) -> Result<(), HostError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.paths.lock().unwrap().push(path.to_path_buf());
        if self.failing.lock().unwrap().contains(target) {
            return Err(HostError::Load {
                target: target.to_string(),
                reason: "malformed CSV".to_string(),
            });
        }
        Ok(())
    }
}

fn all_targets() -> Vec<String> {
    DATASET_CATALOG
        .iter()
        .map(|d| format!("anon.{}", d.target_name))
        .collect()
}

fn installed(
    config: AnonConfig,
    version: u32,
) -> (Extension, Arc<RecordingHost>, Arc<ScriptedSink>) {
    let host = RecordingHost::new(version);
    let sink = Arc::new(ScriptedSink::default());
    let mut ext = Extension::new(
        config,
        host.clone(),
        sink.clone(),
        StateStore::memory().unwrap(),
    );
    ext.install().unwrap();
    (ext, host, sink)
}

#[test]
fn test_fresh_install_then_ensure_initialized_twice() {
    let (ext, _host, sink) = installed(AnonConfig::default(), 160000);
    let bootstrap = ext.bootstrap().unwrap();

    assert_eq!(bootstrap.phase().unwrap(), BootstrapPhase::Uninitialized);
    assert!(bootstrap.ensure_initialized().unwrap());
    assert_eq!(bootstrap.phase().unwrap(), BootstrapPhase::Initialized);
    assert_eq!(sink.load_count(), 13);

    assert!(bootstrap.ensure_initialized().unwrap());
    assert_eq!(sink.load_count(), 13, "second call must not reload");
}

#[test]
fn test_failed_load_is_retried() {
    let (ext, _host, sink) = installed(AnonConfig::default(), 160000);
    let bootstrap = ext.bootstrap().unwrap();

    sink.fail(all_targets());
    assert!(!bootstrap.ensure_initialized().unwrap());
    assert_eq!(bootstrap.phase().unwrap(), BootstrapPhase::Uninitialized);
    assert_eq!(sink.load_count(), 13);

    sink.heal();
    assert!(bootstrap.ensure_initialized().unwrap());
    assert_eq!(sink.load_count(), 26);
    assert_eq!(bootstrap.phase().unwrap(), BootstrapPhase::Initialized);
}

#[test]
fn test_one_of_thirteen_succeeds_under_any_policy() {
    let (ext, _host, sink) = installed(AnonConfig::default(), 160000);
    sink.fail(all_targets().into_iter().filter(|t| t != "anon.iban"));

    match ext.bootstrap().unwrap().initialize().unwrap() {
        BootstrapOutcome::Initialized(report) => {
            assert_eq!(report.loaded_count(), 1);
            assert_eq!(report.failed().count(), 12);
        }
        other => panic!("expected Initialized, got {other:?}"),
    }
}

#[test]
fn test_one_of_thirteen_fails_under_all_policy() {
    let config = AnonConfig {
        aggregation: AggregationPolicy::AllSucceeded,
        ..AnonConfig::default()
    };
    let (ext, _host, sink) = installed(config, 160000);
    sink.fail(all_targets().into_iter().filter(|t| t != "anon.iban"));

    let bootstrap = ext.bootstrap().unwrap();
    assert!(!bootstrap.ensure_initialized().unwrap());
    assert_eq!(bootstrap.phase().unwrap(), BootstrapPhase::Uninitialized);

    sink.fail(vec!["anon.siret".to_string()]);
    match bootstrap.initialize().unwrap() {
        BootstrapOutcome::Failed(report) => {
            let failed: Vec<_> = report.failed().map(|o| o.target.as_str()).collect();
            assert_eq!(failed, vec!["anon.siret"]);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
#[allow(deprecated)]
fn test_legacy_path_argument_has_no_effect() {
    let (ext, _host, sink) = installed(AnonConfig::default(), 160000);
    let bootstrap = ext.bootstrap().unwrap();

    assert!(bootstrap.init_from_path("/tmp/attacker/datasets").unwrap());
    let paths = sink.paths.lock().unwrap().clone();
    assert_eq!(paths.len(), 13);
    for p in &paths {
        assert!(
            p.starts_with("/usr/share/postgresql/16/extension/anon"),
            "unexpected path {}",
            p.display()
        );
    }

    // Same as calling the current entry point: already initialized.
    assert!(bootstrap.init_from_path("/elsewhere").unwrap());
    assert_eq!(sink.load_count(), 13);
}

#[test]
fn test_install_grants_below_version_gate() {
    let (ext, host, _sink) = installed(AnonConfig::default(), 149999);
    let executed = host.executed();

    assert!(executed.contains(&"GRANT ALL ON ALL TABLES IN SCHEMA anon TO anon_masker".to_string()));
    assert!(executed.contains(&"GRANT ALL ON SCHEMA anon TO anon_masker".to_string()));
    assert!(executed.iter().all(|s| !s.contains("SET ON PARAMETER")));
    assert_eq!(ext.registry().unwrap().descriptors().count(), 3);
}

#[test]
fn test_install_grants_at_version_gate() {
    let (_ext, host, _sink) = installed(AnonConfig::default(), 150000);
    let grants: Vec<_> = host
        .executed()
        .into_iter()
        .filter(|s| s.starts_with("GRANT"))
        .collect();
    assert_eq!(grants.len(), 3);
    assert!(grants.contains(
        &"GRANT SET ON PARAMETER anon.transparent_dynamic_masking TO anon_masker".to_string()
    ));
}

#[test]
fn test_install_publishes_untrusted_labels() {
    let (ext, host, _sink) = installed(AnonConfig::default(), 160000);
    let labels: Vec<_> = host
        .executed()
        .into_iter()
        .filter(|s| s.starts_with("SECURITY LABEL"))
        .collect();
    assert_eq!(labels.len(), 3);
    assert!(labels.iter().all(|s| s.ends_with("IS 'UNTRUSTED'")));

    let init = RoutineSignature::new("anon", "init", &[]);
    let registry = ext.registry().unwrap();
    assert_eq!(registry.classify(&init), TrustLabel::Untrusted);
    assert!(registry
        .authorize(&init, InvocationPath::TrustedOnly, None)
        .is_err());
}

#[test]
fn test_upgrade_keeps_initialization_flag() {
    let (mut ext, host, sink) = installed(AnonConfig::default(), 150000);
    assert!(ext.bootstrap().unwrap().ensure_initialized().unwrap());

    let report = ext.upgrade().unwrap();
    assert_eq!(report.grants.issued.len(), 3);
    assert_eq!(host.executed().len(), 12);
    assert!(ext.bootstrap().unwrap().ensure_initialized().unwrap());
    assert_eq!(sink.load_count(), 13);
}

#[test]
fn test_bootstrap_requires_install() {
    let host = RecordingHost::new(160000);
    let mut ext = Extension::new(
        AnonConfig::default(),
        host,
        Arc::new(ScriptedSink::default()),
        StateStore::memory().unwrap(),
    );
    assert!(ext.bootstrap().is_err());
    ext.install().unwrap();
    assert!(ext.bootstrap().is_ok());
    ext.drop_extension().unwrap();
    assert!(ext.bootstrap().is_err());
}

#[test]
fn test_reinstall_starts_uninitialized() {
    let (mut ext, _host, sink) = installed(AnonConfig::default(), 160000);
    assert!(ext.bootstrap().unwrap().ensure_initialized().unwrap());

    ext.drop_extension().unwrap();
    ext.install().unwrap();
    let bootstrap = ext.bootstrap().unwrap();
    assert_eq!(bootstrap.phase().unwrap(), BootstrapPhase::Uninitialized);
    assert!(bootstrap.ensure_initialized().unwrap());
    assert_eq!(sink.load_count(), 26);
}

#[test]
fn test_dropped_extension_refuses_to_load() {
    let (mut ext, _host, sink) = installed(AnonConfig::default(), 160000);
    let bootstrap = ext.bootstrap().unwrap();

    ext.drop_extension().unwrap();
    match bootstrap.ensure_initialized() {
        Err(BootstrapError::Trust(TrustError::UnknownRoutine { routine })) => {
            assert_eq!(routine, "anon.init_datasets()");
        }
        other => panic!("expected UnknownRoutine, got {other:?}"),
    }
    assert_eq!(sink.load_count(), 0);
    assert_eq!(bootstrap.phase().unwrap(), BootstrapPhase::Uninitialized);
}

#[test]
fn test_bootstrap_sees_reinstall() {
    let (mut ext, _host, sink) = installed(AnonConfig::default(), 160000);
    let bootstrap = ext.bootstrap().unwrap();

    ext.drop_extension().unwrap();
    ext.install().unwrap();
    assert!(bootstrap.ensure_initialized().unwrap());
    assert_eq!(sink.load_count(), 13);
}

#[test]
fn test_failed_install_can_be_retried() {
    let host = RecordingHost::new(160000);
    let sink = Arc::new(ScriptedSink::default());
    let mut ext = Extension::new(
        AnonConfig::default(),
        host.clone(),
        sink,
        StateStore::memory().unwrap(),
    );

    host.reject(Some("SECURITY LABEL"));
    match ext.install() {
        Err(AnonError::Host(HostError::Statement { statement, .. })) => {
            assert!(statement.starts_with("SECURITY LABEL FOR anon"));
        }
        other => panic!("expected statement error, got {other:?}"),
    }
    assert!(!ext.registry().unwrap().is_installed());
    assert!(ext.bootstrap().is_err());

    host.reject(None);
    let report = ext.install().unwrap();
    assert_eq!(report.security_labels.len(), 3);
    assert!(ext.registry().unwrap().is_installed());
    assert!(ext.bootstrap().unwrap().ensure_initialized().unwrap());
}

#[test]
fn test_failed_upgrade_keeps_previous_routines() {
    let (mut ext, host, _sink) = installed(AnonConfig::default(), 160000);

    host.reject(Some("GRANT"));
    assert!(ext.upgrade().is_err());
    assert!(ext.registry().unwrap().is_installed());
    assert_eq!(ext.registry().unwrap().descriptors().count(), 3);
    assert!(ext.install().is_err(), "still installed, install must refuse");
}
