//! Multi-connection tests for StateStore and Bootstrap.
//!
//! Two connections share one file-backed DB so the write lock taken by
//! `BEGIN IMMEDIATE` is exercised for real, not just the in-process mutex.

use anon_core::routine::core_routines;
use anon_core::state::InitTransition;
use anon_core::{
    AggregationPolicy, Bootstrap, BootstrapOutcome, DatasetSink, EngineVersion,
    ExecutionContextSelector, HostEngine, HostError, ReferenceDatasetLoader, RoutineRegistry,
    SharedRegistry, StateStore,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

struct StaticHost;

impl HostEngine for StaticHost {
    fn version(&self) -> Result<EngineVersion, HostError> {
        Ok(EngineVersion::from_num(160000))
    }
    fn share_dir(&self) -> Result<PathBuf, HostError> {
        Ok(PathBuf::from("/share"))
    }
    fn execute(&self, _statement: &str) -> Result<(), HostError> {
        Ok(())
    }
}

#[derive(Default)]
struct CountingSink {
    loads: AtomicUsize,
}

impl DatasetSink for CountingSink {
    fn load(&self, _target: &str, _path: &Path) -> Result<(), HostError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn registry() -> SharedRegistry {
    let mut registry = RoutineRegistry::new();
    registry.install(core_routines("anon")).unwrap();
    SharedRegistry::new(registry)
}

fn bootstrap(state: StateStore, sink: Arc<dyn DatasetSink>) -> Bootstrap {
    Bootstrap::new(
        registry(),
        state,
        ReferenceDatasetLoader::new(Arc::new(StaticHost), sink, "anon", "extension/anon"),
        ExecutionContextSelector::new("anon_owner"),
        AggregationPolicy::AnySucceeded,
    )
}

/// Two uninitiated callers racing: both succeed, the catalog loads once.
#[test]
fn test_two_connections_initialize_once() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path();

    let sink = Arc::new(CountingSink::default());
    let b1 = Arc::new(bootstrap(StateStore::open(path).unwrap(), sink.clone()));
    let b2 = Arc::new(bootstrap(StateStore::open(path).unwrap(), sink.clone()));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [b1, b2]
        .into_iter()
        .map(|b| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                b.ensure_initialized()
            })
        })
        .collect();

    for h in handles {
        assert!(h.join().unwrap().unwrap());
    }
    assert_eq!(sink.loads.load(Ordering::SeqCst), 13);
}

/// The flag written by one connection is visible to another.
#[test]
fn test_flag_persists_across_connections() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path();

    let writer = StateStore::open(path).unwrap();
    writer.initialize_with(|| true).unwrap();

    let reader = StateStore::open(path).unwrap();
    assert!(reader.is_initialized().unwrap());
    assert!(reader.initialized_at().unwrap().is_some());
}

/// A failed load on one connection leaves nothing for the other to see.
#[test]
fn test_rolled_back_load_is_invisible() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path();

    let a = StateStore::open(path).unwrap();
    let b = StateStore::open(path).unwrap();

    a.initialize_with(|| false).unwrap();
    assert!(!b.is_initialized().unwrap());

    // The write lock was released by the rollback.
    b.initialize_with(|| true).unwrap();
    assert!(a.is_initialized().unwrap());
}

/// A load that outlasts the other connection's busy timeout: the waiter
/// re-reads the flag instead of failing.
#[test]
fn test_waiter_past_busy_timeout_gets_a_transition() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();

    let loader_store = StateStore::open(&path).unwrap();
    let waiter = StateStore::open(&path)
        .unwrap()
        .with_busy_timeout(Duration::from_millis(100))
        .unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let loading = thread::spawn(move || {
        loader_store.initialize_with(|| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            true
        })
    });

    started_rx.recv().unwrap();
    let transition = waiter
        .initialize_with(|| panic!("second load must not run"))
        .unwrap();
    assert_eq!(transition, InitTransition::Contended);
    assert!(!waiter.is_initialized().unwrap());

    release_tx.send(()).unwrap();
    assert_eq!(loading.join().unwrap().unwrap(), InitTransition::Initialized);

    assert!(waiter.is_initialized().unwrap());
    assert_eq!(
        waiter.initialize_with(|| true).unwrap(),
        InitTransition::AlreadyInitialized
    );
}

/// Holds the first load open until released.
struct GatedSink {
    started: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
    loads: AtomicUsize,
}

impl DatasetSink for GatedSink {
    fn load(&self, _target: &str, _path: &Path) -> Result<(), HostError> {
        if let Some(started) = self.started.lock().unwrap().take() {
            started.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A concurrent bootstrap gets `false` (retry later), never an error.
#[test]
fn test_concurrent_bootstrap_returns_false_while_other_loads() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let sink = Arc::new(GatedSink {
        started: Mutex::new(Some(started_tx)),
        release: Mutex::new(release_rx),
        loads: AtomicUsize::new(0),
    });

    let first = bootstrap(StateStore::open(&path).unwrap(), sink.clone());
    let second = bootstrap(
        StateStore::open(&path)
            .unwrap()
            .with_busy_timeout(Duration::from_millis(100))
            .unwrap(),
        sink.clone(),
    );

    let loading = thread::spawn(move || first.ensure_initialized());
    started_rx.recv().unwrap();

    assert_eq!(second.initialize().unwrap(), BootstrapOutcome::Contended);
    assert!(!second.ensure_initialized().unwrap());

    release_tx.send(()).unwrap();
    assert!(loading.join().unwrap().unwrap());
    assert_eq!(sink.loads.load(Ordering::SeqCst), 13);

    assert!(second.ensure_initialized().unwrap());
    assert_eq!(sink.loads.load(Ordering::SeqCst), 13);
}
