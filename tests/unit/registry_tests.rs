use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tickfleet::models::process::{ManagedProcess, OutputSink, Role};
use tickfleet::supervisor::registry::{ProcessLookup, ProcessRegistry};
use tickfleet::{AppError, Result};

/// Lookup that counts calls and always answers `found`.
struct CountingLookup {
    found: Option<u32>,
    calls: AtomicUsize,
}

impl ProcessLookup for CountingLookup {
    fn find(&self, _pattern: &str) -> Pin<Box<dyn Future<Output = Result<Option<u32>>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let found = self.found;
        Box::pin(async move { Ok(found) })
    }
}

struct FailingLookup;

impl ProcessLookup for FailingLookup {
    fn find(&self, _pattern: &str) -> Pin<Box<dyn Future<Output = Result<Option<u32>>> + Send + '_>> {
        Box::pin(async { Err(AppError::Process("lookup unavailable".into())) })
    }
}

fn counting(found: Option<u32>) -> Arc<CountingLookup> {
    Arc::new(CountingLookup {
        found,
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn empty_registry_consults_the_lookup() {
    let lookup = counting(Some(900));
    let mut registry = ProcessRegistry::new(lookup.clone());

    let pid = registry
        .find_running(Role::Pipeline, "pipeline_app")
        .await
        .expect("lookup");

    assert_eq!(pid, Some(900));
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lookup_failure_propagates() {
    let mut registry = ProcessRegistry::new(Arc::new(FailingLookup));

    let err = registry
        .find_running(Role::Visualizer, "gui_app")
        .await
        .expect_err("lookup failed");

    assert!(matches!(err, AppError::Process(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn live_registry_entry_wins_over_lookup() {
    let lookup = counting(Some(900));
    let mut registry = ProcessRegistry::new(lookup.clone());
    let argv = vec!["sleep".to_owned(), "30".to_owned()];
    let child = tickfleet::supervisor::launcher::spawn(&argv, &OutputSink::Null).expect("spawn");
    let process = ManagedProcess::spawned(Role::Pipeline, argv, OutputSink::Null, child);
    let own_pid = process.pid;
    registry.insert(process).expect("insert");

    let pid = registry
        .find_running(Role::Pipeline, "sleep")
        .await
        .expect("lookup");

    assert_eq!(pid, own_pid);
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn live_role_cannot_be_inserted_twice() {
    let mut registry = ProcessRegistry::new(counting(None));
    let argv = vec!["sleep".to_owned(), "30".to_owned()];
    let spawn = || {
        let child =
            tickfleet::supervisor::launcher::spawn(&argv, &OutputSink::Null).expect("spawn");
        ManagedProcess::spawned(Role::Visualizer, argv.clone(), OutputSink::Null, child)
    };

    registry.insert(spawn()).expect("first insert");
    let err = registry.insert(spawn()).expect_err("duplicate live role");

    assert!(matches!(err, AppError::Process(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn terminal_entries_can_be_replaced() {
    let mut registry = ProcessRegistry::new(counting(None));

    registry
        .insert(ManagedProcess::external(Role::Pipeline, Some(1)))
        .expect("first");
    registry
        .insert(ManagedProcess::external(Role::Pipeline, Some(2)))
        .expect("terminal entry replaced");

    assert_eq!(registry.get(Role::Pipeline).and_then(|p| p.pid), Some(2));
    assert!(!registry.is_live(Role::Pipeline));
}

#[test]
fn roles_are_listed_in_startup_order() {
    let mut registry = ProcessRegistry::new(counting(None));
    for role in [Role::Visualizer, Role::DependencyService, Role::Pipeline] {
        registry
            .insert(ManagedProcess::external(role, None))
            .expect("insert");
    }

    assert_eq!(
        registry.roles(),
        vec![Role::DependencyService, Role::Pipeline, Role::Visualizer]
    );
    assert!(registry.remove(Role::Pipeline).is_some());
    assert_eq!(registry.len(), 2);
}
