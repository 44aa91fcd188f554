use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ctrlvisor::{
    Action, BackoffPolicy, ChannelSource, Controller, ControllerError, ControllerOptions,
    Dependencies, EnqueueRequestForObject, Inject, InjectError, LifecycleState, Manager,
    ManagerConfig, ObjectMeta, ReconcileError, Reconciler, ReconcilerFn, Request, StreamSource,
    TaskRegistry, WatchEvent,
};

/// Routes runtime `tracing` output through the test harness (`RUST_LOG` to widen).
fn logs() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn manager() -> Arc<Manager> {
    Manager::new(ManagerConfig::default())
}

fn noop() -> Arc<dyn Reconciler> {
    ReconcilerFn::arc(|_ctx: CancellationToken, _req: Request| async {
        Ok::<_, ReconcileError>(Action::done())
    })
}

fn event(name: &str) -> WatchEvent {
    WatchEvent::generic(ObjectMeta::new("default", name))
}

/// Controller with one channel watch; returns the sender feeding it.
fn controller_with_channel(
    mgr: &Manager,
    name: &str,
    opts: ControllerOptions,
) -> (Arc<Controller>, mpsc::Sender<WatchEvent>) {
    let ctrl = Controller::new(name, mgr, opts).unwrap();
    let (tx, source) = ChannelSource::channel(name, 64);
    ctrl.watch(source, EnqueueRequestForObject, Vec::new()).unwrap();
    (ctrl, tx)
}

fn spawn_start(
    ctrl: &Arc<Controller>,
    ctx: &CancellationToken,
) -> tokio::task::JoinHandle<Result<(), ControllerError>> {
    let ctrl = Arc::clone(ctrl);
    let ctx = ctx.clone();
    tokio::spawn(async move { ctrl.start(ctx).await })
}

// ---- construction ----

#[test]
fn empty_name_is_rejected() {
    let mgr = manager();
    let err = Controller::new("", &mgr, ControllerOptions::default().with_reconciler(noop()))
        .unwrap_err();
    assert!(err.to_string().contains("must specify Name"), "{err}");
    assert!(err.is_construction());
    assert!(mgr.controller_names().is_empty());
}

#[test]
fn missing_reconciler_is_rejected() {
    let mgr = manager();
    let err = Controller::new("foo", &mgr, ControllerOptions::default()).unwrap_err();
    assert!(err.to_string().contains("must specify Reconciler"), "{err}");
    assert!(mgr.controller_names().is_empty());
}

struct FailingInjection;

impl Inject for FailingInjection {
    fn inject(&self, _deps: &Dependencies) -> Result<(), InjectError> {
        Err(InjectError::new("expected error"))
    }
}

#[async_trait]
impl Reconciler for FailingInjection {
    async fn reconcile(
        &self,
        _ctx: CancellationToken,
        _req: Request,
    ) -> Result<Action, ReconcileError> {
        Ok(Action::done())
    }

    fn injector(&self) -> Option<&dyn Inject> {
        Some(self)
    }
}

#[test]
fn injection_error_is_returned_verbatim() {
    let mgr = manager();
    let opts = ControllerOptions::default().with_reconciler(Arc::new(FailingInjection));
    let err = Controller::new("foo", &mgr, opts).unwrap_err();
    assert!(matches!(err, ControllerError::Injection(_)));
    assert!(err.to_string().contains("expected error"), "{err}");
    assert!(mgr.controller_names().is_empty(), "failed construction frees the name");

    // The name is still available afterwards.
    Controller::new("foo", &mgr, ControllerOptions::default().with_reconciler(noop())).unwrap();
}

#[test]
fn distinct_names_register_and_duplicates_fail() {
    let mgr = manager();
    let opts = || ControllerOptions::default().with_reconciler(noop());
    let a = Controller::new("foo", &mgr, opts()).unwrap();
    Controller::new("bar", &mgr, opts()).unwrap();
    assert_eq!(mgr.controller_names(), vec!["bar".to_string(), "foo".to_string()]);

    let err = Controller::new("foo", &mgr, opts()).unwrap_err();
    assert!(matches!(err, ControllerError::DuplicateName { ref name } if name == "foo"));
    assert_eq!(a.state(), LifecycleState::Unstarted);
}

#[test]
fn unstarted_controller_spawns_nothing() {
    let mgr = manager();
    let tasks = TaskRegistry::new();
    let ctrl = Controller::new(
        "idle",
        &mgr,
        ControllerOptions::default()
            .with_reconciler(noop())
            .with_tasks(tasks.clone()),
    )
    .unwrap();
    let (_tx, source) = ChannelSource::channel("idle", 1);
    ctrl.watch(source, EnqueueRequestForObject, Vec::new()).unwrap();

    assert_eq!(ctrl.watch_count(), 1);
    assert!(tasks.is_empty());
    drop(ctrl);
    assert!(tasks.is_empty());
}

// ---- lifecycle ----

#[tokio::test]
async fn watch_and_start_are_rejected_after_start() {
    let mgr = manager();
    let (ctrl, _tx) = controller_with_channel(&mgr, "once", ControllerOptions::default().with_reconciler(noop()));
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);

    while ctrl.state() == LifecycleState::Unstarted {
        tokio::task::yield_now().await;
    }
    let (_tx2, late) = ChannelSource::channel("late", 1);
    let err = ctrl.watch(late, EnqueueRequestForObject, Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::InvalidState { op: "watch", state: LifecycleState::Running }
    ));

    let again = ctrl.start(ctx.clone()).await.unwrap_err();
    assert!(matches!(again, ControllerError::AlreadyStarted { .. }));

    ctx.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(ctrl.state(), LifecycleState::Stopped);
    assert!(ctrl.start(CancellationToken::new()).await.is_err());
}

#[tokio::test]
async fn events_are_reconciled() {
    logs();
    let mgr = manager();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let rec = ReconcilerFn::arc(move |_ctx: CancellationToken, req: Request| {
        let seen = seen_tx.clone();
        async move {
            let _ = seen.send(req);
            Ok::<_, ReconcileError>(Action::done())
        }
    });
    let (ctrl, tx) = controller_with_channel(
        &mgr,
        "pods",
        ControllerOptions::default()
            .with_reconciler(rec)
            .with_max_concurrent_reconciles(2),
    );
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);

    tx.send(event("a")).await.unwrap();
    tx.send(event("b")).await.unwrap();
    let mut got = vec![seen_rx.recv().await.unwrap(), seen_rx.recv().await.unwrap()];
    got.sort();
    assert_eq!(got, vec![Request::new("default", "a"), Request::new("default", "b")]);

    ctx.cancel();
    handle.await.unwrap().unwrap();
    assert!(ctrl.tasks().is_empty(), "leaked: {:?}", ctrl.tasks().snapshot());
}

// ---- shutdown ----

#[tokio::test(start_paused = true)]
async fn start_waits_for_in_flight_reconcile() {
    const SLOW: Duration = Duration::from_secs(3);

    let mgr = manager();
    let finished = Arc::new(AtomicBool::new(false));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel::<()>();
    let done = Arc::clone(&finished);
    let rec = ReconcilerFn::arc(move |_ctx: CancellationToken, _req: Request| {
        let done = Arc::clone(&done);
        let started = started_tx.clone();
        async move {
            let _ = started.send(());
            tokio::time::sleep(SLOW).await;
            done.store(true, Ordering::SeqCst);
            Ok::<_, ReconcileError>(Action::done())
        }
    });
    let (ctrl, tx) = controller_with_channel(&mgr, "slow", ControllerOptions::default().with_reconciler(rec));
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);

    tx.send(event("a")).await.unwrap();
    started_rx.recv().await.unwrap();
    let cancelled_at = Instant::now();
    ctx.cancel();

    handle.await.unwrap().unwrap();
    assert!(finished.load(Ordering::SeqCst), "start returned before the reconcile did");
    assert!(cancelled_at.elapsed() >= SLOW);
    assert_eq!(ctrl.state(), LifecycleState::Stopped);
    assert!(ctrl.tasks().is_empty());
}

#[tokio::test]
async fn no_task_survives_start() {
    let mgr = manager();
    let tasks = TaskRegistry::new();
    let (ctrl, tx) = controller_with_channel(
        &mgr,
        "leak",
        ControllerOptions::default()
            .with_reconciler(noop())
            .with_max_concurrent_reconciles(8)
            .with_tasks(tasks.clone()),
    );
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);

    for i in 0..20 {
        tx.send(event(&format!("obj-{i}"))).await.unwrap();
    }
    while tasks.len() < 9 {
        tokio::task::yield_now().await;
    }
    ctx.cancel();
    handle.await.unwrap().unwrap();
    assert!(tasks.is_empty(), "leaked: {:?}", tasks.snapshot());
}

#[tokio::test]
async fn delayed_requeue_is_abandoned_on_shutdown() {
    let mgr = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let (called_tx, mut called_rx) = mpsc::unbounded_channel::<()>();
    let counter = Arc::clone(&calls);
    let rec = ReconcilerFn::arc(move |_ctx: CancellationToken, _req: Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        let called = called_tx.clone();
        async move {
            let _ = called.send(());
            Ok::<_, ReconcileError>(Action::requeue_after(Duration::from_secs(3600)))
        }
    });
    let (ctrl, tx) = controller_with_channel(&mgr, "later", ControllerOptions::default().with_reconciler(rec));
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);

    tx.send(event("a")).await.unwrap();
    called_rx.recv().await.unwrap();
    while !ctrl.tasks().snapshot().contains(&"later:requeue".to_string()) {
        tokio::task::yield_now().await;
    }

    ctx.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("start must not wait for the delayed requeue")
        .unwrap()
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(ctrl.tasks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_reconcile_begins_once_stopping() {
    let mgr = manager();
    let handle_slot: Arc<std::sync::OnceLock<std::sync::Weak<Controller>>> =
        Arc::new(std::sync::OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel::<()>();

    let rec = {
        let (slot, seen) = (handle_slot.clone(), seen.clone());
        ReconcilerFn::arc(move |_ctx: CancellationToken, _req: Request| {
            let state = slot.get().and_then(|w| w.upgrade()).map(|c| c.state());
            seen.lock().unwrap().push(state);
            let entered = entered_tx.clone();
            async move {
                let _ = entered.send(());
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ReconcileError>(Action::done())
            }
        })
    };
    let (ctrl, tx) = controller_with_channel(
        &mgr,
        "draining",
        ControllerOptions::default()
            .with_reconciler(rec)
            .with_max_concurrent_reconciles(2),
    );
    let _ = handle_slot.set(Arc::downgrade(&ctrl));

    for i in 0..6 {
        tx.send(event(&format!("obj-{i}"))).await.unwrap();
    }
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);
    entered_rx.recv().await.unwrap();
    entered_rx.recv().await.unwrap();
    ctx.cancel();
    handle.await.unwrap().unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2, "only the in-flight reconciles run: {seen:?}");
    assert!(
        seen.iter().all(|s| *s == Some(LifecycleState::Running)),
        "{seen:?}"
    );
}

// ---- queue semantics through the controller ----

#[tokio::test]
async fn same_key_is_never_reconciled_concurrently() {
    let mgr = manager();
    let gate = Arc::new(Semaphore::new(0));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let rec = {
        let (gate, active, peak, calls) = (gate.clone(), active.clone(), peak.clone(), calls.clone());
        ReconcilerFn::arc(move |_ctx: CancellationToken, _req: Request| {
            let (gate, active, peak, calls) = (gate.clone(), active.clone(), peak.clone(), calls.clone());
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ReconcileError>(Action::done())
            }
        })
    };
    let (ctrl, tx) = controller_with_channel(
        &mgr,
        "dedup",
        ControllerOptions::default()
            .with_reconciler(rec)
            .with_max_concurrent_reconciles(4),
    );
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);

    for _ in 0..5 {
        tx.send(event("same")).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.add_permits(16);
    tokio::time::sleep(Duration::from_millis(50)).await;

    ctx.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    let n = calls.load(Ordering::SeqCst);
    assert!((1..=2).contains(&n), "pending duplicates must coalesce, got {n} calls");
}

#[tokio::test(start_paused = true)]
async fn failures_retry_with_non_decreasing_backoff() {
    let mgr = manager();
    let stamps = Arc::new(Mutex::new(Vec::<Instant>::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let rec = {
        let stamps = Arc::clone(&stamps);
        ReconcilerFn::arc(move |_ctx: CancellationToken, _req: Request| {
            let stamps = Arc::clone(&stamps);
            let done = done_tx.clone();
            async move {
                let n = {
                    let mut s = stamps.lock().unwrap();
                    s.push(Instant::now());
                    s.len()
                };
                if n < 5 {
                    Err(ReconcileError::fail("not yet"))
                } else {
                    let _ = done.send(());
                    Ok(Action::done())
                }
            }
        })
    };
    let backoff = BackoffPolicy {
        first: Duration::from_millis(10),
        max: Duration::from_secs(10),
        factor: 2.0,
        ..BackoffPolicy::default()
    };
    let (ctrl, tx) = controller_with_channel(
        &mgr,
        "retry",
        ControllerOptions::default()
            .with_reconciler(rec)
            .with_rate_limiter(backoff),
    );
    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);

    tx.send(event("flaky")).await.unwrap();
    done_rx.recv().await.unwrap();
    ctx.cancel();
    handle.await.unwrap().unwrap();

    let stamps = stamps.lock().unwrap().clone();
    assert_eq!(stamps.len(), 5);
    let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] >= Duration::from_millis(10), "gaps: {gaps:?}");
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]), "gaps: {gaps:?}");
    assert_eq!(ctrl.queue().num_requeues(&Request::new("default", "flaky")), 0);
}

// ---- sources ----

#[tokio::test]
async fn source_failure_stops_the_controller() {
    logs();
    let mgr = manager();
    let tasks = TaskRegistry::new();
    let ctrl = Controller::new(
        "broken",
        &mgr,
        ControllerOptions::default()
            .with_reconciler(noop())
            .with_tasks(tasks.clone()),
    )
    .unwrap();

    let (_tx, healthy) = ChannelSource::channel("healthy", 4);
    ctrl.watch(healthy, EnqueueRequestForObject, Vec::new()).unwrap();
    let items = vec![Ok(event("a")), Err("connection reset")];
    ctrl.watch(
        StreamSource::new("upstream", futures::stream::iter(items)),
        EnqueueRequestForObject,
        Vec::new(),
    )
    .unwrap();

    let err = ctrl.start(CancellationToken::new()).await.unwrap_err();
    match &err {
        ControllerError::SourceStart { source_name, .. } => assert_eq!(source_name, "upstream"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("connection reset"), "{err}");
    assert_eq!(ctrl.state(), LifecycleState::Stopped);
    assert!(tasks.is_empty(), "leaked: {:?}", tasks.snapshot());
}

#[tokio::test]
async fn finished_source_does_not_stop_the_controller() {
    let mgr = manager();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let rec = ReconcilerFn::arc(move |_ctx: CancellationToken, req: Request| {
        let seen = seen_tx.clone();
        async move {
            let _ = seen.send(req);
            Ok::<_, ReconcileError>(Action::done())
        }
    });
    let ctrl = Controller::new("fixture", &mgr, ControllerOptions::default().with_reconciler(rec)).unwrap();
    ctrl.watch(
        StreamSource::from_events("fixture", vec![event("a")]),
        EnqueueRequestForObject,
        Vec::new(),
    )
    .unwrap();

    let ctx = CancellationToken::new();
    let handle = spawn_start(&ctrl, &ctx);
    assert_eq!(seen_rx.recv().await, Some(Request::new("default", "a")));
    assert_eq!(ctrl.state(), LifecycleState::Running);

    ctx.cancel();
    handle.await.unwrap().unwrap();
}
