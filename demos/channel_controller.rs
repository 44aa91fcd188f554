//! # Example: channel_controller
//!
//! A controller fed by an in-process channel. A producer emits create/update events for a
//! handful of objects; the reconciler fails the first attempt of every key so the
//! rate-limited requeue is visible, and asks for one delayed requeue. After two seconds the
//! context is cancelled and the manager shuts everything down.
//!
//! ## Flow
//! ```text
//! producer ─► ChannelSource ─► GenerationChanged ─► EnqueueRequestForObject ─► WorkQueue
//!                                                                                 │
//! worker-0 / worker-1 ◄───────────────────────────────────────────────────────────┘
//!   ├─► attempt 1 → Err("not ready")     → RequeueScheduled{Backoff, 20ms}
//!   ├─► attempt 2 → Ok(requeue_after)    → RequeueScheduled{After, 300ms}
//!   └─► attempt 3 → Ok(done)             → key forgotten
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=ctrlvisor=debug cargo run --example channel_controller
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ctrlvisor::{
    Action, BackoffPolicy, ChannelSource, Controller, ControllerOptions, EnqueueRequestForObject,
    GenerationChanged, JitterPolicy, LogWriter, Manager, ManagerConfig, ObjectMeta, Predicate,
    ReconcileError, ReconcilerFn, Request, Subscribe, WatchEvent,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ctrlvisor=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // 1. Manager with the tracing-backed subscriber.
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mgr = Manager::builder(ManagerConfig::default())
        .with_subscribers(subs)
        .build();

    // 2. Reconciler: fail once, then requeue once after a delay, then settle.
    let attempts: Arc<Mutex<HashMap<Request, u32>>> = Arc::default();
    let reconciler = ReconcilerFn::arc(move |ctx: CancellationToken, req: Request| {
        let attempts = Arc::clone(&attempts);
        async move {
            if ctx.is_cancelled() {
                return Err(ReconcileError::Canceled);
            }
            let n = {
                let mut map = attempts.lock().unwrap();
                let n = map.entry(req.clone()).or_insert(0);
                *n += 1;
                *n
            };
            println!("[reconcile] {req} attempt {n}");
            match n {
                1 => Err(ReconcileError::fail("not ready")),
                2 => Ok(Action::requeue_after(Duration::from_millis(300))),
                _ => Ok(Action::done()),
            }
        }
    });

    // 3. Controller with two workers and a short jittered backoff.
    let backoff = BackoffPolicy {
        first: Duration::from_millis(20),
        max: Duration::from_secs(2),
        factor: 2.0,
        jitter: JitterPolicy::Equal,
    };
    let ctrl = Controller::new(
        "objects",
        &mgr,
        ControllerOptions::default()
            .with_reconciler(reconciler)
            .with_max_concurrent_reconciles(2)
            .with_rate_limiter(backoff),
    )?;

    // 4. Watch a channel; status-only updates (same generation) are filtered out.
    let (tx, source) = ChannelSource::channel("objects", 32);
    let only_spec_changes: Arc<dyn Predicate> = Arc::new(GenerationChanged);
    ctrl.watch(source, EnqueueRequestForObject, vec![only_spec_changes])?;

    // 5. Producer.
    tokio::spawn(async move {
        for name in ["alpha", "beta", "gamma"] {
            let obj = ObjectMeta::new("default", name).with_generation(1);
            let _ = tx.send(WatchEvent::Create { object: obj.clone() }).await;
            // Dropped by GenerationChanged.
            let _ = tx
                .send(WatchEvent::Update {
                    old: obj.clone(),
                    new: obj,
                })
                .await;
        }
    });

    // 6. Run for two seconds.
    let ctx = CancellationToken::new();
    let stop = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        stop.cancel();
    });
    mgr.start(ctx).await?;

    println!("[main] stopped; live tasks: {:?}", ctrl.tasks().snapshot());
    Ok(())
}
