// crates/fleetgate-controller/src/scheduler.rs
// ============================================================================
// Module: Fleetgate Scheduler
// Description: Periodic discovery, drift-scan, and heartbeat loops over a
//              Controller (§4.9).
// Purpose: Drive the Controller's blocking operations on a fixed cadence
//          without letting a slow run of one kind overlap itself.
// Dependencies: fleetgate-core, tokio
// ============================================================================

//! ## Overview
//! Each loop here is grounded on the same `tokio::time::interval` ping-loop
//! shape used elsewhere in the ecosystem for periodic background work: tick,
//! discard the first immediate tick, then do one unit of work per
//! subsequent tick. A per-kind `Arc<AtomicBool>` "busy" flag coalesces
//! overlapping runs (a scan still in flight when its next tick fires is
//! skipped, not queued), since discovery and drift scans block on agent RPCs
//! that can run longer than their own interval under load.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use fleetgate_core::SchedulerSettings;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::controller::Controller;

/// Handle to a running [`Scheduler`]'s background tasks, used to stop them.
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Aborts every loop this scheduler started.
    pub fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Starts the discovery, drift-scan, and heartbeat loops over `controller`
/// per `settings`'s configured intervals (§4.9).
///
/// Each loop runs the Controller's blocking call via `spawn_blocking` so a
/// slow agent RPC never stalls the async runtime's other work.
pub struct Scheduler;

impl Scheduler {
    /// Spawns the three periodic loops and returns a handle to stop them.
    #[must_use]
    pub fn start(controller: Arc<Controller>, settings: &SchedulerSettings) -> SchedulerHandle {
        let tasks = vec![
            spawn_loop("discovery", Duration::from_secs(settings.discovery_s), Arc::clone(&controller), |controller| {
                if let Err(err) = controller.discover() {
                    warn!(error = %err, "discovery run failed");
                }
            }),
            spawn_loop("drift-scan", Duration::from_secs(settings.drift_scan_s), Arc::clone(&controller), |controller| {
                match controller.scan_drift_all() {
                    Ok(items) => info!(count = items.len(), "drift scan completed"),
                    Err(err) => warn!(error = %err, "drift scan run failed"),
                }
            }),
            spawn_loop("heartbeat", Duration::from_secs(settings.heartbeat_s), Arc::clone(&controller), |controller| {
                let unreachable = controller.heartbeat();
                if !unreachable.is_empty() {
                    warn!(?unreachable, "heartbeat: hosts unreachable");
                }
            }),
        ];
        SchedulerHandle { tasks }
    }
}

/// Spawns one named periodic loop, skipping a tick whenever the previous
/// run of this same kind is still in flight.
fn spawn_loop<F>(name: &'static str, period: Duration, controller: Arc<Controller>, run: F) -> JoinHandle<()>
where
    F: Fn(&Controller) + Send + Sync + Clone + 'static,
{
    let busy = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            if busy.swap(true, Ordering::SeqCst) {
                warn!(name, "scheduler tick skipped, previous run still in flight");
                continue;
            }
            let controller = Arc::clone(&controller);
            let busy = Arc::clone(&busy);
            let run = run.clone();
            let result = tokio::task::spawn_blocking(move || {
                run(&controller);
            })
            .await;
            busy.store(false, Ordering::SeqCst);
            if let Err(err) = result {
                warn!(name, error = %err, "scheduler task join failed");
            }
        }
    })
}
