// The tick scheduler: one heartbeat source for every zone.
//
// A single task fans strictly increasing tick numbers out to registered
// listener mailboxes. Delivery uses `try_send`; a listener that cannot keep
// up skips beats instead of stalling the heartbeat or its neighbors.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Production heartbeat period.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// One heartbeat: a strictly increasing number plus the engine's monotonic
/// clock reading in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    pub number: u64,
    pub now_ms: i64,
}

lazy_static::lazy_static! {
    static ref CLOCK_ORIGIN: Instant = Instant::now();
}

/// Milliseconds since process start. All engine timestamps use this clock.
pub fn monotonic_ms() -> i64 {
    CLOCK_ORIGIN.elapsed().as_millis() as i64
}

/// The shared heartbeat source.
pub struct TickScheduler {
    listeners: Arc<Mutex<Vec<mpsc::Sender<Tick>>>>,
    handle: JoinHandle<()>,
}

impl TickScheduler {
    /// Start the heartbeat task. Must be called from within a tokio
    /// runtime.
    pub fn start(interval_ms: u64) -> Self {
        let listeners: Arc<Mutex<Vec<mpsc::Sender<Tick>>>> = Arc::new(Mutex::new(Vec::new()));
        let task_listeners = listeners.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut number: u64 = 0;
            loop {
                interval.tick().await;
                number += 1;
                let tick = Tick {
                    number,
                    now_ms: monotonic_ms(),
                };
                let mut listeners = task_listeners.lock().unwrap();
                // Drop listeners whose mailboxes are gone; skip full ones
                listeners.retain(|tx| match tx.try_send(tick) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => true,
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        });

        TickScheduler { listeners, handle }
    }

    /// Register a listener mailbox to receive ticks.
    pub fn register(&self, tx: mpsc::Sender<Tick>) {
        self.listeners.lock().unwrap().push(tx);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Stop the heartbeat.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
