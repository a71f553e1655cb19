//! Periodic triggers and their scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// Work run once per trigger cycle.
#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn cycle_completed(&self);
}

/// The triggers of a runtime. Cycles never overlap.
pub(crate) struct TriggerSet {
    triggers: Vec<Arc<dyn Trigger>>,
    cycle: Mutex<()>,
}

impl TriggerSet {
    pub(crate) fn new(triggers: Vec<Arc<dyn Trigger>>) -> Self {
        Self {
            triggers,
            cycle: Mutex::new(()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.triggers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Runs one cycle: every trigger in registration order.
    pub(crate) async fn fire(&self) {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        tracing::debug!(triggers = self.triggers.len(), "Firing triggers");

        for trigger in &self.triggers {
            tracing::trace!(trigger = trigger.name(), "Running trigger");
            trigger.cycle_completed().await;
        }

        metrics::counter!("trigger_cycles_total").increment(1);
        tracing::debug!(
            triggers = self.triggers.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Trigger cycle completed"
        );
    }
}

/// Background task firing a trigger set at a fixed interval.
pub(crate) struct Scheduler {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub(crate) fn start(triggers: Arc<TriggerSet>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticks = tokio::time::interval_at(start, interval);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticks.tick() => triggers.fire().await,
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Trigger scheduler stopped");
        });
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Trigger scheduler started"
        );
        Self { stop, handle }
    }

    /// Stops the scheduler and waits for a running cycle to finish.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Trigger scheduler ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        cycles: AtomicUsize,
    }

    #[async_trait]
    impl Trigger for Counter {
        async fn cycle_completed(&self) {
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_fire_runs_every_trigger() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let set = TriggerSet::new(vec![a.clone(), b.clone()]);

        set.fire().await;
        set.fire().await;

        assert_eq!(a.cycles.load(Ordering::SeqCst), 2);
        assert_eq!(b.cycles.load(Ordering::SeqCst), 2);
        assert_eq!(set.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_fires_until_stopped() {
        let counter = Arc::new(Counter::default());
        let set = Arc::new(TriggerSet::new(vec![counter.clone()]));
        let scheduler = Scheduler::start(set, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(35)).await;
        scheduler.stop().await;
        let fired = counter.cycles.load(Ordering::SeqCst);
        assert_eq!(fired, 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.cycles.load(Ordering::SeqCst), fired);
    }
}
