// Injectable periodic scheduler with explicit cancel handles
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub type Tick = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub trait Scheduler: Send + Sync {
    /// Run `tick` every `period`, first after one full period.
    fn every(&self, period: Duration, tick: Tick) -> TimerHandle;
}

/// Cancels its timer when cancelled explicitly or dropped.
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn new(cancelled: Arc<AtomicBool>, task: Option<JoinHandle<()>>) -> Self {
        Self { cancelled, task }
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Wall-clock scheduler backed by `tokio::time::interval`. Must be used from
/// within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, tick: Tick) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                tick().await;
            }
        });

        TimerHandle::new(cancelled, Some(task))
    }
}

/// Scheduler driven by hand from tests: ticks run only when [`fire`] is called.
///
/// [`fire`]: ManualScheduler::fire
#[cfg(test)]
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<std::sync::Mutex<Vec<(Duration, Arc<AtomicBool>, Tick)>>>,
}

#[cfg(test)]
impl ManualScheduler {
    pub fn pending(&self) -> usize {
        self.timers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cancelled, _)| !cancelled.load(Ordering::SeqCst))
            .count()
    }

    pub fn periods(&self) -> Vec<Duration> {
        self.timers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cancelled, _)| !cancelled.load(Ordering::SeqCst))
            .map(|(period, _, _)| *period)
            .collect()
    }

    /// Run every live timer once.
    pub async fn fire(&self) {
        let live: Vec<Tick> = self
            .timers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cancelled, _)| !cancelled.load(Ordering::SeqCst))
            .map(|(_, _, tick)| tick.clone())
            .collect();
        for tick in live {
            tick().await;
        }
    }
}

#[cfg(test)]
impl Scheduler for ManualScheduler {
    fn every(&self, period: Duration, tick: Tick) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers
            .lock()
            .unwrap()
            .push((period, cancelled.clone(), tick));
        TimerHandle::new(cancelled, None)
    }
}
