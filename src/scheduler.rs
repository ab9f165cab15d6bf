//! Fixed-rate timer that fires the monitoring cycle
//!
//! The timer loop runs on its own task and spawns every firing as a separate
//! task, so a slow or panicking cycle never delays the next tick. Firings are
//! tracked until they finish; stopping waits for them instead of cancelling.

use crate::error::SchedulerError;
use log::{debug, error, info};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Default period between firings
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Convert a configured number of seconds into a timer interval
///
/// Zero, negative and non-finite values are rejected.
pub fn interval_from_secs(seconds: f64) -> Result<Duration, SchedulerError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(SchedulerError::InvalidInterval(seconds.to_string()));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| SchedulerError::InvalidInterval(format!("{} ({})", seconds, e)))
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// When false, a firing that finds the previous cycle still running is skipped
    pub allow_overlap: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            allow_overlap: true,
        }
    }
}

/// Handle to a running timer loop
///
/// Must be started from within a tokio runtime.
pub struct Scheduler {
    interval: Duration,
    shutdown_sender: watch::Sender<bool>,
    timer_handle: Option<JoinHandle<()>>,
    firings: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl Scheduler {
    /// Fire `cycle` immediately and then every `interval`, allowing overlap
    pub fn start<F, Fut>(interval: Duration, cycle: F) -> Result<Self, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::start_with(interval, SchedulerOptions::default(), cycle)
    }

    /// Fire `cycle` immediately and then every `interval`
    pub fn start_with<F, Fut>(
        interval: Duration,
        options: SchedulerOptions,
        cycle: F,
    ) -> Result<Self, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(format!("{:?}", interval)));
        }

        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let firings = Arc::new(AtomicU64::new(0));
        let skipped = Arc::new(AtomicU64::new(0));
        let gate = (!options.allow_overlap).then(|| Arc::new(Semaphore::new(1)));

        let timer_handle = tokio::spawn(Self::run_timer(
            interval,
            cycle,
            gate,
            shutdown_receiver,
            firings.clone(),
            skipped.clone(),
        ));

        info!(
            "Scheduler started: interval={:?}, allow_overlap={}",
            interval, options.allow_overlap
        );

        Ok(Self {
            interval,
            shutdown_sender,
            timer_handle: Some(timer_handle),
            firings,
            skipped,
        })
    }

    async fn run_timer<F, Fut>(
        period: Duration,
        cycle: F,
        gate: Option<Arc<Semaphore>>,
        mut shutdown_receiver: watch::Receiver<bool>,
        firings: Arc<AtomicU64>,
        skipped: Arc<AtomicU64>,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                changed = shutdown_receiver.changed() => {
                    if changed.is_err() || *shutdown_receiver.borrow() {
                        debug!("Scheduler timer loop stopping");
                        break;
                    }
                }
                Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                    Self::report_finished(finished);
                }
                _ = ticker.tick() => {
                    let permit = match &gate {
                        Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                skipped.fetch_add(1, Ordering::Relaxed);
                                info!("Previous cycle still running, skipping this firing");
                                continue;
                            }
                        },
                        None => None,
                    };

                    let firing = firings.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!("Firing cycle #{}", firing);
                    let work = cycle();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        work.await;
                    });
                }
            }
        }

        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight cycle(s) to finish", in_flight.len());
        }
        while let Some(finished) = in_flight.join_next().await {
            Self::report_finished(finished);
        }
    }

    /// Log a firing that ended by panic or cancellation
    fn report_finished(finished: Result<(), JoinError>) {
        if let Err(e) = finished {
            if e.is_panic() {
                error!("Monitoring cycle panicked: {}", e);
            } else {
                error!("Monitoring cycle was aborted: {}", e);
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of firings started so far
    pub fn firings(&self) -> u64 {
        self.firings.load(Ordering::Relaxed)
    }

    /// Number of firings skipped by the overlap guard
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.timer_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Halt future firings and wait for the timer loop to exit
    ///
    /// The loop exits once every cycle already in flight has run to
    /// completion or failure; none is cancelled. Calling `stop` more than
    /// once is a no-op.
    pub async fn stop(&mut self) {
        let Some(handle) = self.timer_handle.take() else {
            return;
        };

        let _ = self.shutdown_sender.send(true);
        if let Err(e) = handle.await {
            error!("Scheduler timer loop ended abnormally: {}", e);
        }
        info!("Scheduler stopped after {} firings", self.firings());
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.timer_handle.is_some() {
            let _ = self.shutdown_sender.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_cycle(counter: Arc<AtomicUsize>) -> impl Fn() -> std::future::Ready<()> + Send + Sync {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[test]
    fn test_interval_from_secs() {
        assert_eq!(interval_from_secs(5.0).unwrap(), Duration::from_secs(5));
        assert_eq!(interval_from_secs(0.25).unwrap(), Duration::from_millis(250));

        assert!(interval_from_secs(0.0).is_err());
        assert!(interval_from_secs(-1.0).is_err());
        assert!(interval_from_secs(f64::NAN).is_err());
        assert!(interval_from_secs(f64::INFINITY).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_fixed_rate() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler =
            Scheduler::start(Duration::from_secs(1), counting_cycle(counter.clone())).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.stop().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let fired = counter.load(Ordering::SeqCst);
        assert!((4..=6).contains(&fired), "fired {} times", fired);
        assert_eq!(scheduler.firings() as usize, fired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_firing_is_immediate() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler =
            Scheduler::start(Duration::from_secs(60), counting_cycle(counter.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected_without_firing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let result = Scheduler::start(Duration::ZERO, counting_cycle(counter.clone()));
        assert!(matches!(result, Err(SchedulerError::InvalidInterval(_))));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_firing_after_stop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler =
            Scheduler::start(Duration::from_secs(1), counting_cycle(counter.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
        let fired = counter.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), fired);

        // Second stop is a no-op
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cycle_does_not_stop_later_firings() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cycle_counter = counter.clone();
        let mut scheduler = Scheduler::start(Duration::from_secs(1), move || {
            let n = cycle_counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    panic!("sensor exploded");
                }
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        scheduler.stop().await;

        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_firings_allowed_by_default() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        let mut scheduler = Scheduler::start(Duration::from_secs(1), move || {
            let (running, peak) = (r.clone(), p.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.stop().await;

        assert!(scheduler.firings() >= 4);
        assert!(peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlap_guard_skips_busy_firings() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        let mut scheduler = Scheduler::start_with(
            Duration::from_secs(1),
            SchedulerOptions {
                allow_overlap: false,
            },
            move || {
                let (running, peak) = (r.clone(), p.clone());
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2500)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(5500)).await;
        scheduler.stop().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(scheduler.skipped() >= 2);
        assert!(scheduler.firings() >= 2 && scheduler.firings() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_cycle() {
        let finished = Arc::new(AtomicUsize::new(0));
        let cycle_finished = finished.clone();
        let mut scheduler = Scheduler::start(Duration::from_secs(60), move || {
            let finished = cycle_finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        let before = tokio::time::Instant::now();
        scheduler.stop().await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(before.elapsed() >= Duration::from_millis(180));
        assert_eq!(scheduler.firings(), 1);
    }

    #[test]
    fn test_in_flight_cycle_survives_runtime_shutdown_after_stop() {
        let finished = Arc::new(AtomicUsize::new(0));
        let cycle_finished = finished.clone();
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async move {
            let mut scheduler = Scheduler::start(Duration::from_secs(60), move || {
                let finished = cycle_finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

            tokio::time::sleep(Duration::from_millis(20)).await;
            scheduler.stop().await;
        });
        drop(rt);

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
