use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs a job periodically in a background task until shut down.
/// At most one invocation of the job runs at any time: if an invocation
/// overruns the period, the missed ticks are skipped.
/// A panicking invocation is logged, the next one still happens.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    grace: Duration,
}

impl Scheduler {
    /// The first invocation happens right away.
    pub fn start<F, Fut>(period: Duration, grace: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        log::debug!("Scheduler received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(panic) = AssertUnwindSafe(job()).catch_unwind().await {
                            log::error!("Scheduled job panicked: {}", panic_message(&*panic));
                        }
                    }
                }
            }
        });

        Scheduler {
            shutdown_tx,
            handle,
            grace,
        }
    }

    /// Stop scheduling new invocations and wait for the one in flight,
    /// if any, for at most the grace period. Past that it is abandoned.
    pub async fn shutdown(self) {
        // the receiver only goes away if the task is already done
        let _ = self.shutdown_tx.send(true);

        let mut handle = self.handle;
        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(Ok(())) => log::debug!("Scheduler stopped"),
            Ok(Err(err)) => log::error!("Scheduler task failed: {err}"),
            Err(_) => {
                log::warn!(
                    "Scheduled job still running after {:?}, abandoning it",
                    self.grace
                );
                handle.abort();
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    fn counting_job(
        count: Arc<AtomicUsize>,
        duration: Duration,
    ) -> impl Fn() -> futures::future::BoxFuture<'static, ()> + Send + 'static {
        move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(duration).await;
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_right_away_then_every_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::start(
            5 * MINUTE,
            Duration::from_secs(1),
            counting_job(count.clone(), Duration::ZERO),
        );

        tokio::time::sleep(10 * MINUTE + Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3, "at 0, 5 and 10 minutes");
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_after_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::start(
            MINUTE,
            Duration::from_secs(1),
            counting_job(count.clone(), Duration::ZERO),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.shutdown().await;
        let after_shutdown = count.load(Ordering::SeqCst);
        assert_eq!(after_shutdown, 1);

        tokio::time::sleep(10 * MINUTE).await;
        assert_eq!(count.load(Ordering::SeqCst), after_shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_the_job_in_flight() {
        let done = Arc::new(AtomicUsize::new(0));
        let job_done = done.clone();
        let scheduler = Scheduler::start(MINUTE, Duration::from_secs(30), move || {
            let done = job_done.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1, "the job got to finish");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_job_is_abandoned_after_grace() {
        let done = Arc::new(AtomicUsize::new(0));
        let job_done = done.clone();
        let scheduler = Scheduler::start(MINUTE, Duration::from_secs(5), move || {
            let done = job_done.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        scheduler.shutdown().await;
        assert!(started.elapsed() <= Duration::from_secs(6));

        tokio::time::sleep(2 * Duration::from_secs(3600)).await;
        assert_eq!(done.load(Ordering::SeqCst), 0, "the job was aborted");
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_job_does_not_stop_the_scheduler() {
        let count = Arc::new(AtomicUsize::new(0));
        let job_count = count.clone();
        let scheduler = Scheduler::start(MINUTE, Duration::from_secs(1), move || {
            let count = job_count.clone();
            async move {
                let n = count.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 {
                    panic!("job number {n} blew up");
                }
            }
        });

        tokio::time::sleep(10 * MINUTE + Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 11, "kept running after panics");

        let started = tokio::time::Instant::now();
        scheduler.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(1), "stopped cleanly");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let msg = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*msg), "static");
        let msg = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(&*msg), "formatted 42");
    }

    #[tokio::test(start_paused = true)]
    async fn invocations_never_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let count = Arc::new(AtomicUsize::new(0));

        let (job_in_flight, job_max, job_count) =
            (in_flight.clone(), max_in_flight.clone(), count.clone());
        let scheduler = Scheduler::start(MINUTE, Duration::from_secs(1), move || {
            let (in_flight, max, count) = (job_in_flight.clone(), job_max.clone(), job_count.clone());
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                count.fetch_add(1, Ordering::SeqCst);
                // each run takes two and a half periods
                tokio::time::sleep(2 * MINUTE + MINUTE / 2).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(10 * MINUTE).await;
        scheduler.shutdown().await;

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        let runs = count.load(Ordering::SeqCst);
        assert!(runs >= 3 && runs <= 4, "missed ticks are skipped, got {runs} runs");
    }
}
