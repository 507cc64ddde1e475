//! Throughput of a running driver in positions (ticks) per second.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::driver::{DriverState, Monitor};

/// Samples are taken once per second, so per sample deltas are ticks per second
pub const PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    /// Positions advanced during the last second
    pub current: u64,
    /// Mean over all counted seconds
    pub average: u64,
    /// Number of counted periods
    pub periods: u64,
}

#[derive(Debug, Default)]
pub struct RateSampler {
    last_position: u64,
    advanced: u64,
    periods: u64,
}

impl RateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, position: u64) -> RateSample {
        let current = position.saturating_sub(self.last_position);
        self.last_position = position;
        self.periods += 1;
        self.advanced += current;

        RateSample {
            current,
            average: self.advanced / self.periods,
            periods: self.periods,
        }
    }
}

/// Samples the monitored driver once per [`PERIOD`] until it reaches a
/// terminal state or `cancel` fires. Seconds during which the driver is paused
/// are not counted.
///
/// Dropping the receiver does not stop the task, cancel the token for that.
pub fn spawn(
    monitor: Monitor,
    cancel: CancellationToken,
) -> (
    tokio::task::JoinHandle<()>,
    tokio::sync::mpsc::UnboundedReceiver<RateSample>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let handle = tokio::task::spawn(async move {
        let start = tokio::time::Instant::now() + PERIOD;
        let mut interval = tokio::time::interval_at(start, PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut sampler = RateSampler::new();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!("Rate sampler cancelled");
                    break;
                }

                _ = interval.tick() => {
                    let state = monitor.state();
                    if state.is_terminal() {
                        tracing::debug!(?state, "Driver finished, stopping rate sampler");
                        break;
                    }
                    if state == DriverState::Paused {
                        continue;
                    }

                    let sample = sampler.sample(monitor.position());
                    tracing::debug!(current = sample.current, average = sample.average, "Sampled rate");

                    let _ = tx.send(sample);
                }
            }
        }
    });

    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Control;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn running_average() {
        let mut sampler = RateSampler::new();

        assert_eq!(
            RateSample {
                current: 100,
                average: 100,
                periods: 1
            },
            sampler.sample(100)
        );
        assert_eq!(
            RateSample {
                current: 150,
                average: 125,
                periods: 2
            },
            sampler.sample(250)
        );
        assert_eq!(
            RateSample {
                current: 0,
                average: 83,
                periods: 3
            },
            sampler.sample(250)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn skips_paused_periods() {
        let control = Arc::new(Control::new());
        control.set_state(DriverState::Running);
        let monitor = Monitor::new(control.clone());

        let cancel = CancellationToken::new();
        let (handle, mut rx) = spawn(monitor, cancel.clone());

        control.set_position(100);
        let first = rx.recv().await.unwrap();
        assert_eq!(100, first.current);

        control.set_state(DriverState::Paused);
        control.set_position(300);
        let paused = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(paused.is_err());

        control.set_state(DriverState::Running);
        let resumed = rx.recv().await.unwrap();
        assert_eq!(
            RateSample {
                current: 200,
                average: 150,
                periods: 2
            },
            resumed
        );

        control.set_state(DriverState::Completed);
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn samples_once_per_second() {
        let control = Arc::new(Control::new());
        control.set_state(DriverState::Running);

        let cancel = CancellationToken::new();
        let (handle, mut rx) = spawn(Monitor::new(control.clone()), cancel.clone());

        let started = tokio::time::Instant::now();
        for (i, position) in [64u64, 192, 256].into_iter().enumerate() {
            control.set_position(position);
            rx.recv().await.unwrap();
            assert_eq!(PERIOD * (i as u32 + 1), started.elapsed());
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancel() {
        let control = Arc::new(Control::new());
        control.set_state(DriverState::Running);

        let cancel = CancellationToken::new();
        let (handle, _rx) = spawn(Monitor::new(control), cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
    }
}
