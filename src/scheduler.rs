//! Fixed-cadence tick scheduler
//!
//! Calls [`GridController::tick`] on a fixed interval until a tick limit is
//! reached, shutdown is requested, or (optionally) too many consecutive ticks
//! were skipped. There is no backoff: a failed tick waits exactly one interval
//! like any other.
//!
//! Time is injected through [`Clock`] so the loop can run deterministically
//! in tests and in fast replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::controller::{GridController, TickOutcome};
use crate::error::GatewayError;
use crate::gateway::MarketGateway;

pub trait Clock {
    fn sleep(&mut self, duration: Duration);
}

/// Wall-clock sleeping on the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Clock that only records how long it was asked to sleep
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed: Duration,
    sleeps: usize,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps
    }
}

impl Clock for ManualClock {
    fn sleep(&mut self, duration: Duration) {
        self.elapsed += duration;
        self.sleeps += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Stop after this many ticks. `None` runs until shutdown.
    pub max_ticks: Option<u64>,
    /// Escalate after this many consecutive skipped ticks. `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_ticks: None,
            max_consecutive_failures: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    MaxTicks,
    Shutdown,
    TooManyFailures { consecutive: u32, last: GatewayError },
}

/// Totals over one scheduler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub completed: u64,
    pub skipped: u64,
    pub fills: usize,
    pub stops_moved: usize,
    pub failures: usize,
    pub stop_reason: StopReason,
}

pub struct Scheduler<C: Clock> {
    clock: C,
    config: SchedulerConfig,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, config: SchedulerConfig) -> Self {
        Self { clock, config }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn run<G: MarketGateway + ?Sized>(
        &mut self,
        controller: &mut GridController,
        gateway: &mut G,
        shutdown: &AtomicBool,
    ) -> RunSummary {
        let mut ticks = 0u64;
        let mut completed = 0u64;
        let mut skipped = 0u64;
        let mut fills = 0usize;
        let mut stops_moved = 0usize;
        let mut failures = 0usize;
        let mut consecutive = 0u32;

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            max_ticks = ?self.config.max_ticks,
            "Starting tick loop"
        );

        let stop_reason = loop {
            if shutdown.load(Ordering::SeqCst) {
                break StopReason::Shutdown;
            }
            if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                break StopReason::MaxTicks;
            }

            let outcome = controller.tick(gateway);
            ticks += 1;

            match outcome {
                TickOutcome::Completed(report) => {
                    completed += 1;
                    consecutive = 0;
                    fills += report.dispatch.fills.len();
                    stops_moved += report.stops.moved.len();
                    failures += report.failure_count();
                }
                TickOutcome::Skipped { tick, reason } => {
                    skipped += 1;
                    failures += 1;
                    consecutive += 1;
                    warn!(tick, consecutive, kind = reason.kind(), "Tick skipped");

                    if let Some(limit) = self.config.max_consecutive_failures {
                        if consecutive >= limit {
                            error!(consecutive, error = %reason, "Too many consecutive failed ticks, stopping");
                            break StopReason::TooManyFailures {
                                consecutive,
                                last: reason,
                            };
                        }
                    }
                }
            }

            if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                continue;
            }
            self.clock.sleep(self.config.interval);
        };

        let summary = RunSummary {
            ticks,
            completed,
            skipped,
            fills,
            stops_moved,
            failures,
            stop_reason,
        };
        info!(
            ticks = summary.ticks,
            completed = summary.completed,
            skipped = summary.skipped,
            fills = summary.fills,
            stops_moved = summary.stops_moved,
            failures = summary.failures,
            reason = ?summary.stop_reason,
            "Tick loop finished"
        );
        summary
    }
}
