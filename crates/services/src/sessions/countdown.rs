use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use super::machine::SessionTick;
use super::timer::TimerGeneration;
use super::workflow::SessionRuntime;

/// Background task feeding one-second ticks to the runtime's timer.
///
/// The expiring tick finishes the session under the machine lock; the
/// submission then runs in its own task, so cancelling the countdown can
/// never interrupt it.
pub(crate) struct Countdown {
    handle: JoinHandle<()>,
}

impl Countdown {
    pub(crate) fn spawn(
        runtime: SessionRuntime,
        generation: TimerGeneration,
        period: Duration,
    ) -> Self {
        let handle = tokio::spawn(run(runtime, generation, period));
        Self { handle }
    }

    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}

async fn run(runtime: SessionRuntime, generation: TimerGeneration, period: Duration) {
    let mut ticks = interval_at(Instant::now() + period, period);
    loop {
        ticks.tick().await;
        match runtime.tick(generation) {
            SessionTick::Running { remaining } => {
                tracing::trace!(remaining, "countdown tick");
            }
            SessionTick::Expired(ticket) => {
                tokio::spawn(async move {
                    if let Err(err) = runtime.submit(ticket).await {
                        tracing::error!(error = %err, "expiry submission could not settle");
                    }
                });
                return;
            }
            SessionTick::Ignored => return,
        }
    }
}
