use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::AutomationError;

/// Boxed result of one readiness probe, borrowing the probed subject.
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<bool, AutomationError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("condition not met within {0:?}")]
    TimedOut(Duration),

    #[error("wait cancelled")]
    Cancelled,

    #[error(transparent)]
    Probe(AutomationError),
}

/// Poll `check` against `subject` until it reports `true`.
///
/// The condition is checked immediately, then every `policy.interval` until
/// `policy.timeout` elapses. Cancellation is observed between probes and while
/// sleeping; a probe error ends the wait at once.
pub async fn wait_until<S, F>(
    subject: &mut S,
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<(), WaitError>
where
    S: ?Sized + Send,
    F: for<'a> FnMut(&'a mut S) -> ProbeFuture<'a> + Send,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        if check(subject).await.map_err(WaitError::Probe)? {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::TimedOut(policy.timeout));
        }
        let nap = policy.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        polls: u32,
        ready_after: u32,
    }

    fn probe(counter: &mut Counter) -> ProbeFuture<'_> {
        Box::pin(async move {
            counter.polls += 1;
            Ok(counter.polls >= counter.ready_after)
        })
    }

    fn policy() -> WaitPolicy {
        WaitPolicy::new(Duration::from_secs(10), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_condition_holds() {
        let mut counter = Counter {
            polls: 0,
            ready_after: 3,
        };
        let started = Instant::now();
        wait_until(&mut counter, policy(), &CancellationToken::new(), probe)
            .await
            .unwrap();
        assert_eq!(counter.polls, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_policy_timeout() {
        let mut counter = Counter {
            polls: 0,
            ready_after: u32::MAX,
        };
        let started = Instant::now();
        let err = wait_until(&mut counter, policy(), &CancellationToken::new(), probe)
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::TimedOut(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(counter.polls, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let mut counter = Counter {
            polls: 0,
            ready_after: u32::MAX,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = wait_until(&mut counter, policy(), &cancel, probe)
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Cancelled));
        assert_eq!(counter.polls, 3);
    }

    #[tokio::test]
    async fn probe_errors_end_the_wait() {
        let mut unit = ();
        let err = wait_until(&mut unit, policy(), &CancellationToken::new(), |_| {
            Box::pin(async { Err(AutomationError::Driver("bridge exited".into())) })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, WaitError::Probe(AutomationError::Driver(_))));
    }
}
