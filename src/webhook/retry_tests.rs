//! Tests for `RetryPolicy`, `RetryState` and `RetryScheduler`.

use super::{IsRetryable, RetryError, RetryPolicy, RetryScheduler, RetryState, RetryStep};
use crate::time::{InstantSleeper, Sleeper};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failure type whose retryability is chosen by the test.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    retryable: bool,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failure (retryable: {})", self.retryable)
    }
}

impl IsRetryable for Failure {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

const TRANSIENT: Failure = Failure { retryable: true };
const TERMINAL: Failure = Failure { retryable: false };

/// Sleeper that records requested delays and returns immediately.
#[derive(Debug, Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(max_attempts)
        .with_initial_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_millis(1000))
        .with_multiplier(2.0)
}

mod retry_policy {
    use super::*;

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();

        assert_eq!(policy, RetryPolicy::new());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    #[should_panic(expected = "max_attempts must be at least 1")]
    fn with_max_attempts_zero_panics() {
        let _ = RetryPolicy::new().with_max_attempts(0);
    }

    #[test]
    #[should_panic(expected = "multiplier must be at least 1.0")]
    fn shrinking_multiplier_panics() {
        let _ = RetryPolicy::new().with_multiplier(0.5);
    }

    #[test]
    #[should_panic(expected = "multiplier must be at least 1.0")]
    fn non_finite_multiplier_panics() {
        let _ = RetryPolicy::new().with_multiplier(f64::NAN);
    }

    #[test]
    fn delays_grow_geometrically_until_capped() {
        let policy = policy(10);

        let delays: Vec<_> = (0..6).map(|n| policy.delay_for_retry(n)).collect();

        assert_eq!(
            delays,
            [100, 200, 400, 800, 1000, 1000].map(Duration::from_millis)
        );
    }

    #[test]
    fn delays_are_monotonic_and_bounded() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(37))
            .with_max_delay(Duration::from_secs(7))
            .with_multiplier(1.7);

        let mut previous = Duration::ZERO;
        for n in 0..64 {
            let delay = policy.delay_for_retry(n);
            assert!(delay >= previous, "delay({n}) decreased");
            assert!(delay <= policy.max_delay, "delay({n}) exceeds cap");
            previous = delay;
        }
    }

    #[test]
    fn huge_retry_numbers_cap_at_max() {
        let policy = policy(3);

        assert_eq!(policy.delay_for_retry(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn zero_initial_delay_stays_zero() {
        let policy = policy(3).with_initial_delay(Duration::ZERO);

        assert_eq!(policy.delay_for_retry(0), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(5000), Duration::ZERO);
    }

    #[test]
    fn zero_initial_delay_survives_overflowing_growth() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::ZERO)
            .with_max_delay(Duration::from_secs(30))
            .with_multiplier(10.0);

        assert_eq!(policy.delay_for_retry(400), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(u32::MAX), Duration::ZERO);
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = policy(3);

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::new().with_max_attempts(1).should_retry(1));
    }
}

mod retry_state {
    use super::*;

    #[test]
    fn walks_through_waits_then_exhausts() {
        let policy = policy(3);
        let mut state = RetryState::new(&policy);

        assert_eq!(state.begin_attempt(), 1);
        assert_eq!(
            state.after_failure(true),
            RetryStep::Wait(Duration::from_millis(100))
        );
        assert_eq!(state.begin_attempt(), 2);
        assert_eq!(
            state.after_failure(true),
            RetryStep::Wait(Duration::from_millis(200))
        );
        assert_eq!(state.begin_attempt(), 3);
        assert_eq!(state.after_failure(true), RetryStep::Exhausted);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn terminal_failure_aborts_immediately() {
        let policy = policy(5);
        let mut state = RetryState::new(&policy);

        state.begin_attempt();
        assert_eq!(state.after_failure(false), RetryStep::Abort);
    }
}

mod scheduler {
    use super::*;

    #[tokio::test]
    async fn always_failing_operation_runs_exactly_max_attempts() {
        let scheduler = RetryScheduler::with_sleeper(InstantSleeper);
        let mut calls = 0;

        let result: Result<(), _> = scheduler
            .execute(
                &policy(4),
                &CancellationToken::new(),
                |_| {
                    calls += 1;
                    async { Err(TRANSIENT) }
                },
                |_| {},
            )
            .await;

        assert_eq!(calls, 4);
        match result {
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, TRANSIENT);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_failure_stops_after_one_attempt() {
        let scheduler = RetryScheduler::with_sleeper(InstantSleeper);
        let mut calls = 0;

        let result: Result<(), _> = scheduler
            .execute(
                &policy(5),
                &CancellationToken::new(),
                |_| {
                    calls += 1;
                    async { Err(TERMINAL) }
                },
                |_| {},
            )
            .await;

        assert_eq!(calls, 1);
        assert!(matches!(
            result,
            Err(RetryError::Aborted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_and_sleeps_between() {
        let scheduler = RetryScheduler::with_sleeper(RecordingSleeper::default());

        let result = scheduler
            .execute(
                &policy(5),
                &CancellationToken::new(),
                |attempt| async move {
                    if attempt < 3 {
                        Err(TRANSIENT)
                    } else {
                        Ok(attempt * 10)
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(result.unwrap(), 30);
        assert_eq!(
            scheduler.sleeper().delays(),
            [100, 200].map(Duration::from_millis)
        );
    }

    #[tokio::test]
    async fn no_sleep_after_final_attempt() {
        let scheduler = RetryScheduler::with_sleeper(RecordingSleeper::default());

        let _: Result<(), _> = scheduler
            .execute(
                &policy(3),
                &CancellationToken::new(),
                |_| async { Err(TRANSIENT) },
                |_| {},
            )
            .await;

        assert_eq!(scheduler.sleeper().delays().len(), 2);
    }

    #[tokio::test]
    async fn observer_sees_every_attempt_in_order() {
        let scheduler = RetryScheduler::with_sleeper(InstantSleeper);
        let mut seen = Vec::new();

        let result = scheduler
            .execute(
                &policy(3),
                &CancellationToken::new(),
                |attempt| async move { if attempt == 1 { Err(TRANSIENT) } else { Ok("done") } },
                |report| seen.push((report.attempt, report.outcome.is_ok())),
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(seen, [(1, false), (2, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_timed_with_tokio_clock() {
        let scheduler = RetryScheduler::new();
        let mut durations = Vec::new();

        let _ = scheduler
            .execute(
                &policy(1),
                &CancellationToken::new(),
                |_| async {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    Ok::<_, Failure>(())
                },
                |report| durations.push(report.duration),
            )
            .await;

        assert_eq!(durations.len(), 1);
        assert!(durations[0] >= Duration::from_millis(250));
        assert!(durations[0] < Duration::from_millis(260));
    }

    #[tokio::test(start_paused = true)]
    async fn real_delays_follow_policy() {
        let scheduler = RetryScheduler::new();
        let started = tokio::time::Instant::now();

        let _: Result<(), _> = scheduler
            .execute(
                &policy(4),
                &CancellationToken::new(),
                |_| async { Err(TRANSIENT) },
                |_| {},
            )
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(710), "waited {elapsed:?}");
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_prevents_first_attempt() {
        let scheduler = RetryScheduler::with_sleeper(InstantSleeper);
        let token = CancellationToken::new();
        token.cancel();
        let mut calls = 0;

        let result: Result<(), _> = scheduler
            .execute(
                &policy(3),
                &token,
                |_| {
                    calls += 1;
                    async { Err(TRANSIENT) }
                },
                |_| {},
            )
            .await;

        assert_eq!(calls, 0);
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_stops_retrying() {
        let scheduler = RetryScheduler::new();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let mut calls = 0;

        let result: Result<(), _> = scheduler
            .execute(
                &policy(3),
                &token,
                |_| {
                    calls += 1;
                    async { Err(TRANSIENT) }
                },
                |_| {},
            )
            .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_attempt() {
        let scheduler = RetryScheduler::new();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let mut reports = 0;

        let result = scheduler
            .execute(
                &policy(3),
                &token,
                |_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, Failure>(())
                },
                |_| reports += 1,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert_eq!(reports, 0);
    }
}
