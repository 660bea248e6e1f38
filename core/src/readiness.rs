//! Readiness probing for a freshly provisioned service

use tokio::time::Instant;

use crate::cancel::CancellationFlag;
use crate::config::ReadinessConfig;
use crate::traits::{HealthProbe, ProbeOutcome};

/// Outcome of waiting for readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The service answered successfully on the given attempt
    Ready {
        /// Probes issued, including the successful one
        attempts: u32,
    },
    /// The timeout elapsed first
    TimedOut {
        /// Probes issued
        attempts: u32,
    },
    /// Cancellation was observed
    Cancelled,
}

impl Readiness {
    /// Whether the service became ready
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

/// Poll `probe` until it reports ready, the timeout elapses, or `cancel` is set
///
/// Cancellation is checked before every probe and raced against both the
/// probe itself and the wait between probes. A probe that hangs is cut off
/// when the overall timeout elapses. Connection failures are expected while
/// the service boots and are retried silently; other failures are logged
/// and retried.
pub async fn wait_ready(
    probe: &dyn HealthProbe,
    config: &ReadinessConfig,
    cancel: &CancellationFlag,
) -> Readiness {
    tracing::info!(
        endpoint = probe.endpoint(),
        timeout_secs = config.timeout.as_secs_f64(),
        "Waiting for service to become ready"
    );

    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            tracing::info!("Waiting for service was interrupted");
            return Readiness::Cancelled;
        }
        if start.elapsed() >= config.timeout {
            tracing::error!(
                endpoint = probe.endpoint(),
                attempts,
                "Service did not become ready within {:.0} seconds",
                config.timeout.as_secs_f64()
            );
            return Readiness::TimedOut { attempts };
        }

        attempts += 1;
        let remaining = config.timeout.saturating_sub(start.elapsed());
        let outcome = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!("Waiting for service was interrupted");
                return Readiness::Cancelled;
            }

            outcome = tokio::time::timeout(remaining, probe.probe()) => outcome,
        };
        let Ok(outcome) = outcome else {
            tracing::error!(
                endpoint = probe.endpoint(),
                attempts,
                "Service did not answer within {:.0} seconds",
                config.timeout.as_secs_f64()
            );
            return Readiness::TimedOut { attempts };
        };

        match outcome {
            ProbeOutcome::Ready => {
                tracing::info!(
                    attempts,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "Service is ready"
                );
                return Readiness::Ready { attempts };
            }
            ProbeOutcome::ConnectionFailed(reason) => {
                tracing::trace!(attempt = attempts, %reason, "Service not reachable yet");
            }
            ProbeOutcome::NotReady(reason) => {
                tracing::debug!(attempt = attempts, %reason, "Service not ready yet");
            }
            ProbeOutcome::Error(reason) => {
                tracing::warn!(attempt = attempts, %reason, "Readiness probe failed");
            }
        }

        let pause = config
            .interval
            .min(config.timeout.saturating_sub(start.elapsed()));
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!("Waiting for service was interrupted");
                return Readiness::Cancelled;
            }

            _ = tokio::time::sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Probe that fails with the given outcome until `ready_on`
    struct ScriptedProbe {
        ready_on: Option<u32>,
        failure: ProbeOutcome,
        calls: AtomicU32,
        cancel_on: Option<(u32, CancellationFlag)>,
    }

    impl ScriptedProbe {
        fn ready_on(n: u32) -> Self {
            Self {
                ready_on: Some(n),
                failure: ProbeOutcome::ConnectionFailed("connection refused".into()),
                calls: AtomicU32::new(0),
                cancel_on: None,
            }
        }

        fn never(failure: ProbeOutcome) -> Self {
            Self {
                ready_on: None,
                failure,
                calls: AtomicU32::new(0),
                cancel_on: None,
            }
        }

        fn cancel_on(mut self, n: u32, flag: CancellationFlag) -> Self {
            self.cancel_on = Some((n, flag));
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        fn endpoint(&self) -> &str {
            "http://localhost:6333/collections"
        }

        async fn probe(&self) -> ProbeOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((n, flag)) = &self.cancel_on {
                if call == *n {
                    flag.cancel();
                }
            }
            match self.ready_on {
                Some(n) if call >= n => ProbeOutcome::Ready,
                _ => self.failure.clone(),
            }
        }
    }

    /// Probe whose request never answers in time
    struct HangingProbe {
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HealthProbe for HangingProbe {
        fn endpoint(&self) -> &str {
            "http://localhost:6333/collections"
        }

        async fn probe(&self) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            ProbeOutcome::Ready
        }
    }

    fn config(timeout_secs: u64) -> ReadinessConfig {
        ReadinessConfig {
            timeout: Duration::from_secs(timeout_secs),
            interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_poll() {
        let probe = ScriptedProbe::ready_on(3);
        let cancel = CancellationFlag::new();

        let start = Instant::now();
        let result = wait_ready(&probe, &config(60), &cancel).await;

        assert_eq!(result, Readiness::Ready { attempts: 3 });
        assert_eq!(probe.calls(), 3);
        // Two full intervals waited, never a third
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let probe = ScriptedProbe::ready_on(1);
        let result = wait_ready(&probe, &config(60), &CancellationFlag::new()).await;
        assert_eq!(result, Readiness::Ready { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let probe = ScriptedProbe::never(ProbeOutcome::NotReady("503".into()));
        let result = wait_ready(&probe, &config(5), &CancellationFlag::new()).await;

        match result {
            Readiness::TimedOut { attempts } => {
                assert_eq!(attempts, probe.calls());
                assert!((5..=6).contains(&attempts));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_errors_are_retried() {
        let probe = ScriptedProbe {
            failure: ProbeOutcome::Error("unexpected body".into()),
            ..ScriptedProbe::ready_on(2)
        };
        let result = wait_ready(&probe, &config(60), &CancellationFlag::new()).await;
        assert_eq!(result, Readiness::Ready { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_probe() {
        let probe = ScriptedProbe::ready_on(1);
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result = wait_ready(&probe, &config(60), &cancel).await;

        assert_eq!(result, Readiness::Cancelled);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_interval() {
        let cancel = CancellationFlag::new();
        let probe = Arc::new(ScriptedProbe::never(ProbeOutcome::ConnectionFailed(
            "refused".into(),
        )));
        let config = ReadinessConfig {
            timeout: Duration::from_secs(600),
            interval: Duration::from_secs(30),
        };

        let handle = {
            let probe = Arc::clone(&probe);
            let cancel = cancel.clone();
            tokio::spawn(async move { wait_ready(probe.as_ref(), &config, &cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = Instant::now();
        cancel.cancel();
        let result = handle.await.unwrap();

        assert_eq!(result, Readiness::Cancelled);
        assert_eq!(probe.calls(), 1);
        assert!(before.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_probe_skips_wait() {
        let cancel = CancellationFlag::new();
        let probe = ScriptedProbe::never(ProbeOutcome::ConnectionFailed("refused".into()))
            .cancel_on(2, cancel.clone());

        let start = Instant::now();
        let result = wait_ready(&probe, &config(60), &cancel).await;

        assert_eq!(result, Readiness::Cancelled);
        assert_eq!(probe.calls(), 2);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_is_cut_off_at_timeout() {
        let probe = HangingProbe {
            delay: Duration::from_secs(60),
            calls: AtomicU32::new(0),
        };

        let start = Instant::now();
        let result = wait_ready(&probe, &config(5), &CancellationFlag::new()).await;

        assert_eq!(result, Readiness::TimedOut { attempts: 1 });
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5));
        assert!(waited < Duration::from_secs(6), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hanging_probe() {
        let cancel = CancellationFlag::new();
        let probe = Arc::new(HangingProbe {
            delay: Duration::from_secs(60),
            calls: AtomicU32::new(0),
        });

        let handle = {
            let probe = Arc::clone(&probe);
            let cancel = cancel.clone();
            tokio::spawn(async move { wait_ready(probe.as_ref(), &config(600), &cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        let before = Instant::now();
        cancel.cancel();
        let result = handle.await.unwrap();

        assert_eq!(result, Readiness::Cancelled);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_between_probes_stops_at_timeout() {
        let probe = ScriptedProbe::never(ProbeOutcome::NotReady("503".into()));
        let config = ReadinessConfig {
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(30),
        };

        let start = Instant::now();
        let result = wait_ready(&probe, &config, &CancellationFlag::new()).await;

        assert_eq!(result, Readiness::TimedOut { attempts: 1 });
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5));
        assert!(waited < Duration::from_secs(6), "waited {waited:?}");
    }
}
