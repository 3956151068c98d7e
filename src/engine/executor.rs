//! Bounded, deadline-enforcing scanner execution
//!
//! Shared by the engine, the stress sampler and the live monitor. Each
//! scanner runs in its own task so a panic surfaces as a `JoinError` at the
//! boundary instead of tearing down the caller.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{EngineError, ScanError};
use crate::result::ScanResult;
use crate::scanner::{ExecutionContext, ScanContext, ScanOutcome, Scanner};
use crate::severity::Severity;
use crate::thresholds::ThresholdPolicy;

/// Progress notification for callers rendering a run
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started {
        scanner: String,
    },
    Finished {
        scanner: String,
        severity: Severity,
        duration: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct Executor {
    policy: Arc<ThresholdPolicy>,
    permits: Arc<Semaphore>,
    default_timeout: Duration,
    grace: Duration,
    timeout_cap: Option<Duration>,
    exec: ExecutionContext,
    events: Option<broadcast::Sender<ScanEvent>>,
}

impl Executor {
    pub fn new(
        policy: Arc<ThresholdPolicy>,
        workers: usize,
        default_timeout: Duration,
        grace: Duration,
        exec: ExecutionContext,
    ) -> Self {
        Self {
            policy,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            default_timeout,
            grace,
            timeout_cap: None,
            exec,
            events: None,
        }
    }

    /// Never let a scanner run longer than `cap`, whatever it declares
    pub fn with_timeout_cap(mut self, cap: Duration) -> Self {
        self.timeout_cap = Some(cap);
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<ScanEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &Arc<ThresholdPolicy> {
        &self.policy
    }

    /// Refuse further work; later calls to [`Executor::run_all`] fail
    pub fn close(&self) {
        self.permits.close();
    }

    /// Run `scanners` under the worker cap.
    ///
    /// Results come back in the order of `scanners`, regardless of which
    /// finished first. Only a closed worker pool fails the call.
    pub async fn run_all(
        &self,
        scanners: &[Arc<dyn Scanner>],
    ) -> Result<Vec<ScanResult>, EngineError> {
        let mut handles: Vec<JoinHandle<ScanResult>> = Vec::with_capacity(scanners.len());

        for scanner in scanners {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    handles.iter().for_each(JoinHandle::abort);
                    return Err(EngineError::WorkerPool(e.to_string()));
                }
            };

            let executor = self.clone();
            let scanner = scanner.clone();
            handles.push(tokio::spawn(async move {
                let result = executor.run_single(scanner).await;
                drop(permit);
                result
            }));
        }

        let joined = join_all(handles).await;

        Ok(joined
            .into_iter()
            .zip(scanners)
            .map(|(joined, scanner)| match joined {
                Ok(result) => result,
                Err(e) => ScanResult::from_outcome(
                    scanner.name(),
                    scanner.groups(),
                    Err(ScanError::from(e)),
                    &self.policy,
                    Duration::ZERO,
                ),
            })
            .collect())
    }

    /// Run one scanner under the worker cap
    pub async fn run_one(&self, scanner: Arc<dyn Scanner>) -> Result<ScanResult, EngineError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;

        Ok(self.run_single(scanner).await)
    }

    /// Run one scanner under its deadline, bypassing the worker cap
    pub async fn run_single(&self, scanner: Arc<dyn Scanner>) -> ScanResult {
        let name = scanner.name().to_string();
        let budget = self.budget(scanner.as_ref());

        self.emit(ScanEvent::Started {
            scanner: name.clone(),
        });
        trace!("{name}: starting with budget {budget:?}");

        let ctx = ScanContext::new(self.exec);
        let cancel = ctx.cancel.clone();
        let start = Instant::now();

        let worker = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.run(ctx).await })
        };

        let outcome = await_with_deadline(&name, worker, cancel, budget, self.grace).await;
        let duration = start.elapsed();

        if let Err(e) = &outcome {
            debug!("{name}: failed after {duration:?}: {e}");
        }

        let result =
            ScanResult::from_outcome(name, scanner.groups(), outcome, &self.policy, duration);

        self.emit(ScanEvent::Finished {
            scanner: result.scanner_name().to_string(),
            severity: result.severity(),
            duration,
        });

        result
    }

    fn budget(&self, scanner: &dyn Scanner) -> Duration {
        let declared = scanner.timeout().unwrap_or(self.default_timeout);
        match self.timeout_cap {
            Some(cap) => declared.min(cap),
            None => declared,
        }
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(events) = &self.events {
            // no subscribers is fine
            let _ = events.send(event);
        }
    }
}

/// Wait for `worker` for at most `budget`.
///
/// On expiry the invocation's token is cancelled and the worker gets `grace`
/// to wind down before it is aborted. Either way the outcome is `Timeout`.
pub(crate) async fn await_with_deadline(
    name: &str,
    mut worker: JoinHandle<ScanOutcome>,
    cancel: CancellationToken,
    budget: Duration,
    grace: Duration,
) -> ScanOutcome {
    match timeout(budget, &mut worker).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!("{name}: scanner task failed: {e}");
            Err(ScanError::from(e))
        }
        Err(_) => {
            warn!("{name}: timed out after {budget:?}, cancelling");
            cancel.cancel();

            if timeout(grace, &mut worker).await.is_err() {
                warn!("{name}: ignored cancellation for {grace:?}, aborting");
                worker.abort();
            }

            Err(ScanError::Timeout(budget))
        }
    }
}
