//! Single-shot background tasks.
//!
//! A [`BackgroundTask`] runs one lifecycle operation at most once. Starting
//! it again is a no-op; joining it again after completion returns
//! immediately. A failure is captured as a [`ClusterError`] and handed to the
//! first joiner, then cleared. Unless a joiner has silenced the task, the
//! failure is also logged when it happens.

use std::error::Error as StdError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::error::{ClusterError, ClusterResult, Operation, ProvisionError, ProvisionResult};

/// Lifecycle of a [`BackgroundTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Never started.
    NotStarted,
    /// Body is executing.
    Running,
    /// Body finished, successfully or not.
    Completed,
}

/// A lazily started, run-once background operation.
#[derive(Debug)]
pub struct BackgroundTask {
    operation: Operation,
    phase: watch::Sender<TaskPhase>,
    error: Mutex<Option<ClusterError>>,
    silent: AtomicBool,
}

impl BackgroundTask {
    /// Create a task that has not started yet.
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        let (phase, _) = watch::channel(TaskPhase::NotStarted);
        Self {
            operation,
            phase,
            error: Mutex::new(None),
            silent: AtomicBool::new(false),
        }
    }

    /// Operation this task performs.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TaskPhase {
        *self.phase.borrow()
    }

    /// Check whether the body is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase() == TaskPhase::Running
    }

    /// Stop logging failures; a joiner will receive them instead.
    pub fn silence(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    /// Start `body` on the runtime unless the task was started before.
    ///
    /// `on_failure` runs once if the body fails or panics. Returns whether
    /// this call started the task.
    pub fn start<F, R>(self: &Arc<Self>, body: F, on_failure: R) -> bool
    where
        F: Future<Output = ProvisionResult<()>> + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let started = self.phase.send_if_modified(|phase| {
            if *phase == TaskPhase::NotStarted {
                *phase = TaskPhase::Running;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(operation = %self.operation, "task already started");
            return false;
        }

        let task = Arc::clone(self);
        tokio::spawn(async move {
            // The body runs in its own task so a panic surfaces as a JoinError.
            let outcome = match tokio::spawn(body).await {
                Ok(outcome) => outcome,
                Err(e) => Err(ProvisionError::Interrupted(e.to_string())),
            };

            if let Err(source) = outcome {
                on_failure();
                task.capture(source);
            }
            task.phase.send_replace(TaskPhase::Completed);
        });

        true
    }

    fn capture(&self, source: ProvisionError) {
        let err = match self.operation {
            Operation::Spawn => ClusterError::CannotSpawn { source },
            Operation::Destroy => ClusterError::CannotDestroy { source },
        };

        if !self.silent.load(Ordering::SeqCst) {
            error!(
                operation = %self.operation,
                error = %error_chain(&err),
                "background cluster operation failed"
            );
        }

        *self.error.lock() = Some(err);
    }

    /// Wait for the task to finish and take its captured error.
    ///
    /// Returns immediately if the task never started or already completed.
    pub async fn join(&self) -> ClusterResult<()> {
        let mut phase = self.phase.subscribe();
        phase
            .wait_for(|p| *p != TaskPhase::Running)
            .await
            .map_err(|_| ClusterError::internal("task phase channel closed"))?;

        match self.error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Render an error with its whole source chain.
fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::Registry;

    use super::*;

    fn failure() -> ProvisionError {
        ProvisionError::invalid_output("nothing printed")
    }

    async fn succeed() -> ProvisionResult<()> {
        Ok(())
    }

    async fn fail() -> ProvisionResult<()> {
        Err(failure())
    }

    async fn crash() -> ProvisionResult<()> {
        panic!("tool crashed")
    }

    #[tokio::test]
    async fn join_before_start_is_ok() {
        let task = BackgroundTask::new(Operation::Spawn);
        assert_eq!(task.phase(), TaskPhase::NotStarted);
        task.join().await.unwrap();
    }

    #[tokio::test]
    async fn runs_body_once() {
        let task = Arc::new(BackgroundTask::new(Operation::Spawn));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            task.start(
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProvisionError>(())
                },
                || {},
            );
        }
        task.join().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(task.phase(), TaskPhase::Completed);
    }

    #[tokio::test]
    async fn error_is_delivered_once() {
        let task = Arc::new(BackgroundTask::new(Operation::Destroy));
        task.silence();
        assert!(task.start(fail(), || {}));

        let err = task.join().await.unwrap_err();
        assert!(matches!(err, ClusterError::CannotDestroy { .. }));

        task.join().await.unwrap();
    }

    #[tokio::test]
    async fn failure_hook_runs_on_error_only() {
        let hook_runs = Arc::new(AtomicUsize::new(0));

        let ok = Arc::new(BackgroundTask::new(Operation::Spawn));
        let runs = Arc::clone(&hook_runs);
        ok.start(succeed(), move || {
            runs.fetch_add(1, Ordering::SeqCst);
        });
        ok.join().await.unwrap();
        assert_eq!(hook_runs.load(Ordering::SeqCst), 0);

        let failing = Arc::new(BackgroundTask::new(Operation::Spawn));
        let runs = Arc::clone(&hook_runs);
        failing.start(fail(), move || {
            runs.fetch_add(1, Ordering::SeqCst);
        });
        let _ = failing.join().await;
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panic_becomes_interruption() {
        let task = Arc::new(BackgroundTask::new(Operation::Spawn));
        task.start(crash(), || {});

        let err = task.join().await.unwrap_err();
        assert!(matches!(
            err.provision_cause(),
            Some(ProvisionError::Interrupted(_))
        ));
    }

    #[tokio::test]
    async fn multiple_joiners_observe_completion() {
        let task = Arc::new(BackgroundTask::new(Operation::Spawn));
        task.start(
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, ProvisionError>(())
            },
            || {},
        );
        assert!(task.is_running());

        let (a, b) = tokio::join!(task.join(), task.join());
        assert!(a.is_ok() && b.is_ok());
    }

    #[derive(Clone, Default)]
    struct ErrorEvents(Arc<AtomicUsize>);

    impl ErrorEvents {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for ErrorEvents {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn unsilenced_failure_is_logged() {
        let events = ErrorEvents::default();
        let _guard =
            tracing::subscriber::set_default(Registry::default().with(events.clone()));

        let task = Arc::new(BackgroundTask::new(Operation::Destroy));
        task.start(fail(), || {});
        while task.phase() != TaskPhase::Completed {
            tokio::task::yield_now().await;
        }

        assert_eq!(events.count(), 1);
        assert!(task.join().await.is_err());
    }

    #[tokio::test]
    async fn silenced_failure_is_not_logged() {
        let events = ErrorEvents::default();
        let _guard =
            tracing::subscriber::set_default(Registry::default().with(events.clone()));

        let task = Arc::new(BackgroundTask::new(Operation::Spawn));
        task.silence();
        task.start(fail(), || {});

        assert!(task.join().await.is_err());
        assert_eq!(events.count(), 0);
    }

    #[test]
    fn error_chain_includes_causes() {
        let err = ClusterError::CannotSpawn { source: failure() };
        assert_eq!(
            error_chain(&err),
            "cannot spawn cluster: unexpected tool output: nothing printed"
        );
    }
}
