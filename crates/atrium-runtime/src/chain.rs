//! Sequential hook chains.
//!
//! Every lifecycle transition is a named chain of async steps executed in
//! order, short-circuiting on the first failure. Whether a failed step is
//! attributed to the application (breaking it) or to the framework
//! (propagating to the caller) is recorded per step.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// One async step in a chain.
pub type StepFn = Arc<dyn Fn() -> BoxFuture<'static, RuntimeResult<()>> + Send + Sync>;

/// Wrap an async closure into a [`StepFn`].
pub fn step_fn<F, Fut>(f: F) -> StepFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RuntimeResult<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

struct ChainStep {
    name: &'static str,
    app_attributed: bool,
    run: StepFn,
}

/// Failure of a single chain step.
#[derive(Debug)]
pub struct ChainFailure {
    /// Name of the step that failed.
    pub step: &'static str,
    /// Whether the failure counts against the application rather than the
    /// framework.
    pub app_attributed: bool,
    /// The underlying error.
    pub error: RuntimeError,
}

/// A named sequence of async steps.
pub struct HookChain {
    label: String,
    steps: Vec<ChainStep>,
}

impl HookChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            steps: Vec::new(),
        }
    }

    /// Append a framework-attributed step.
    #[must_use]
    pub fn step(mut self, name: &'static str, run: StepFn) -> Self {
        self.steps.push(ChainStep {
            name,
            app_attributed: false,
            run,
        });
        self
    }

    /// Append an application-attributed step.
    #[must_use]
    pub fn app_step(mut self, name: &'static str, run: StepFn) -> Self {
        self.steps.push(ChainStep {
            name,
            app_attributed: true,
            run,
        });
        self
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failing step's name, attribution, and error.
    pub async fn execute_all(self) -> Result<(), ChainFailure> {
        for step in self.steps {
            debug!(chain = %self.label, step = step.name, "running chain step");
            if let Err(error) = (step.run)().await {
                return Err(ChainFailure {
                    step: step.name,
                    app_attributed: step.app_attributed,
                    error,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = log.clone();
        let b = log.clone();
        let chain = HookChain::new("mount:shop")
            .step(
                "first",
                step_fn(move || {
                    let log = a.clone();
                    async move {
                        log.lock().unwrap().push("first");
                        Ok(())
                    }
                }),
            )
            .app_step(
                "second",
                step_fn(move || {
                    let log = b.clone();
                    async move {
                        log.lock().unwrap().push("second");
                        Ok(())
                    }
                }),
            );

        chain.execute_all().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failure_short_circuits_with_attribution() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = later.clone();
        let chain = HookChain::new("mount:shop")
            .app_step(
                "boom",
                step_fn(|| async {
                    Err(RuntimeError::Lifecycle {
                        app: "shop".to_string(),
                        phase: "mount".to_string(),
                        message: "exploded".to_string(),
                    })
                }),
            )
            .step(
                "unreached",
                step_fn(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );

        let failure = chain.execute_all().await.unwrap_err();
        assert_eq!(failure.step, "boom");
        assert!(failure.app_attributed);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }
}
