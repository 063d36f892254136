//! Startup readiness tracking.
//!
//! Initialization runs a sequence of named steps (embedding model, store,
//! watcher, ...). The orchestrator records each step's outcome and derives
//! one overall state from them: `Pending` until the last step completes,
//! `Complete` once it has, or `Failed` permanently on the first error.
//! A failure is latched - operations keep failing fast with the original
//! message until [`reset`](ReadinessOrchestrator::reset) - so a broken
//! startup never half-works. State changes are published on a watch
//! channel, which is what [`wait_for_ready`](ReadinessOrchestrator::wait_for_ready)
//! listens to.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{Result, RetrieverError};

/// Overall system state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializationState {
    Pending,
    Complete,
    /// Permanent until reset; carries the first failure's message
    Failed(String),
}

/// Outcome of one initialization step.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Complete,
    Failed,
}

/// Named step status, for status reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceReadinessStatus {
    pub name: String,
    pub status: ServiceStatus,
    /// Failure message, present only for failed services
    pub message: Option<String>,
}

pub struct ReadinessOrchestrator {
    /// Serializes whole initialization attempts; a second caller waits for
    /// the first and then observes its outcome
    init_lock: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<InitializationState>,
    services: Mutex<BTreeMap<String, (ServiceStatus, Option<String>)>>,
}

impl Default for ReadinessOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessOrchestrator {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(InitializationState::Pending);
        Self {
            init_lock: tokio::sync::Mutex::new(()),
            state_tx,
            services: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn state(&self) -> InitializationState {
        self.state_tx.borrow().clone()
    }

    /// Acquire the initialization lock. Held for the duration of one
    /// initialization attempt.
    pub async fn begin_initialization(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.init_lock.lock().await
    }

    /// Run one named initialization step, recording its outcome.
    ///
    /// On failure the overall state latches to `Failed` with the step's
    /// error message and the error is returned to the caller.
    pub async fn run_step<F, T>(&self, name: &str, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.record(name, ServiceStatus::Pending, None);
        match step.await {
            Ok(value) => {
                self.record(name, ServiceStatus::Complete, None);
                info!(service = name, "initialization step complete");
                Ok(value)
            }
            Err(e) => {
                let message = format!("{name}: {e}");
                self.record(name, ServiceStatus::Failed, Some(e.to_string()));
                self.state_tx
                    .send_replace(InitializationState::Failed(message));
                error!(service = name, "initialization step failed: {e}");
                Err(e)
            }
        }
    }

    fn record(&self, name: &str, status: ServiceStatus, message: Option<String>) {
        if let Ok(mut services) = self.services.lock() {
            services.insert(name.to_string(), (status, message));
        }
    }

    /// Declare initialization finished. Ignored if a step already failed.
    pub fn mark_complete(&self) {
        self.state_tx.send_if_modified(|state| {
            if matches!(state, InitializationState::Failed(_)) {
                false
            } else {
                *state = InitializationState::Complete;
                true
            }
        });
    }

    /// Fail fast unless the system is ready.
    pub fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            InitializationState::Complete => Ok(()),
            InitializationState::Failed(message) => {
                Err(RetrieverError::InitializationFailed { message })
            }
            InitializationState::Pending => Err(RetrieverError::not_initialized("engine")),
        }
    }

    /// Wait until the system becomes ready, up to `timeout`.
    ///
    /// Returns immediately if readiness is already decided: `Ok` when
    /// complete, the latched error when failed. A pending system that does
    /// not resolve within the timeout yields [`RetrieverError::Timeout`].
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let wait = async {
            loop {
                match &*rx.borrow_and_update() {
                    InitializationState::Complete => return Ok(()),
                    InitializationState::Failed(message) => {
                        return Err(RetrieverError::InitializationFailed {
                            message: message.clone(),
                        });
                    }
                    InitializationState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return Err(RetrieverError::not_initialized("engine"));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(RetrieverError::Timeout { waited: timeout }),
        }
    }

    /// Clear all recorded outcomes and return to `Pending`, allowing a new
    /// initialization attempt after a failure.
    pub fn reset(&self) {
        if let Ok(mut services) = self.services.lock() {
            services.clear();
        }
        self.state_tx.send_replace(InitializationState::Pending);
        info!("readiness state reset");
    }

    /// Per-step statuses in name order.
    pub fn service_statuses(&self) -> Vec<ServiceReadinessStatus> {
        self.services
            .lock()
            .map(|services| {
                services
                    .iter()
                    .map(|(name, (status, message))| ServiceReadinessStatus {
                        name: name.clone(),
                        status: status.clone(),
                        message: message.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
