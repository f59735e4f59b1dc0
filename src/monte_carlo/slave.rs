//! Slave connectors: the workers a sweep dispatches runs to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::engine::{CancelFlag, RunConfig, RunExecutor, RunResult};
use crate::error::{SimError, SimResult};

/// Index of a slave in the sweep's slave table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlaveId(pub usize);

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slave#{}", self.0)
    }
}

/// Availability of a slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaveStatus {
    /// Ready for a run.
    Idle,
    /// Executing a run.
    Busy,
    /// Failed to communicate; waits for a successful ping.
    Unreachable,
}

impl fmt::Display for SlaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Unreachable => "unreachable",
        };
        f.write_str(label)
    }
}

/// One worker able to execute runs.
///
/// `execute` returns `Ok` with the run's result whether the run completed or
/// failed; `Err(SimError::SlaveUnreachable)` means the result was lost in
/// transit and the run must be requeued.
#[async_trait]
pub trait SlaveConnector: Send + Sync + fmt::Debug {
    /// Address used in logs and results.
    fn host(&self) -> &str;

    /// Execute one run. Cancelling `cancel` aborts it.
    async fn execute(&self, config: RunConfig, cancel: CancelFlag) -> SimResult<RunResult>;

    /// Check that the slave answers.
    async fn ping(&self) -> bool;
}

/// In-process slave running the executor on the blocking pool.
#[derive(Debug, Clone)]
pub struct LocalSlave {
    host: String,
    executor: RunExecutor,
}

impl LocalSlave {
    /// Create a local slave named `localhost`.
    #[must_use]
    pub fn new(executor: RunExecutor) -> Self {
        Self::named("localhost", executor)
    }

    /// Create a local slave with a custom name.
    #[must_use]
    pub fn named(host: impl Into<String>, executor: RunExecutor) -> Self {
        Self {
            host: host.into(),
            executor,
        }
    }
}

#[async_trait]
impl SlaveConnector for LocalSlave {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, config: RunConfig, cancel: CancelFlag) -> SimResult<RunResult> {
        let executor = self.executor.clone().with_cancel(cancel);
        debug!(host = %self.host, run_id = config.run_id.0, "local dispatch");
        tokio::task::spawn_blocking(move || executor.execute(&config))
            .await
            .map_err(|e| SimError::unreachable(self.host.clone(), e.to_string()))
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::RunId;
    use crate::models::ModelCatalog;
    use std::sync::Arc;

    fn local() -> LocalSlave {
        LocalSlave::new(RunExecutor::new(Arc::new(ModelCatalog::builtin())))
    }

    #[tokio::test]
    async fn test_local_slave_executes() {
        let slave = local();
        let config = RunConfig::new(RunId(3), "msd").with_terminate_time(0.5);
        let result = slave.execute(config, CancelFlag::new()).await.unwrap();
        assert_eq!(result.run_id, RunId(3));
        assert!(result.is_completed());
        assert_eq!(slave.host(), "localhost");
        assert!(slave.ping().await);
    }

    #[tokio::test]
    async fn test_local_slave_honors_cancel() {
        let slave = local();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let config = RunConfig::new(RunId(0), "msd").with_terminate_time(1.0);
        let result = slave.execute(config, cancel).await.unwrap();
        assert!(!result.is_completed());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SlaveStatus::Unreachable.to_string(), "unreachable");
        assert_eq!(SlaveId(2).to_string(), "slave#2");
    }
}
