//! Remote slaves over TCP.
//!
//! The wire format is newline-delimited JSON: one [`SlaveRequest`] per line
//! from master to slave, one [`SlaveResponse`] per line back. A connection
//! carries any number of request/response pairs. Closing the connection while
//! a run is executing cancels that run on the slave.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::engine::{CancelFlag, RunConfig, RunExecutor, RunResult};
use crate::error::{SimError, SimResult};
use crate::monte_carlo::slave::SlaveConnector;

/// Default time allowed to open a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Master-to-slave message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlaveRequest {
    /// Liveness check.
    Ping,
    /// Execute one run.
    Execute {
        /// Run to execute.
        config: Box<RunConfig>,
    },
}

/// Slave-to-master message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlaveResponse {
    /// Answer to `Ping`.
    Pong,
    /// Result of `Execute`.
    Result {
        /// The run's result.
        result: Box<RunResult>,
    },
    /// Request could not be served.
    Error {
        /// Description.
        message: String,
    },
}

/// Write one message as a JSON line.
///
/// # Errors
///
/// Returns an I/O or serialization error.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> SimResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one JSON line; `None` at end of stream.
///
/// # Errors
///
/// Returns an I/O error or a serialization error for a malformed line.
pub async fn read_message<R, T>(reader: &mut R) -> SimResult<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}

/// Slave reached over TCP at `host:port`.
#[derive(Debug, Clone)]
pub struct RemoteSlave {
    host: String,
    connect_timeout: Duration,
}

impl RemoteSlave {
    /// Create a connector for `address` (`host:port`).
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            host: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect(&self) -> SimResult<BufReader<TcpStream>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.host))
            .await
            .map_err(|_| self.unreachable("connect timed out"))?
            .map_err(|e| self.unreachable(e))?;
        Ok(BufReader::new(stream))
    }

    async fn request(
        &self,
        stream: &mut BufReader<TcpStream>,
        request: &SlaveRequest,
    ) -> SimResult<SlaveResponse> {
        write_message(stream, request)
            .await
            .map_err(|e| self.unreachable(e))?;
        read_message(stream)
            .await
            .map_err(|e| self.unreachable(e))?
            .ok_or_else(|| self.unreachable("connection closed"))
    }

    fn unreachable(&self, reason: impl ToString) -> SimError {
        SimError::unreachable(self.host.clone(), reason.to_string())
    }
}

#[async_trait]
impl SlaveConnector for RemoteSlave {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, config: RunConfig, cancel: CancelFlag) -> SimResult<RunResult> {
        let run_id = config.run_id;
        let mut stream = self.connect().await?;
        let request = SlaveRequest::Execute {
            config: Box::new(config),
        };

        // Dropping the connection on cancel tells the slave to stop the run.
        let response = tokio::select! {
            response = self.request(&mut stream, &request) => response?,
            () = cancel.cancelled() => return Err(SimError::Cancelled),
        };

        match response {
            SlaveResponse::Result { result } if result.run_id == run_id => Ok(*result),
            SlaveResponse::Result { result } => Err(SimError::rejected(
                self.host.clone(),
                format!("answered {} for {run_id}", result.run_id),
            )),
            SlaveResponse::Error { message } => Err(SimError::rejected(self.host.clone(), message)),
            SlaveResponse::Pong => Err(self.unreachable("unexpected pong")),
        }
    }

    async fn ping(&self) -> bool {
        let exchange = async {
            let mut stream = self.connect().await?;
            self.request(&mut stream, &SlaveRequest::Ping).await
        };
        matches!(
            tokio::time::timeout(self.connect_timeout, exchange).await,
            Ok(Ok(SlaveResponse::Pong))
        )
    }
}

/// Serve runs from `listener` until accepting fails.
///
/// Each connection is handled on its own task.
///
/// # Errors
///
/// Returns the I/O error that stopped the accept loop.
pub async fn serve_slave(listener: TcpListener, executor: RunExecutor) -> SimResult<()> {
    info!(address = ?listener.local_addr().ok(), "slave listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "master connected");
        let executor = executor.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, executor).await {
                warn!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, executor: RunExecutor) -> SimResult<()> {
    let mut stream = BufReader::new(stream);
    loop {
        let request = match read_message::<_, SlaveRequest>(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(SimError::Serialization(message)) => {
                write_message(&mut stream, &SlaveResponse::Error { message }).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        let response = match request {
            SlaveRequest::Ping => SlaveResponse::Pong,
            SlaveRequest::Execute { config } => match execute(&mut stream, &executor, *config).await? {
                Some(result) => SlaveResponse::Result {
                    result: Box::new(result),
                },
                None => return Ok(()),
            },
        };
        write_message(&mut stream, &response).await?;
    }
}

/// Run `config`, cancelling it if the master hangs up. `None` means the
/// master went away.
async fn execute(
    stream: &mut BufReader<TcpStream>,
    executor: &RunExecutor,
    config: RunConfig,
) -> SimResult<Option<RunResult>> {
    let cancel = CancelFlag::new();
    let executor = executor.clone().with_cancel(cancel.clone());
    let run_id = config.run_id;
    let mut task = tokio::task::spawn_blocking(move || executor.execute(&config));

    loop {
        let mut scratch = String::new();
        tokio::select! {
            joined = &mut task => {
                let mut result = joined.map_err(|e| SimError::config(format!("run task failed: {e}")))?;
                retain_finite(&mut result);
                return Ok(Some(result));
            }
            read = stream.read_line(&mut scratch) => {
                // One request at a time; extra lines are dropped.
                if matches!(read, Ok(0) | Err(_)) {
                    break;
                }
            }
        }
    }

    info!(run_id = run_id.0, "master disconnected, cancelling run");
    cancel.cancel();
    let _ = task.await;
    Ok(None)
}

/// JSON has no NaN or infinity, so non-finite values are left out.
fn retain_finite(result: &mut RunResult) {
    result.final_values.retain(|_, v| v.is_finite());
    for samples in result.trajectories.values_mut() {
        samples.retain(|s| s.value.is_finite());
    }
    for event in &mut result.events {
        event.values.retain(|_, v| v.is_finite());
    }
}
