//! Tarantool Client
//!
//! One TCP connection shared by every request. Requests are tagged with a
//! sync id and a background reader task routes each response to the waiting
//! caller, so concurrent calls never queue behind each other on this side.
//! Frames go out through a writer task that owns the socket's write half, so
//! a caller that gives up never leaves half a frame on the wire.
//!
//! Startup retries the connection a bounded number of times. After that a
//! dropped connection is re-opened lazily, once, by the next call; a call that
//! fails in flight is reported and never replayed.

use super::iproto::{self, Request, Response};
use super::{RpcClient, RpcError};
use crate::config::StoreConfig;
use crate::polls::RpcOutcome;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rmpv::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Frames queued for the writer task before callers wait for room.
const OUTBOUND_QUEUE: usize = 64;

type Waiter = oneshot::Sender<Result<Response, RpcError>>;

/// In-flight requests keyed by sync id.
#[derive(Default)]
struct Pending {
    state: Mutex<PendingState>,
}

#[derive(Default)]
struct PendingState {
    waiters: HashMap<u64, Waiter>,
    closed: bool,
}

impl Pending {
    fn register(&self, sync: u64) -> Result<oneshot::Receiver<Result<Response, RpcError>>, RpcError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RpcError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.insert(sync, tx);
        Ok(rx)
    }

    fn forget(&self, sync: u64) {
        self.state.lock().waiters.remove(&sync);
    }

    fn complete(&self, response: Response) {
        let waiter = self.state.lock().waiters.remove(&response.sync);
        match waiter {
            Some(tx) => {
                let _ = tx.send(Ok(response));
            }
            None => debug!(sync = response.sync, "Dropping response with no waiter"),
        }
    }

    /// Mark the connection dead and fail everything still waiting.
    fn close(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        for (_, tx) in waiters {
            let _ = tx.send(Err(RpcError::Closed));
        }
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// A single authenticated IPROTO session.
struct Connection {
    outbound: mpsc::Sender<Bytes>,
    pending: Arc<Pending>,
    next_sync: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl Connection {
    async fn open(config: &StoreConfig) -> Result<Self, RpcError> {
        let timeout = config.call_timeout();
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(&config.address))
            .await
            .map_err(|_| {
                RpcError::Connection(format!("connect to {} timed out", config.address))
            })??;
        stream.set_nodelay(true)?;

        let mut greeting = [0u8; iproto::GREETING_LEN];
        tokio::time::timeout(timeout, stream.read_exact(&mut greeting))
            .await
            .map_err(|_| RpcError::Connection("no greeting from server".to_string()))??;
        let greeting = iproto::parse_greeting(&greeting)?;
        debug!(version = %greeting.version, "Store greeting received");

        let (read_half, write_half) = stream.into_split();
        let pending = Arc::new(Pending::default());
        let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE);
        let reader = tokio::spawn(read_loop(read_half, pending.clone()));
        let writer = tokio::spawn(write_loop(write_half, queue, pending.clone()));

        let connection = Self {
            outbound,
            pending,
            next_sync: AtomicU64::new(1),
            reader,
            writer,
        };

        if config.requires_auth() {
            let request = Request::Auth {
                user: config.user.clone(),
                scramble: iproto::scramble(&greeting.salt, &config.password).to_vec(),
            };
            connection
                .request(request, "auth", timeout)
                .await
                .and_then(Response::into_data)
                .map_err(|e| RpcError::Auth(e.to_string()))?;
        }

        Ok(connection)
    }

    fn is_alive(&self) -> bool {
        !self.pending.is_closed()
    }

    async fn ping(&self, timeout: Duration) -> Result<(), RpcError> {
        self.request(Request::Ping, "ping", timeout)
            .await?
            .into_data()
            .map(|_| ())
    }

    /// Send one request and wait for its response.
    ///
    /// Only the enqueue and the wait for the reply are bounded by `timeout`.
    /// Once queued, a frame is always written whole by the writer task.
    async fn request(
        &self,
        request: Request,
        label: &str,
        timeout: Duration,
    ) -> Result<Response, RpcError> {
        let sync = self.next_sync.fetch_add(1, Ordering::Relaxed);
        let frame = iproto::encode_request(sync, &request)?;
        let rx = self.pending.register(sync)?;

        let roundtrip = async {
            self.outbound
                .send(frame)
                .await
                .map_err(|_| RpcError::Closed)?;
            rx.await.unwrap_or(Err(RpcError::Closed))
        };

        match tokio::time::timeout(timeout, roundtrip).await {
            Ok(result) => result,
            Err(_) => {
                self.pending.forget(sync);
                Err(RpcError::Timeout {
                    procedure: label.to_string(),
                    timeout,
                })
            }
        }
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    pending: Arc<Pending>,
) {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            warn!(error = %e, "Store write failed");
            pending.close();
            return;
        }
    }
}

async fn read_loop(read_half: OwnedReadHalf, pending: Arc<Pending>) {
    let mut reader = BufReader::new(read_half);
    loop {
        let response = match iproto::read_frame(&mut reader).await {
            Ok(frame) => iproto::decode_response(&frame),
            Err(e) => Err(e),
        };

        match response {
            Ok(response) => pending.complete(response),
            Err(e) => {
                warn!(error = %e, "Store connection lost");
                pending.close();
                return;
            }
        }
    }
}

/// Shared, reconnecting connection to the poll store.
pub struct TarantoolClient {
    config: StoreConfig,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl TarantoolClient {
    /// Connect and ping, retrying up to `connect_attempts` times.
    pub async fn connect(config: StoreConfig) -> Result<Self, RpcError> {
        let attempts = config.connect_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let checked = match Connection::open(&config).await {
                Ok(connection) => connection
                    .ping(config.call_timeout())
                    .await
                    .map(|_| connection),
                Err(e) => Err(e),
            };

            match checked {
                Ok(connection) => {
                    info!(address = %config.address, "Connected to poll store");
                    return Ok(Self {
                        config,
                        connection: Mutex::new(Some(Arc::new(connection))),
                    });
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Store connection attempt failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(config.reconnect_delay()).await;
                    }
                }
            }
        }

        Err(RpcError::Connection(format!(
            "{} unreachable after {} attempts: {}",
            config.address,
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn live_connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .lock()
            .as_ref()
            .filter(|c| c.is_alive())
            .cloned()
    }

    /// Current live connection, re-opened once if the previous one died.
    ///
    /// The slot lock is never held while opening; when several callers
    /// reconnect at once, the first one stored wins and the rest drop theirs.
    async fn connection(&self) -> Result<Arc<Connection>, RpcError> {
        if let Some(connection) = self.live_connection() {
            return Ok(connection);
        }

        info!(address = %self.config.address, "Reconnecting to poll store");
        let opened = Arc::new(Connection::open(&self.config).await?);

        let mut slot = self.connection.lock();
        if let Some(existing) = slot.as_ref().filter(|c| c.is_alive()) {
            return Ok(existing.clone());
        }
        *slot = Some(opened.clone());
        Ok(opened)
    }

    pub async fn ping(&self) -> Result<(), RpcError> {
        self.connection()
            .await?
            .ping(self.config.call_timeout())
            .await
    }
}

#[async_trait]
impl RpcClient for TarantoolClient {
    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<RpcOutcome, RpcError> {
        let connection = self.connection().await?;
        let request = Request::Call {
            function: procedure.to_string(),
            args,
        };

        debug!(procedure, "Calling store procedure");
        let response = connection
            .request(request, procedure, self.config.call_timeout())
            .await?;
        Ok(RpcOutcome::new(response.into_data()?))
    }
}
