//! Poll Store
//!
//! RPC access to the Tarantool instance that owns all poll state. The
//! [`RpcClient`] trait is the seam between command handlers and the wire;
//! [`PollStore`] puts typed arguments and per-procedure decoding on top.

pub mod client;
pub mod iproto;

use crate::polls::decode::{self, DecodeError, Decoded, Procedure, RpcOutcome};
use crate::polls::Poll;
use async_trait::async_trait;
use rmpv::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use client::TarantoolClient;

/// Transport-level failures talking to the store.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Call to {procedure} timed out after {timeout:?}")]
    Timeout {
        procedure: String,
        timeout: Duration,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Store error {code:#x}: {message}")]
    Server { code: u32, message: String },

    #[error("Connection closed")]
    Closed,
}

/// Issues named remote calls. Implementations must be safe to share across
/// concurrent requests.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<RpcOutcome, RpcError>;
}

/// A call that produced no usable answer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] RpcError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Typed front for the poll procedures.
#[derive(Clone)]
pub struct PollStore {
    rpc: Arc<dyn RpcClient>,
}

impl PollStore {
    pub fn new(rpc: Arc<dyn RpcClient>) -> Self {
        Self { rpc }
    }

    async fn call<T>(
        &self,
        procedure: Procedure,
        args: Vec<Value>,
        decode: fn(&RpcOutcome) -> Result<Decoded<T>, DecodeError>,
    ) -> Result<Decoded<T>, StoreError> {
        let outcome = self.rpc.call(procedure.name(), args).await.map_err(|e| {
            tracing::warn!(%procedure, error = %e, "Store call failed");
            e
        })?;

        decode(&outcome).map_err(|e| {
            tracing::error!(%procedure, error = %e, outcome = ?outcome.slots(), "Undecodable store response");
            StoreError::Decode(e)
        })
    }

    pub async fn create_poll(
        &self,
        user_id: &str,
        channel_id: &str,
        question: &str,
        options: &[String],
    ) -> Result<Decoded<u64>, StoreError> {
        let options = options.iter().map(|o| Value::from(o.as_str())).collect();
        let args = vec![
            Value::from(user_id),
            Value::from(channel_id),
            Value::from(question),
            Value::Array(options),
        ];
        self.call(Procedure::CreatePoll, args, decode::decode_create_poll)
            .await
    }

    pub async fn vote(
        &self,
        poll_id: u64,
        user_id: &str,
        option_index: i64,
        channel_id: &str,
    ) -> Result<Decoded<()>, StoreError> {
        let args = vec![
            Value::from(poll_id),
            Value::from(user_id),
            Value::from(option_index),
            Value::from(channel_id),
        ];
        self.call(Procedure::Vote, args, decode::decode_vote).await
    }

    pub async fn get_poll(
        &self,
        poll_id: u64,
        channel_id: &str,
    ) -> Result<Decoded<Poll>, StoreError> {
        let args = vec![Value::from(poll_id), Value::from(channel_id)];
        self.call(Procedure::GetPoll, args, decode::decode_get_poll)
            .await
    }

    pub async fn close_poll(
        &self,
        poll_id: u64,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Decoded<()>, StoreError> {
        let args = vec![
            Value::from(poll_id),
            Value::from(user_id),
            Value::from(channel_id),
        ];
        self.call(Procedure::ClosePoll, args, decode::decode_close_poll)
            .await
    }

    pub async fn delete_poll(
        &self,
        poll_id: u64,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Decoded<()>, StoreError> {
        let args = vec![
            Value::from(poll_id),
            Value::from(user_id),
            Value::from(channel_id),
        ];
        self.call(Procedure::DeletePoll, args, decode::decode_delete_poll)
            .await
    }
}
