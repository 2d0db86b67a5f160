//! In-process fake poll store.
//!
//! Speaks just enough IPROTO to answer AUTH, PING and CALL frames, with a few
//! magic procedure names to exercise timeouts, dropped connections and
//! out-of-order replies.
#![allow(dead_code)]

use base64::Engine;
use pollbot::config::StoreConfig;
use pollbot::store::iproto::{self, RequestType};
use rmpv::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

pub const SALT: [u8; 32] = [0x42; 32];

enum Reply {
    Data(Vec<Value>),
    Delayed(u64, Vec<Value>),
    Error(u32, String),
    Silent,
    Hangup,
}

fn greeting() -> Vec<u8> {
    let version = format!("{:<63}\n", "Tarantool 2.11.1 (Binary) fake");
    let salt = format!(
        "{:<63}\n",
        base64::engine::general_purpose::STANDARD.encode(SALT)
    );
    [version.into_bytes(), salt.into_bytes()].concat()
}

fn poll_tuple(id: u64) -> Value {
    Value::Array(vec![
        Value::from(id),
        Value::from("Fav color?"),
        Value::Array(vec![Value::from("Red"), Value::from("Blue")]),
        Value::Map(vec![
            (Value::from("1"), Value::from(3u64)),
            (Value::from("2"), Value::from(1u64)),
        ]),
        Value::from("creator"),
        Value::from("channel"),
        Value::from(0u64),
        Value::Boolean(true),
        Value::Nil,
        Value::Nil,
    ])
}

fn answer(kind: u64, body: &Value, password: Option<&str>) -> Reply {
    if kind == RequestType::Ping as u64 {
        return Reply::Data(vec![]);
    }

    if kind == RequestType::Auth as u64 {
        let scramble = iproto::map_get(body, iproto::KEY_TUPLE)
            .and_then(Value::as_array)
            .and_then(|t| t.get(1))
            .cloned();
        let expected = iproto::scramble(&SALT, password.unwrap_or_default()).to_vec();
        return if scramble == Some(Value::Binary(expected)) {
            Reply::Data(vec![])
        } else {
            Reply::Error(0x2f, "Incorrect password supplied for user 'polls'".to_string())
        };
    }

    let function = iproto::map_get(body, iproto::KEY_FUNCTION_NAME)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let args = iproto::map_get(body, iproto::KEY_TUPLE)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match function {
        "get_poll" => Reply::Data(vec![poll_tuple(args[0].as_u64().unwrap_or(0))]),
        "vote" if args[1].as_str() == Some("repeat-voter") => Reply::Data(vec![
            Value::Nil,
            Value::Array(vec![Value::from("already voted")]),
        ]),
        "vote" => Reply::Data(vec![Value::Nil]),
        "create_poll" => Reply::Data(vec![Value::Array(vec![Value::from(1u64)])]),
        "echo" => Reply::Delayed(args[1].as_u64().unwrap_or(0), vec![args[0].clone()]),
        "slow" => Reply::Silent,
        "hangup" => Reply::Hangup,
        other => Reply::Error(0x21, format!("Procedure '{}' is not defined", other)),
    }
}

async fn send(writer: &Mutex<OwnedWriteHalf>, sync: u64, code: u32, body: Value) {
    let header = iproto::int_map(vec![
        (iproto::KEY_REQUEST_TYPE, Value::from(code)),
        (iproto::KEY_SYNC, Value::from(sync)),
    ]);
    let frame = iproto::encode_frame(&header, &body).unwrap();
    let _ = writer.lock().await.write_all(&frame).await;
}

/// Per-store quirks beyond the magic procedure names.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    pub password: Option<&'static str>,
    /// Stop reading for this long after answering the first request.
    pub stall_after_first: Option<Duration>,
    /// Connections after the first are accepted but never greeted.
    pub mute_after_first: bool,
    /// The first connection answers PING with an error.
    pub fail_first_ping: bool,
}

async fn serve(mut stream: TcpStream, behavior: Behavior, index: usize) {
    if behavior.mute_after_first && index > 0 {
        tokio::time::sleep(Duration::from_secs(30)).await;
        return;
    }
    if stream.write_all(&greeting()).await.is_err() {
        return;
    }
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let mut answered = 0usize;

    loop {
        if answered == 1 {
            if let Some(stall) = behavior.stall_after_first {
                tokio::time::sleep(stall).await;
            }
        }

        let Ok(frame) = iproto::read_frame(&mut reader).await else {
            return;
        };
        answered += 1;
        let (header, body) = iproto::decode_frame(&frame).unwrap();
        let sync = iproto::map_get(&header, iproto::KEY_SYNC)
            .and_then(Value::as_u64)
            .unwrap();
        let kind = iproto::map_get(&header, iproto::KEY_REQUEST_TYPE)
            .and_then(Value::as_u64)
            .unwrap();

        let reply = if behavior.fail_first_ping && index == 0 && kind == RequestType::Ping as u64 {
            Reply::Error(0x4d, "Instance is loading".to_string())
        } else {
            answer(kind, &body, behavior.password)
        };

        match reply {
            Reply::Data(data) => {
                let body = iproto::int_map(vec![(iproto::KEY_DATA, Value::Array(data))]);
                send(&writer, sync, 0, body).await;
            }
            Reply::Delayed(ms, data) => {
                let writer = writer.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    let body = iproto::int_map(vec![(iproto::KEY_DATA, Value::Array(data))]);
                    send(&writer, sync, 0, body).await;
                });
            }
            Reply::Error(code, message) => {
                let body = iproto::int_map(vec![(iproto::KEY_ERROR_24, Value::from(message))]);
                send(&writer, sync, iproto::ERROR_FLAG | code, body).await;
            }
            Reply::Silent => {}
            Reply::Hangup => return,
        }
    }
}

pub async fn spawn_fake_store(password: Option<&'static str>) -> SocketAddr {
    spawn_fake_store_with(Behavior {
        password,
        ..Behavior::default()
    })
    .await
}

pub async fn spawn_fake_store_with(behavior: Behavior) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, behavior, index));
            index += 1;
        }
    });
    addr
}

pub fn config(addr: SocketAddr) -> StoreConfig {
    StoreConfig {
        address: addr.to_string(),
        timeout_secs: 1,
        connect_attempts: 1,
        reconnect_delay_secs: 0,
        ..StoreConfig::default()
    }
}

