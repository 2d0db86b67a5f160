//! Tarantool IPROTO Codec
//!
//! Greeting parsing, chap-sha1 scrambling and MessagePack framing for the
//! handful of requests the poll gateway issues (AUTH, CALL_16, PING).
//!
//! A frame is a MessagePack unsigned length followed by a header map and a
//! body map, both keyed by small integer codes.

use super::RpcError;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use rmpv::Value;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the server greeting sent right after accept.
pub const GREETING_LEN: usize = 128;

/// Frames larger than this are treated as a corrupt stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const SCRAMBLE_LEN: usize = 20;

// Header keys
pub const KEY_REQUEST_TYPE: u8 = 0x00;
pub const KEY_SYNC: u8 = 0x01;

// Body keys
pub const KEY_TUPLE: u8 = 0x21;
pub const KEY_FUNCTION_NAME: u8 = 0x22;
pub const KEY_USER_NAME: u8 = 0x23;
pub const KEY_DATA: u8 = 0x30;
pub const KEY_ERROR_24: u8 = 0x31;

/// Response codes with this bit set carry an error in the body.
pub const ERROR_FLAG: u32 = 0x8000;

/// Request type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    /// CALL with 1.6 semantics: every returned value is wrapped into a tuple.
    Call16 = 0x06,
    Auth = 0x07,
    Ping = 0x40,
}

/// Parsed server greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub version: String,
    pub salt: Vec<u8>,
}

/// Parse the 128-byte greeting: a version line and a base64 salt line.
pub fn parse_greeting(buf: &[u8]) -> Result<Greeting, RpcError> {
    if buf.len() != GREETING_LEN {
        return Err(RpcError::Protocol(format!(
            "greeting is {} bytes, expected {}",
            buf.len(),
            GREETING_LEN
        )));
    }

    let (version_line, salt_line) = buf.split_at(GREETING_LEN / 2);
    let version = String::from_utf8_lossy(version_line).trim().to_string();
    if !version.starts_with("Tarantool") {
        return Err(RpcError::Protocol(format!(
            "unexpected greeting {:?}",
            version
        )));
    }

    let salt_text = std::str::from_utf8(salt_line)
        .map_err(|e| RpcError::Protocol(format!("greeting salt is not UTF-8: {}", e)))?
        .trim();
    let salt = base64::engine::general_purpose::STANDARD
        .decode(salt_text)
        .map_err(|e| RpcError::Protocol(format!("greeting salt is not base64: {}", e)))?;
    if salt.len() < SCRAMBLE_LEN {
        return Err(RpcError::Protocol(format!(
            "greeting salt is {} bytes, need at least {}",
            salt.len(),
            SCRAMBLE_LEN
        )));
    }

    Ok(Greeting { version, salt })
}

/// chap-sha1 scramble: `sha1(pw) XOR sha1(salt[..20] ++ sha1(sha1(pw)))`.
pub fn scramble(salt: &[u8], password: &str) -> [u8; SCRAMBLE_LEN] {
    let step1 = Sha1::digest(password.as_bytes());
    let step2 = Sha1::digest(step1);

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_LEN]);
    hasher.update(step2);
    let step3 = hasher.finalize();

    let mut out = [0u8; SCRAMBLE_LEN];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = step1[i] ^ step3[i];
    }
    out
}

/// Requests understood by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    Auth { user: String, scramble: Vec<u8> },
    Call { function: String, args: Vec<Value> },
}

impl Request {
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::Ping => RequestType::Ping,
            Request::Auth { .. } => RequestType::Auth,
            Request::Call { .. } => RequestType::Call16,
        }
    }

    fn body(&self) -> Value {
        match self {
            Request::Ping => Value::Map(Vec::new()),
            Request::Auth { user, scramble } => int_map(vec![
                (KEY_USER_NAME, Value::from(user.as_str())),
                (
                    KEY_TUPLE,
                    Value::Array(vec![
                        Value::from("chap-sha1"),
                        Value::Binary(scramble.clone()),
                    ]),
                ),
            ]),
            Request::Call { function, args } => int_map(vec![
                (KEY_FUNCTION_NAME, Value::from(function.as_str())),
                (KEY_TUPLE, Value::Array(args.clone())),
            ]),
        }
    }
}

/// Decoded response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub sync: u64,
    pub code: u32,
    pub body: Value,
}

impl Response {
    pub fn is_error(&self) -> bool {
        self.code & ERROR_FLAG != 0
    }

    /// The `DATA` list of a successful response, or the server error.
    pub fn into_data(self) -> Result<Vec<Value>, RpcError> {
        if self.is_error() {
            let message = map_get(&self.body, KEY_ERROR_24)
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(RpcError::Server {
                code: self.code & !ERROR_FLAG,
                message,
            });
        }

        match map_get(&self.body, KEY_DATA) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(other) => Err(RpcError::Protocol(format!(
                "response data is not an array: {}",
                other
            ))),
        }
    }
}

/// Build a map keyed by IPROTO integer codes.
pub fn int_map(entries: Vec<(u8, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

/// Look up an integer key in an IPROTO map.
pub fn map_get(map: &Value, key: u8) -> Option<&Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(u64::from(key)))
        .map(|(_, v)| v)
}

/// Encode a complete frame, length prefix included.
pub fn encode_frame(header: &Value, body: &Value) -> Result<Bytes, RpcError> {
    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, header)
        .map_err(|e| RpcError::Protocol(format!("encode header: {}", e)))?;
    rmpv::encode::write_value(&mut payload, body)
        .map_err(|e| RpcError::Protocol(format!("encode body: {}", e)))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| RpcError::Protocol("frame too large".to_string()))?;
    let mut frame = BytesMut::with_capacity(5 + payload.len());
    frame.put_u8(0xce);
    frame.put_u32(len);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Split a frame payload (length prefix already stripped) into header and body.
///
/// A frame without a body decodes to an empty body map.
pub fn decode_frame(payload: &[u8]) -> Result<(Value, Value), RpcError> {
    let mut cursor = payload;
    let header = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| RpcError::Protocol(format!("decode header: {}", e)))?;
    let body = if cursor.is_empty() {
        Value::Map(Vec::new())
    } else {
        rmpv::decode::read_value(&mut cursor)
            .map_err(|e| RpcError::Protocol(format!("decode body: {}", e)))?
    };
    Ok((header, body))
}

pub fn encode_request(sync: u64, request: &Request) -> Result<Bytes, RpcError> {
    let header = int_map(vec![
        (KEY_REQUEST_TYPE, Value::from(request.request_type() as u8)),
        (KEY_SYNC, Value::from(sync)),
    ]);
    encode_frame(&header, &request.body())
}

pub fn decode_response(payload: &[u8]) -> Result<Response, RpcError> {
    let (header, body) = decode_frame(payload)?;

    let code = map_get(&header, KEY_REQUEST_TYPE)
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::Protocol("response header has no code".to_string()))?;
    let sync = map_get(&header, KEY_SYNC)
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::Protocol("response header has no sync".to_string()))?;
    let code = u32::try_from(code)
        .map_err(|_| RpcError::Protocol(format!("response code {} out of range", code)))?;

    Ok(Response { sync, code, body })
}

/// Read one frame payload, consuming its MessagePack length prefix.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let marker = reader.read_u8().await?;
    let len = match marker {
        0x00..=0x7f => u64::from(marker),
        0xcc => u64::from(reader.read_u8().await?),
        0xcd => u64::from(reader.read_u16().await?),
        0xce => u64::from(reader.read_u32().await?),
        0xcf => reader.read_u64().await?,
        other => {
            return Err(RpcError::Protocol(format!(
                "invalid frame length marker {:#04x}",
                other
            )))
        }
    };

    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| RpcError::Protocol(format!("frame of {} bytes exceeds limit", len)))?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
