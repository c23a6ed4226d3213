//! JSON-RPC 2.0 envelopes and stdio framing.
//!
//! Clients frame messages either LSP-style (`Content-Length` headers) or as
//! one JSON document per line. The reader detects which on every message
//! and replies are written back the same way.

use serde_json::{Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    ContentLength,
    NewlineDelimited,
}

/// One inbound message. The payload is kept even when it is not valid JSON
/// so the server can answer with a parse error instead of hanging up.
#[derive(Debug)]
pub struct Inbound {
    pub framing: Framing,
    pub payload: Result<Value, serde_json::Error>,
}

/// Largest `Content-Length` body accepted.
pub const MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// Read the next message; `Ok(None)` on clean EOF.
///
/// Lines are read as bytes, so invalid UTF-8 surfaces as a payload decode
/// error for that one message rather than an I/O error for the stream.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Option<Inbound>>
where
    R: AsyncBufRead + Unpin,
{
    let first = loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        if !line.trim_ascii().is_empty() {
            break line;
        }
    };

    let first_text = String::from_utf8_lossy(&first);
    if !is_header_line(&first_text) {
        return Ok(Some(Inbound {
            framing: Framing::NewlineDelimited,
            payload: serde_json::from_slice(first.trim_ascii()),
        }));
    }

    let mut content_length = parse_content_length(&first_text)?;
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        if line.trim_ascii().is_empty() {
            break;
        }
        if content_length.is_none() {
            content_length = parse_content_length(&String::from_utf8_lossy(&line))?;
        }
    }

    let content_length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "Missing Content-Length header")
    })?;
    if content_length > MAX_CONTENT_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Content-Length {content_length} exceeds the {MAX_CONTENT_LENGTH} byte limit"),
        ));
    }
    let mut body = vec![0_u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(Some(Inbound {
        framing: Framing::ContentLength,
        payload: serde_json::from_slice(&body),
    }))
}

fn is_header_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.starts_with('{') && !trimmed.starts_with('[') && trimmed.contains(':')
}

fn parse_content_length(line: &str) -> io::Result<Option<usize>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some((name, raw)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    raw.trim()
        .parse::<usize>()
        .map(Some)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid Content-Length header"))
}

pub async fn write_message<W>(writer: &mut W, value: &Value, framing: Framing) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::NewlineDelimited => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await
}
