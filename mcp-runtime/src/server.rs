//! MCP dispatch and the stdio serve loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::{HttpTransport, Transport, VendorClient};
use crate::resources::{read_resource, templates_list_payload};
use crate::rpc::{
    Framing, RpcError, error_response, read_message, success_response, write_message,
};
use crate::tools::{
    build_tool_call_response, error_envelope, execute_tool, success_envelope, tool_definitions,
};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "replicated-mcp-server";

const INSTRUCTIONS: &str = "Read-only access to the Replicated Vendor Portal. Start with list_applications to discover app IDs; releases, channels and customers are scoped to an app_id. search_applications searches server-side. search_releases, search_channels and search_customers filter one page of up to 100 entities client-side, so use offset to scan further.";

pub struct McpServer<T = HttpTransport> {
    client: Arc<VendorClient<T>>,
}

impl<T: Transport> McpServer<T> {
    pub fn new(client: Arc<VendorClient<T>>) -> Self {
        Self { client }
    }

    /// One message or one batch in, at most one message (or batch) out.
    pub async fn handle_incoming_message(&self, incoming: Value) -> Option<Value> {
        let Some(batch) = incoming.as_array() else {
            return self.handle_single_message(incoming).await;
        };
        if batch.is_empty() {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Batch request must not be empty"),
            ));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.handle_single_message(item.clone()).await {
                responses.push(response);
            }
        }
        (!responses.is_empty()).then_some(Value::Array(responses))
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A response to something we never sent.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => {
                    tracing::debug!(method, code = err.code, error = %err.message, "request failed");
                    error_response(id, err)
                }
            })
        } else {
            self.handle_notification(method, &params);
            None
        }
    }

    fn handle_notification(&self, method: &str, params: &Value) {
        match method {
            "notifications/initialized" => tracing::info!("client initialized"),
            "notifications/cancelled" => {
                let request_id = params.get("requestId").map(Value::to_string);
                tracing::debug!(request_id = ?request_id, "cancellation for unknown request");
            }
            _ => tracing::debug!(method, "ignoring notification"),
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "resources/templates/list" => Ok(templates_list_payload()),
            "resources/read" => self.handle_resources_read(params).await,
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self, params: &Value) -> Value {
        let client = params
            .pointer("/clientInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let protocol = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unspecified");
        tracing::info!(client, protocol, "initialize");
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "resources": {
                    "subscribe": false,
                    "listChanged": false
                },
                "prompts": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": INSTRUCTIONS
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = tool_definitions()
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let call_id = Uuid::now_v7();
        let span = tracing::info_span!("tool_call", %call_id, tool = name);
        async {
            let started = Instant::now();
            let result = execute_tool(&*self.client, name, &args).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            Ok::<Value, RpcError>(match result {
                Ok(data) => {
                    tracing::info!(elapsed_ms, "tool call completed");
                    build_tool_call_response(success_envelope(name, data), false)
                }
                Err(err) => {
                    tracing::warn!(elapsed_ms, code = %err.code, error = %err.message, "tool call failed");
                    build_tool_call_response(error_envelope(name, &err), true)
                }
            })
        }
        .instrument(span)
        .await
    }

    async fn handle_resources_read(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("resources/read params must be an object"))?;
        let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| {
            RpcError::invalid_params("resources/read requires string field 'uri'")
        })?;
        read_resource(&*self.client, uri).await
    }

    /// Read messages until EOF. Each message is handled on its own task so a
    /// slow vendor call never blocks `ping` or a cancellation; one writer
    /// task owns the output stream.
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Value, Framing)>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some((message, framing)) = rx.recv().await {
                write_message(&mut writer, &message, framing).await?;
            }
            Ok::<(), io::Error>(())
        });

        let mut in_flight: HashMap<String, JoinHandle<()>> = HashMap::new();
        let read_result = loop {
            let inbound = match read_message(&mut reader).await {
                Ok(Some(inbound)) => inbound,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };
            let framing = inbound.framing;
            let incoming = match inbound.payload {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(error = %err, "unparseable message");
                    let response = error_response(
                        Value::Null,
                        RpcError::parse_error(format!("Parse error: {err}")),
                    );
                    let _ = tx.send((response, framing));
                    continue;
                }
            };

            if let Some(request_id) = cancelled_request_id(&incoming) {
                if let Some(handle) = in_flight.remove(&request_id) {
                    handle.abort();
                    tracing::info!(request_id = %request_id, "request cancelled");
                    continue;
                }
            }

            in_flight.retain(|_, handle| !handle.is_finished());
            let key = request_key(&incoming);
            let server = Arc::clone(&self);
            let tx = tx.clone();
            let handle = tokio::spawn(async move {
                if let Some(response) = server.handle_incoming_message(incoming).await {
                    let _ = tx.send((response, framing));
                }
            });
            if let Some(key) = key {
                in_flight.insert(key, handle);
            }
        };

        drop(tx);
        for (_, handle) in in_flight.drain() {
            let _ = handle.await;
        }
        let write_result = writer_task
            .await
            .map_err(|e| io::Error::other(format!("writer task failed: {e}")))?;
        read_result?;
        write_result
    }

    pub async fn serve_stdio(self: Arc<Self>) -> io::Result<()> {
        tracing::info!(
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            "serving MCP over stdio"
        );
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }
}

/// In-flight requests are keyed by their JSON-encoded id.
fn request_key(incoming: &Value) -> Option<String> {
    let obj = incoming.as_object()?;
    obj.get("method")?;
    obj.get("id").map(Value::to_string)
}

fn cancelled_request_id(incoming: &Value) -> Option<String> {
    let obj = incoming.as_object()?;
    if obj.get("method").and_then(Value::as_str) != Some("notifications/cancelled")
        || obj.contains_key("id")
    {
        return None;
    }
    obj.get("params")?
        .get("requestId")
        .map(Value::to_string)
}
