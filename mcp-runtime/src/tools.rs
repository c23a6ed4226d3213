//! Tool catalogue, argument decoding and the twelve read-only handlers.
//!
//! Every tool decodes its argument map into one request struct up front, so
//! a bad argument never reaches the vendor API.

use serde::Serialize;
use serde_json::{Map, Value, json};

use replicated_core::error::codes::VALIDATION_FAILED;

use crate::client::{ClientError, Transport, VendorClient};
use crate::rpc::to_pretty_json;
use crate::services::{AppScoped, DEFAULT_SEARCH_LIMIT, Entity, ListOptions};

pub const MAX_LIST_LIMIT: u32 = 100;
pub const MAX_SEARCH_LIMIT: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_LIST_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub docs_hint: Option<String>,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(docs_hint) = &self.docs_hint {
            payload["docs_hint"] = Value::String(docs_hint.clone());
        }
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

impl From<ClientError> for ToolError {
    fn from(err: ClientError) -> Self {
        let base = ToolError::new(err.code(), err.to_string());
        match &err {
            ClientError::InvalidArgument(_) => base,
            ClientError::Transport { .. } => base.with_docs_hint(
                "Check network access to the vendor API endpoint and retry.",
            ),
            ClientError::Timeout { timeout, .. } => base
                .with_details(json!({ "timeout_ms": timeout.as_millis() as u64 }))
                .with_docs_hint("Retry, or raise --timeout (TIMEOUT) for slow responses."),
            ClientError::CircuitOpen { retry_in, .. } => base
                .with_details(json!({ "retry_in_secs": retry_in.as_secs() }))
                .with_docs_hint("The vendor API failed repeatedly; wait before retrying."),
            ClientError::Api { source, .. } => {
                let with_details = base.with_details(json!({
                    "status": source.status,
                    "details": source.details
                }));
                match source.status {
                    401 => with_details.with_docs_hint(
                        "The vendor API rejected the token. Check REPLICATED_API_TOKEN.",
                    ),
                    403 => with_details
                        .with_docs_hint("The API token lacks access to this resource."),
                    404 => with_details.with_docs_hint(
                        "Verify the identifier with the matching list_* tool.",
                    ),
                    429 => with_details
                        .with_docs_hint("Vendor API rate limit reached; retry later."),
                    _ => with_details,
                }
            }
            ClientError::Decode { .. } => base,
            ClientError::Validation(violation) => base
                .with_details(json!({
                    "entity": violation.entity,
                    "violations": violation.violations
                }))
                .with_docs_hint(
                    "Strict validation is on. Disable --strict-validation to receive the data with warnings.",
                ),
        }
    }
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn app_id_property() -> Value {
    json!({
        "type": "string",
        "description": "The application ID (or slug)"
    })
}

fn id_property(noun: &str) -> Value {
    json!({
        "type": "string",
        "description": format!("The unique identifier of the {noun}")
    })
}

fn limit_property(noun: &str, max: u32) -> Value {
    json!({
        "type": "number",
        "description": format!("Maximum number of {noun} to return (1-{max})"),
        "minimum": 1,
        "maximum": max,
        "default": DEFAULT_LIST_LIMIT
    })
}

fn offset_property(noun: &str) -> Value {
    json!({
        "type": "number",
        "description": format!("Number of {noun} to skip for pagination"),
        "minimum": 0,
        "default": 0
    })
}

fn query_property(matched: &str) -> Value {
    json!({
        "type": "string",
        "description": format!("Case-insensitive text matched against {matched}")
    })
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_applications",
            description: "List applications in the Replicated Vendor Portal. page/page_size are forwarded to the API; limit/offset then window the returned page.",
            input_schema: object_schema(
                json!({
                    "limit": limit_property("applications", MAX_LIST_LIMIT),
                    "offset": offset_property("applications"),
                    "page": { "type": "number", "description": "API page number (1-based)", "minimum": 1 },
                    "page_size": { "type": "number", "description": "API page size (1-100)", "minimum": 1, "maximum": MAX_PAGE_SIZE }
                }),
                &[],
            ),
        },
        ToolDefinition {
            name: "get_application",
            description: "Get one application by ID.",
            input_schema: object_schema(json!({ "app_id": app_id_property() }), &["app_id"]),
        },
        ToolDefinition {
            name: "search_applications",
            description: "Search applications server-side by name or other text.",
            input_schema: object_schema(
                json!({
                    "query": query_property("application names and descriptions"),
                    "limit": limit_property("results", MAX_SEARCH_LIMIT),
                    "page": { "type": "number", "description": "API page number (1-based)", "minimum": 1 }
                }),
                &["query"],
            ),
        },
        ToolDefinition {
            name: "list_releases",
            description: "List releases of an application, with version, sequence and status.",
            input_schema: object_schema(
                json!({
                    "app_id": app_id_property(),
                    "limit": limit_property("releases", MAX_LIST_LIMIT),
                    "offset": offset_property("releases")
                }),
                &["app_id"],
            ),
        },
        ToolDefinition {
            name: "get_release",
            description: "Get one release of an application by ID.",
            input_schema: object_schema(
                json!({ "app_id": app_id_property(), "release_id": id_property("release") }),
                &["app_id", "release_id"],
            ),
        },
        ToolDefinition {
            name: "search_releases",
            description: "Find releases whose version, status or notes contain the query. Filtering is client-side over one page of up to 100 releases starting at offset.",
            input_schema: object_schema(
                json!({
                    "app_id": app_id_property(),
                    "query": query_property("release version, status and notes"),
                    "limit": limit_property("results", MAX_SEARCH_LIMIT),
                    "offset": offset_property("releases")
                }),
                &["app_id", "query"],
            ),
        },
        ToolDefinition {
            name: "list_channels",
            description: "List release channels of an application.",
            input_schema: object_schema(
                json!({
                    "app_id": app_id_property(),
                    "limit": limit_property("channels", MAX_LIST_LIMIT),
                    "offset": offset_property("channels")
                }),
                &["app_id"],
            ),
        },
        ToolDefinition {
            name: "get_channel",
            description: "Get one channel of an application by ID.",
            input_schema: object_schema(
                json!({ "app_id": app_id_property(), "channel_id": id_property("channel") }),
                &["app_id", "channel_id"],
            ),
        },
        ToolDefinition {
            name: "search_channels",
            description: "Find channels whose name, slug or description contain the query. Filtering is client-side over one page of up to 100 channels starting at offset.",
            input_schema: object_schema(
                json!({
                    "app_id": app_id_property(),
                    "query": query_property("channel name, slug and description"),
                    "limit": limit_property("results", MAX_SEARCH_LIMIT),
                    "offset": offset_property("channels")
                }),
                &["app_id", "query"],
            ),
        },
        ToolDefinition {
            name: "list_customers",
            description: "List customers of an application, with license and channel assignment.",
            input_schema: object_schema(
                json!({
                    "app_id": app_id_property(),
                    "limit": limit_property("customers", MAX_LIST_LIMIT),
                    "offset": offset_property("customers")
                }),
                &["app_id"],
            ),
        },
        ToolDefinition {
            name: "get_customer",
            description: "Get one customer of an application by ID.",
            input_schema: object_schema(
                json!({ "app_id": app_id_property(), "customer_id": id_property("customer") }),
                &["app_id", "customer_id"],
            ),
        },
        ToolDefinition {
            name: "search_customers",
            description: "Find customers whose name, email, type, license or channel name contain the query. Filtering is client-side over one page of up to 100 customers starting at offset.",
            input_schema: object_schema(
                json!({
                    "app_id": app_id_property(),
                    "query": query_property("customer name, email, type, license and channel"),
                    "limit": limit_property("results", MAX_SEARCH_LIMIT),
                    "offset": offset_property("customers")
                }),
                &["app_id", "query"],
            ),
        },
    ]
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args.get(key).ok_or_else(|| {
        ToolError::new(
            VALIDATION_FAILED,
            format!("Missing required field '{key}'"),
        )
        .with_field(key)
    })?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Value::String(_) => Err(ToolError::new(
            VALIDATION_FAILED,
            format!("'{key}' must not be empty"),
        )
        .with_field(key)),
        _ => Err(
            ToolError::new(VALIDATION_FAILED, format!("'{key}' must be a string"))
                .with_field(key),
        ),
    }
}

/// A non-negative whole number within `min..=max`. JSON clients often send
/// `10.0` for 10, so integral floats are accepted.
fn arg_optional_count(
    args: &Map<String, Value>,
    key: &str,
    min: u32,
    max: u32,
) -> Result<Option<u32>, ToolError> {
    let not_integer = || {
        ToolError::new(
            VALIDATION_FAILED,
            format!("'{key}' must be a non-negative integer"),
        )
        .with_field(key)
    };

    let number = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(not_integer()),
    };
    let value = match number.as_u64() {
        Some(v) => v,
        None => match number.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => {
                f as u64
            }
            _ => return Err(not_integer()),
        },
    };

    if value < u64::from(min) || value > u64::from(max) {
        return Err(ToolError::new(
            VALIDATION_FAILED,
            format!("'{key}' must be between {min} and {max}, got {value}"),
        )
        .with_field(key));
    }
    Ok(Some(value as u32))
}

/// Decoded `list_applications` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListApplicationsRequest {
    pub limit: u32,
    pub offset: u32,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListApplicationsRequest {
    pub fn decode(args: &Map<String, Value>) -> Result<Self, ToolError> {
        Ok(Self {
            limit: arg_optional_count(args, "limit", 1, MAX_LIST_LIMIT)?
                .unwrap_or(DEFAULT_LIST_LIMIT),
            offset: arg_optional_count(args, "offset", 0, u32::MAX)?.unwrap_or(0),
            page: arg_optional_count(args, "page", 1, u32::MAX)?,
            page_size: arg_optional_count(args, "page_size", 1, MAX_PAGE_SIZE)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetApplicationRequest {
    pub app_id: String,
}

impl GetApplicationRequest {
    pub fn decode(args: &Map<String, Value>) -> Result<Self, ToolError> {
        Ok(Self {
            app_id: required_string(args, "app_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchApplicationsRequest {
    pub query: String,
    pub limit: u32,
    pub page: Option<u32>,
}

impl SearchApplicationsRequest {
    pub fn decode(args: &Map<String, Value>) -> Result<Self, ToolError> {
        Ok(Self {
            query: required_string(args, "query")?,
            limit: arg_optional_count(args, "limit", 1, MAX_SEARCH_LIMIT)?
                .unwrap_or(DEFAULT_SEARCH_LIMIT),
            page: arg_optional_count(args, "page", 1, u32::MAX)?,
        })
    }
}

/// `list_releases` / `list_channels` / `list_customers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScopedRequest {
    pub app_id: String,
    pub limit: u32,
    pub offset: u32,
}

impl ListScopedRequest {
    pub fn decode(args: &Map<String, Value>) -> Result<Self, ToolError> {
        Ok(Self {
            app_id: required_string(args, "app_id")?,
            limit: arg_optional_count(args, "limit", 1, MAX_LIST_LIMIT)?
                .unwrap_or(DEFAULT_LIST_LIMIT),
            offset: arg_optional_count(args, "offset", 0, u32::MAX)?.unwrap_or(0),
        })
    }
}

/// `get_release` / `get_channel` / `get_customer`; `id_key` names the
/// entity identifier argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetScopedRequest {
    pub app_id: String,
    pub id: String,
}

impl GetScopedRequest {
    pub fn decode(args: &Map<String, Value>, id_key: &str) -> Result<Self, ToolError> {
        Ok(Self {
            app_id: required_string(args, "app_id")?,
            id: required_string(args, id_key)?,
        })
    }
}

/// `search_releases` / `search_channels` / `search_customers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchScopedRequest {
    pub app_id: String,
    pub query: String,
    pub limit: u32,
    pub offset: u32,
}

impl SearchScopedRequest {
    pub fn decode(args: &Map<String, Value>) -> Result<Self, ToolError> {
        Ok(Self {
            app_id: required_string(args, "app_id")?,
            query: required_string(args, "query")?,
            limit: arg_optional_count(args, "limit", 1, MAX_SEARCH_LIMIT)?
                .unwrap_or(DEFAULT_SEARCH_LIMIT),
            offset: arg_optional_count(args, "offset", 0, u32::MAX)?.unwrap_or(0),
        })
    }
}

fn entity_value<E: Serialize>(key: &str, entity: &E) -> Result<Value, ToolError> {
    let value = serde_json::to_value(entity).map_err(|e| {
        ToolError::new("internal_error", format!("Failed to encode {key}: {e}"))
    })?;
    let mut payload = Map::new();
    payload.insert(key.to_string(), value);
    Ok(Value::Object(payload))
}

pub async fn execute_tool<T: Transport>(
    client: &VendorClient<T>,
    tool_name: &str,
    args: &Map<String, Value>,
) -> Result<Value, ToolError> {
    match tool_name {
        "list_applications" => list_applications(client, ListApplicationsRequest::decode(args)?).await,
        "get_application" => {
            let request = GetApplicationRequest::decode(args)?;
            let app = client.applications().get(&request.app_id).await?;
            entity_value("application", &app)
        }
        "search_applications" => {
            search_applications(client, SearchApplicationsRequest::decode(args)?).await
        }
        "list_releases" => list_scoped(client.releases(), ListScopedRequest::decode(args)?).await,
        "get_release" => {
            get_scoped(client.releases(), GetScopedRequest::decode(args, "release_id")?).await
        }
        "search_releases" => {
            search_scoped(client.releases(), SearchScopedRequest::decode(args)?).await
        }
        "list_channels" => list_scoped(client.channels(), ListScopedRequest::decode(args)?).await,
        "get_channel" => {
            get_scoped(client.channels(), GetScopedRequest::decode(args, "channel_id")?).await
        }
        "search_channels" => {
            search_scoped(client.channels(), SearchScopedRequest::decode(args)?).await
        }
        "list_customers" => {
            list_scoped(client.customers(), ListScopedRequest::decode(args)?).await
        }
        "get_customer" => {
            get_scoped(client.customers(), GetScopedRequest::decode(args, "customer_id")?).await
        }
        "search_customers" => {
            search_scoped(client.customers(), SearchScopedRequest::decode(args)?).await
        }
        _ => Err(
            ToolError::new("unknown_tool", format!("Unknown tool '{tool_name}'"))
                .with_field("name")
                .with_docs_hint("Call tools/list for the available tool names."),
        ),
    }
}

async fn list_applications<T: Transport>(
    client: &VendorClient<T>,
    request: ListApplicationsRequest,
) -> Result<Value, ToolError> {
    let options = ListOptions {
        page: request.page,
        page_size: request.page_size,
        ..ListOptions::default()
    };
    let page = client
        .applications()
        .list(options)
        .await?
        .window(request.offset as usize, Some(request.limit as usize));
    Ok(page.to_value("applications"))
}

async fn search_applications<T: Transport>(
    client: &VendorClient<T>,
    request: SearchApplicationsRequest,
) -> Result<Value, ToolError> {
    let options = ListOptions {
        page: request.page,
        page_size: Some(request.limit),
        ..ListOptions::default()
    };
    let page = client
        .applications()
        .search(&request.query, options)
        .await?
        .window(0, Some(request.limit as usize));
    let mut payload = page.to_value("applications");
    payload["query"] = Value::String(request.query);
    Ok(payload)
}

async fn list_scoped<E: Entity, T: Transport>(
    service: AppScoped<'_, E, T>,
    request: ListScopedRequest,
) -> Result<Value, ToolError> {
    let page = service
        .list(
            &request.app_id,
            ListOptions::limit_offset(request.limit, request.offset),
        )
        .await?;
    let mut payload = page.to_value(E::COLLECTION);
    payload["app_id"] = Value::String(request.app_id);
    Ok(payload)
}

async fn get_scoped<E: Entity, T: Transport>(
    service: AppScoped<'_, E, T>,
    request: GetScopedRequest,
) -> Result<Value, ToolError> {
    let entity = service.get(&request.app_id, &request.id).await?;
    entity_value(E::KIND, &entity)
}

async fn search_scoped<E: Entity, T: Transport>(
    service: AppScoped<'_, E, T>,
    request: SearchScopedRequest,
) -> Result<Value, ToolError> {
    let page = service
        .list_and_filter(
            &request.app_id,
            &request.query,
            ListOptions::limit_offset(request.limit, request.offset),
        )
        .await?;
    let mut payload = page.to_value(E::COLLECTION);
    payload["app_id"] = Value::String(request.app_id);
    payload["query"] = Value::String(request.query);
    payload["search_mode"] = Value::String("client_side".to_string());
    Ok(payload)
}

pub(crate) fn success_envelope(tool_name: &str, data: Value) -> Value {
    json!({
        "status": "ok",
        "tool": tool_name,
        "data": data
    })
}

pub(crate) fn error_envelope(tool_name: &str, error: &ToolError) -> Value {
    json!({
        "status": "error",
        "tool": tool_name,
        "error": error.to_value()
    })
}

/// Agents read the text block, so it carries the whole envelope.
pub(crate) fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}
