//! `replicated://` resource templates, resolved through the entity services.

use serde::Serialize;
use serde_json::{Value, json};

use crate::client::{ClientError, Transport, VendorClient};
use crate::rpc::{RpcError, to_pretty_json};
use crate::tools::ToolError;

pub const SCHEME: &str = "replicated://";
const MIME_TYPE: &str = "application/json";

#[derive(Debug)]
pub struct ResourceTemplate {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn resource_templates() -> Vec<ResourceTemplate> {
    vec![
        ResourceTemplate {
            uri_template: "replicated://applications/{app_id}",
            name: "Application Data",
            description: "A single application",
        },
        ResourceTemplate {
            uri_template: "replicated://applications/{app_id}/releases/{release_id}",
            name: "Release Data",
            description: "A single release of an application",
        },
        ResourceTemplate {
            uri_template: "replicated://applications/{app_id}/channels/{channel_id}",
            name: "Channel Data",
            description: "A single channel of an application",
        },
        ResourceTemplate {
            uri_template: "replicated://applications/{app_id}/customers/{customer_id}",
            name: "Customer Data",
            description: "A single customer of an application",
        },
    ]
}

pub fn templates_list_payload() -> Value {
    let templates: Vec<Value> = resource_templates()
        .into_iter()
        .map(|t| {
            json!({
                "uriTemplate": t.uri_template,
                "name": t.name,
                "description": t.description,
                "mimeType": MIME_TYPE
            })
        })
        .collect();
    json!({ "resourceTemplates": templates })
}

/// A concrete resource URI matched against one of the templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Application { app_id: String },
    Release { app_id: String, release_id: String },
    Channel { app_id: String, channel_id: String },
    Customer { app_id: String, customer_id: String },
}

impl ResourceUri {
    pub fn parse(uri: &str) -> Result<Self, RpcError> {
        let unknown = || {
            let templates: Vec<&str> = resource_templates()
                .iter()
                .map(|t| t.uri_template)
                .collect();
            RpcError::invalid_params(format!("Unknown resource URI '{uri}'"))
                .with_data(json!({ "templates": templates }))
        };

        let rest = uri.strip_prefix(SCHEME).ok_or_else(unknown)?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(RpcError::invalid_params(format!(
                "Resource URI '{uri}' has an empty segment"
            )));
        }

        match segments.as_slice() {
            ["applications", app_id] => Ok(Self::Application {
                app_id: app_id.to_string(),
            }),
            ["applications", app_id, "releases", id] => Ok(Self::Release {
                app_id: app_id.to_string(),
                release_id: id.to_string(),
            }),
            ["applications", app_id, "channels", id] => Ok(Self::Channel {
                app_id: app_id.to_string(),
                channel_id: id.to_string(),
            }),
            ["applications", app_id, "customers", id] => Ok(Self::Customer {
                app_id: app_id.to_string(),
                customer_id: id.to_string(),
            }),
            _ => Err(unknown()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Application { .. } => "application",
            Self::Release { .. } => "release",
            Self::Channel { .. } => "channel",
            Self::Customer { .. } => "customer",
        }
    }
}

fn client_error(err: ClientError) -> RpcError {
    match err {
        ClientError::InvalidArgument(message) => RpcError::invalid_params(message),
        other => {
            let message = other.to_string();
            RpcError::internal(message).with_data(ToolError::from(other).to_value())
        }
    }
}

fn encode<E: Serialize>(entity: &E) -> Result<Value, RpcError> {
    serde_json::to_value(entity)
        .map_err(|e| RpcError::internal(format!("Failed to encode resource: {e}")))
}

/// `resources/read`: fetch the entity and return it as one JSON text item.
pub async fn read_resource<T: Transport>(
    client: &VendorClient<T>,
    uri: &str,
) -> Result<Value, RpcError> {
    let target = ResourceUri::parse(uri)?;
    let body = match &target {
        ResourceUri::Application { app_id } => {
            encode(&client.applications().get(app_id).await.map_err(client_error)?)?
        }
        ResourceUri::Release { app_id, release_id } => encode(
            &client
                .releases()
                .get(app_id, release_id)
                .await
                .map_err(client_error)?,
        )?,
        ResourceUri::Channel { app_id, channel_id } => encode(
            &client
                .channels()
                .get(app_id, channel_id)
                .await
                .map_err(client_error)?,
        )?,
        ResourceUri::Customer {
            app_id,
            customer_id,
        } => encode(
            &client
                .customers()
                .get(app_id, customer_id)
                .await
                .map_err(client_error)?,
        )?,
    };
    tracing::info!(uri, kind = target.kind(), "resource read");

    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": MIME_TYPE,
            "text": to_pretty_json(&body)
        }]
    }))
}
