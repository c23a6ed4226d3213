use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use url::Url;

use replicated_mcp_runtime::client::{
    ClientError, ClientOptions, HttpTransport, USER_AGENT, VendorClient,
};
use replicated_mcp_runtime::resilience::RetryPolicy;
use replicated_mcp_runtime::server::McpServer;
use replicated_mcp_runtime::services::ListOptions;

const TOKEN: &str = "test-token";

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    user_agent: Option<String>,
}

#[derive(Clone, Default)]
struct FakeVendor {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeVendor {
    fn record(&self, headers: &HeaderMap, uri: &Uri) -> bool {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let recorded = Recorded {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            authorization: header("authorization"),
            user_agent: header("user-agent"),
        };
        let authorized = recorded.authorization.as_deref() == Some(TOKEN);
        self.requests.lock().unwrap().push(recorded);
        authorized
    }

    fn last(&self) -> Recorded {
        self.requests.lock().unwrap().last().cloned().expect("a request was recorded")
    }
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Unauthorized", "details": "invalid token"})),
    )
}

fn app_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("App {id}"),
        "slug": format!("app-{id}"),
        "team_id": "team-1",
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-02T00:00:00Z",
        "is_active": true
    })
}

fn release_json(id: &str, version: &str, notes: &str) -> Value {
    json!({
        "id": id,
        "application_id": "app-1",
        "version": version,
        "sequence": 3,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z",
        "released_at": "2024-01-01T00:00:00Z",
        "notes": notes,
        "status": "released"
    })
}

async fn list_applications(
    State(vendor): State<FakeVendor>,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    if !vendor.record(&headers, &uri) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "applications": [app_json("1"), app_json("2")],
            "total_count": 2
        })),
    )
}

async fn get_application(
    State(vendor): State<FakeVendor>,
    Path(id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    if !vendor.record(&headers, &uri) {
        return unauthorized();
    }
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Not Found", "details": "no application 'missing'"})),
        );
    }
    (StatusCode::OK, Json(app_json(&id)))
}

async fn list_releases(
    State(vendor): State<FakeVendor>,
    Path(_app_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    if !vendor.record(&headers, &uri) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "releases": [
                release_json("r1", "1.0.0", "initial"),
                release_json("r2", "1.1.0", "hotfix for login"),
                release_json("r3", "2.0.0", "new dashboard")
            ],
            "total_count": 3
        })),
    )
}

async fn get_release(
    State(vendor): State<FakeVendor>,
    Path((_app_id, id)): Path<(String, String)>,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    if !vendor.record(&headers, &uri) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({ "release": release_json(&id, "1.2.3", "wrapped") })),
    )
}

async fn spawn_vendor() -> (SocketAddr, FakeVendor) {
    let vendor = FakeVendor::default();
    let app = Router::new()
        .route("/vendor/v1/applications", get(list_applications))
        .route("/vendor/v1/applications/{id}", get(get_application))
        .route("/vendor/v3/app/{app_id}/releases", get(list_releases))
        .route("/vendor/v3/app/{app_id}/release/{id}", get(get_release))
        .with_state(vendor.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, vendor)
}

fn vendor_client(addr: SocketAddr, token: &str) -> VendorClient {
    let endpoint = Url::parse(&format!("http://{addr}/vendor")).unwrap();
    let transport = HttpTransport::new(endpoint, token).unwrap();
    VendorClient::new(
        transport,
        ClientOptions {
            retry: RetryPolicy::none(),
            rate_limit: None,
            ..ClientOptions::default()
        },
    )
}

#[tokio::test]
async fn sends_the_raw_token_and_user_agent() {
    let (addr, vendor) = spawn_vendor().await;
    let client = vendor_client(addr, TOKEN);

    let page = client.applications().list(ListOptions::default()).await.unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_count, Some(2));
    let request = vendor.last();
    assert_eq!(request.path, "/vendor/v1/applications");
    assert_eq!(request.authorization.as_deref(), Some(TOKEN));
    assert_eq!(request.user_agent.as_deref(), Some(USER_AGENT));
}

#[tokio::test]
async fn forwards_limit_and_offset_for_scoped_lists() {
    let (addr, vendor) = spawn_vendor().await;
    let client = vendor_client(addr, TOKEN);

    let page = client
        .releases()
        .list("app-1", ListOptions::limit_offset(5, 10))
        .await
        .unwrap();

    assert_eq!(page.items.len(), 3);
    let request = vendor.last();
    assert_eq!(request.path, "/vendor/v3/app/app-1/releases");
    let query = request.query.unwrap_or_default();
    assert!(query.contains("limit=5"), "query was {query}");
    assert!(query.contains("offset=10"), "query was {query}");
}

#[tokio::test]
async fn unwraps_the_single_release_envelope() {
    let (addr, vendor) = spawn_vendor().await;
    let client = vendor_client(addr, TOKEN);

    let release = client.releases().get("app-1", "r7").await.unwrap();

    assert_eq!(release.id, "r7");
    assert_eq!(release.version, "1.2.3");
    assert_eq!(vendor.last().path, "/vendor/v3/app/app-1/release/r7");
}

#[tokio::test]
async fn not_found_keeps_status_and_details() {
    let (addr, _vendor) = spawn_vendor().await;
    let client = vendor_client(addr, TOKEN);

    let err = client.applications().get("missing").await.unwrap_err();

    assert_eq!(err.code(), "not_found");
    assert_eq!(err.api_status(), Some(404));
    let text = err.to_string();
    assert!(text.contains("404"), "{text}");
    assert!(text.contains("no application 'missing'"), "{text}");
}

#[tokio::test]
async fn wrong_token_is_unauthorized_and_not_retried() {
    let (addr, vendor) = spawn_vendor().await;
    let client = VendorClient::new(
        HttpTransport::new(
            Url::parse(&format!("http://{addr}/vendor")).unwrap(),
            "wrong-token",
        )
        .unwrap(),
        ClientOptions {
            rate_limit: None,
            ..ClientOptions::default()
        },
    );

    let err = client.applications().list(ListOptions::default()).await.unwrap_err();

    assert!(matches!(err, ClientError::Api { .. }));
    assert_eq!(err.code(), "unauthorized");
    assert_eq!(vendor.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn search_releases_tool_call_round_trips_over_http() {
    let (addr, _vendor) = spawn_vendor().await;
    let server = McpServer::new(Arc::new(vendor_client(addr, TOKEN)));

    let response = server
        .handle_incoming_message(json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {
                "name": "search_releases",
                "arguments": {"app_id": "app-1", "query": "HOTFIX"}
            }
        }))
        .await
        .expect("requests get a response");

    assert_eq!(response["id"], 9);
    let result = &response["result"];
    assert!(result.get("isError").is_none());
    let envelope = &result["structuredContent"];
    assert_eq!(envelope["status"], "ok");
    assert_eq!(envelope["tool"], "search_releases");
    let releases = envelope["data"]["releases"].as_array().unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0]["id"], "r2");
    assert_eq!(envelope["data"]["search_mode"], "client_side");
}
