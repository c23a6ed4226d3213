//! Per-entity list/get/search operations over the vendor API.
//!
//! Applications are top-level and support real server-side search.
//! Releases, channels and customers are scoped to an application and have
//! no search endpoint, so their "search" is `list_and_filter`: one list
//! call with a large page, then a case-insensitive substring scan.

mod applications;
mod channels;
mod customers;
mod releases;

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use replicated_core::Validate;

use crate::client::{ApiRequest, ClientError, Transport, ValidationMode, VendorClient};

pub use applications::Applications;

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
/// Page size used to fetch candidates for client-side filtering.
pub const SEARCH_SCAN_PAGE_SIZE: u32 = 100;

/// A decoded vendor entity and how it is addressed.
pub trait Entity: Serialize + DeserializeOwned + Validate + Send + Sync + 'static {
    /// Singular wire name; also the envelope key for single-entity responses.
    const KIND: &'static str;
    /// Plural wire name used in list paths and list envelopes.
    const COLLECTION: &'static str;
    const LIST_OPERATION: &'static str;
    const GET_OPERATION: &'static str;

    fn id(&self) -> &str;

    /// Text fields matched by client-side search.
    fn search_fields(&self) -> Vec<&str>;
}

/// Pagination knobs. Zero or `None` means "not sent".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListOptions {
    pub fn limit_offset(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            ..Self::default()
        }
    }

    pub fn paged(page: u32, page_size: u32) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    fn positive(value: Option<u32>) -> Option<u32> {
        value.filter(|v| *v > 0)
    }

    pub(crate) fn apply_limit_offset(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(limit) = Self::positive(self.limit) {
            request = request.query("limit", limit);
        }
        if let Some(offset) = Self::positive(self.offset) {
            request = request.query("offset", offset);
        }
        request
    }

    pub(crate) fn apply_paging(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(page) = Self::positive(self.page) {
            request = request.query("page", page);
        }
        if let Some(page_size) = Self::positive(self.page_size) {
            request = request.query("page_size", page_size);
        }
        request
    }
}

/// One page of entities plus whatever pagination metadata the API sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: Option<u64>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A fully materialised result with no further pages.
    pub fn complete(items: Vec<T>) -> Self {
        let len = items.len() as u64;
        Self {
            items,
            total_count: Some(len),
            page: Some(1),
            page_size: Some(len),
            has_more: false,
        }
    }

    /// Keep `limit` items starting at `offset`; metadata is untouched.
    pub fn window(mut self, offset: usize, limit: Option<usize>) -> Self {
        let end = match limit {
            Some(limit) if limit > 0 => offset.saturating_add(limit).min(self.items.len()),
            _ => self.items.len(),
        };
        self.items = if offset >= self.items.len() {
            Vec::new()
        } else {
            self.items.drain(offset..end).collect()
        };
        self
    }
}

impl<T: Serialize> Page<T> {
    /// JSON body with the items under `key` (e.g. "releases").
    pub fn to_value(&self, key: &str) -> Value {
        let mut payload = serde_json::Map::new();
        payload.insert(
            key.to_string(),
            serde_json::to_value(&self.items).unwrap_or(Value::Array(Vec::new())),
        );
        payload.insert("total_count".to_string(), serde_json::json!(self.total_count));
        payload.insert("page".to_string(), serde_json::json!(self.page));
        payload.insert("page_size".to_string(), serde_json::json!(self.page_size));
        payload.insert("has_more".to_string(), Value::Bool(self.has_more));
        Value::Object(payload)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    page: Option<u64>,
    #[serde(default)]
    page_size: Option<u64>,
    #[serde(default)]
    has_more: Option<bool>,
}

/// Decode a list envelope: items under `data` or the collection key, or
/// a bare array.
pub(crate) fn decode_page<E: Entity>(
    operation: &'static str,
    body: Value,
) -> Result<Page<E>, ClientError> {
    let (items, meta) = match body {
        Value::Array(items) => (Value::Array(items), PageMeta::default()),
        Value::Object(mut map) => {
            let items = map
                .remove("data")
                .filter(|v| !v.is_null())
                .or_else(|| map.remove(E::COLLECTION))
                .filter(|v| !v.is_null())
                .unwrap_or(Value::Array(Vec::new()));
            let meta = serde_json::from_value::<PageMeta>(Value::Object(map))
                .map_err(|source| ClientError::Decode { operation, source })?;
            (items, meta)
        }
        Value::Null => (Value::Array(Vec::new()), PageMeta::default()),
        other => {
            return Err(ClientError::Decode {
                operation,
                source: serde::de::Error::custom(format!(
                    "expected a list envelope, got {}",
                    json_kind(&other)
                )),
            });
        }
    };

    let items: Vec<E> =
        serde_json::from_value(items).map_err(|source| ClientError::Decode { operation, source })?;
    Ok(Page {
        items,
        total_count: meta.total_count,
        page: meta.page,
        page_size: meta.page_size,
        has_more: meta.has_more.unwrap_or(false),
    })
}

/// Decode a single entity, unwrapping `{"<kind>": {...}}` when present.
pub(crate) fn decode_entity<E: Entity>(
    operation: &'static str,
    body: Value,
) -> Result<E, ClientError> {
    let body = match body {
        Value::Object(mut map) if map.get(E::KIND).is_some_and(Value::is_object) => {
            map.remove(E::KIND).unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(body).map_err(|source| ClientError::Decode { operation, source })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Run the entity validator over decoded data. Advisory mode logs and
/// lets the data through; strict mode fails on the first invalid entity.
pub(crate) fn screen<'a, E: Entity>(
    mode: ValidationMode,
    operation: &'static str,
    entities: impl IntoIterator<Item = &'a E>,
) -> Result<(), ClientError> {
    for (index, entity) in entities.into_iter().enumerate() {
        if let Err(err) = entity.validate() {
            match mode {
                ValidationMode::Advisory => tracing::warn!(
                    operation,
                    entity = E::KIND,
                    index,
                    id = entity.id(),
                    error = %err,
                    "vendor API returned an entity that fails validation"
                ),
                ValidationMode::Strict => return Err(ClientError::Validation(err)),
            }
        }
    }
    Ok(())
}

/// A required identifier: non-blank and a single path segment.
pub(crate) fn require_id<'a>(value: &'a str, label: &str) -> Result<&'a str, ClientError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::invalid(format!("{label} is required")));
    }
    if trimmed.contains('/') || trimmed == "." || trimmed == ".." {
        return Err(ClientError::invalid(format!(
            "{label} must be a single path segment, got '{trimmed}'"
        )));
    }
    Ok(trimmed)
}

pub(crate) fn require_query(query: &str) -> Result<&str, ClientError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ClientError::invalid("search query is required"));
    }
    Ok(trimmed)
}

/// Case-insensitive substring match over an entity's search fields.
pub fn matches_query<E: Entity>(entity: &E, query: &str) -> bool {
    let needle = query.to_lowercase();
    entity
        .search_fields()
        .into_iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// List/get/list-and-filter for an entity that lives under an application:
/// `/v3/app/{app_id}/{collection}` and `/v3/app/{app_id}/{kind}/{id}`.
pub struct AppScoped<'a, E, T = crate::client::HttpTransport> {
    client: &'a VendorClient<T>,
    _entity: PhantomData<fn() -> E>,
}

pub type Releases<'a, T = crate::client::HttpTransport> =
    AppScoped<'a, replicated_core::Release, T>;
pub type Channels<'a, T = crate::client::HttpTransport> =
    AppScoped<'a, replicated_core::Channel, T>;
pub type Customers<'a, T = crate::client::HttpTransport> =
    AppScoped<'a, replicated_core::Customer, T>;

impl<'a, E: Entity, T: Transport> AppScoped<'a, E, T> {
    pub fn new(client: &'a VendorClient<T>) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    pub async fn list(&self, app_id: &str, options: ListOptions) -> Result<Page<E>, ClientError> {
        let app_id = require_id(app_id, "application ID")?;
        let operation = E::LIST_OPERATION;
        let request = options.apply_limit_offset(ApiRequest::new(["v3", "app", app_id, E::COLLECTION]));

        let body = self.client.get_json(operation, &request).await?;
        let page = decode_page::<E>(operation, body)?;
        screen(self.client.validation_mode(), operation, &page.items)?;
        tracing::info!(
            operation,
            app_id,
            count = page.items.len(),
            total_count = page.total_count,
            "listed {}",
            E::COLLECTION
        );
        Ok(page)
    }

    pub async fn get(&self, app_id: &str, id: &str) -> Result<E, ClientError> {
        let app_id = require_id(app_id, "application ID")?;
        let id = require_id(id, &format!("{} ID", E::KIND))?;
        let operation = E::GET_OPERATION;
        let request = ApiRequest::new(["v3", "app", app_id, E::KIND, id]);

        let body = self.client.get_json(operation, &request).await?;
        let entity = decode_entity::<E>(operation, body)?;
        screen(self.client.validation_mode(), operation, [&entity])?;
        tracing::info!(operation, app_id, id, "fetched {}", E::KIND);
        Ok(entity)
    }

    /// Client-side search: fetch up to [`SEARCH_SCAN_PAGE_SIZE`] entities at
    /// the requested offset and keep those whose search fields contain the
    /// query. Costs one full list call regardless of how many match.
    pub async fn list_and_filter(
        &self,
        app_id: &str,
        query: &str,
        options: ListOptions,
    ) -> Result<Page<E>, ClientError> {
        let query = require_query(query)?;
        let app_id = require_id(app_id, "application ID")?;
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_SEARCH_LIMIT) as usize;

        let scan = self
            .list(
                app_id,
                ListOptions {
                    limit: Some(SEARCH_SCAN_PAGE_SIZE),
                    offset: options.offset,
                    ..ListOptions::default()
                },
            )
            .await?;
        let scanned = scan.items.len();
        let matches: Vec<E> = scan
            .items
            .into_iter()
            .filter(|entity| matches_query(entity, query))
            .take(limit)
            .collect();
        tracing::debug!(
            app_id,
            query,
            scanned,
            matched = matches.len(),
            "filtered {} client-side",
            E::COLLECTION
        );
        Ok(Page::complete(matches))
    }
}

impl<T: Transport> VendorClient<T> {
    pub fn applications(&self) -> Applications<'_, T> {
        Applications::new(self)
    }

    pub fn releases(&self) -> Releases<'_, T> {
        AppScoped::new(self)
    }

    pub fn channels(&self) -> Channels<'_, T> {
        AppScoped::new(self)
    }

    pub fn customers(&self) -> Customers<'_, T> {
        AppScoped::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicated_core::Application;
    use serde_json::json;

    #[test]
    fn list_options_only_send_positive_values() {
        let request = ListOptions::limit_offset(0, 0).apply_limit_offset(ApiRequest::new(["x"]));
        assert!(request.query.is_empty());

        let request = ListOptions::limit_offset(25, 50).apply_limit_offset(ApiRequest::new(["x"]));
        assert_eq!(request.query_value("limit"), Some("25"));
        assert_eq!(request.query_value("offset"), Some("50"));

        let request = ListOptions::paged(2, 0).apply_paging(ApiRequest::new(["x"]));
        assert_eq!(request.query_value("page"), Some("2"));
        assert_eq!(request.query_value("page_size"), None);
    }

    #[test]
    fn window_slices_and_handles_out_of_range_offsets() {
        let page = Page {
            items: vec![1, 2, 3, 4, 5],
            total_count: Some(42),
            page: None,
            page_size: None,
            has_more: true,
        };
        assert_eq!(page.clone().window(1, Some(2)).items, vec![2, 3]);
        assert_eq!(page.clone().window(3, Some(10)).items, vec![4, 5]);
        assert_eq!(page.clone().window(0, None).items, vec![1, 2, 3, 4, 5]);
        let empty = page.window(9, Some(2));
        assert!(empty.items.is_empty());
        assert_eq!(empty.total_count, Some(42));
    }

    #[test]
    fn decode_page_accepts_data_collection_key_or_bare_array() {
        let from_data = decode_page::<Application>(
            "test",
            json!({"data": [{"id": "a"}], "total_count": 7, "has_more": true}),
        )
        .unwrap();
        assert_eq!(from_data.items.len(), 1);
        assert_eq!(from_data.total_count, Some(7));
        assert!(from_data.has_more);

        let from_key =
            decode_page::<Application>("test", json!({"applications": [{"id": "a"}, {"id": "b"}]}))
                .unwrap();
        assert_eq!(from_key.items.len(), 2);
        assert_eq!(from_key.total_count, None);

        let bare = decode_page::<Application>("test", json!([{"id": "a"}])).unwrap();
        assert_eq!(bare.items[0].id, "a");

        let err = decode_page::<Application>("list applications", json!("nope")).unwrap_err();
        assert_eq!(err.code(), "decode_error");
    }

    #[test]
    fn decode_entity_unwraps_named_envelope() {
        let wrapped: replicated_core::Release =
            decode_entity("test", json!({"release": {"id": "r1", "version": "1.0.0"}})).unwrap();
        assert_eq!(wrapped.id, "r1");
        let bare: replicated_core::Release =
            decode_entity("test", json!({"id": "r2", "version": "1.0.0"})).unwrap();
        assert_eq!(bare.id, "r2");
    }

    #[test]
    fn identifiers_must_be_single_non_blank_segments() {
        assert_eq!(require_id(" app-1 ", "application ID").unwrap(), "app-1");
        assert_eq!(
            require_id("  ", "application ID").unwrap_err().to_string(),
            "application ID is required"
        );
        assert!(require_id("a/b", "release ID").is_err());
        assert!(require_id("..", "release ID").is_err());
        assert_eq!(
            require_query("\t ").unwrap_err().to_string(),
            "search query is required"
        );
    }
}
