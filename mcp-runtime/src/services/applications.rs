use replicated_core::Application;

use super::{
    Entity, ListOptions, Page, decode_entity, decode_page, require_id, require_query, screen,
};
use crate::client::{ApiRequest, ClientError, Transport, VendorClient};

impl Entity for Application {
    const KIND: &'static str = "application";
    const COLLECTION: &'static str = "applications";
    const LIST_OPERATION: &'static str = "list applications";
    const GET_OPERATION: &'static str = "get application";

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.slug.as_str(), self.description.as_str()]
    }
}

const SEARCH_OPERATION: &str = "search applications";

/// Top-level applications: `/v1/applications[/{id}|/search]`.
pub struct Applications<'a, T = crate::client::HttpTransport> {
    client: &'a VendorClient<T>,
}

impl<'a, T: Transport> Applications<'a, T> {
    pub fn new(client: &'a VendorClient<T>) -> Self {
        Self { client }
    }

    /// Sends `page`/`page_size` when positive.
    pub async fn list(&self, options: ListOptions) -> Result<Page<Application>, ClientError> {
        let operation = Application::LIST_OPERATION;
        let request = options.apply_paging(ApiRequest::new(["v1", "applications"]));

        let body = self.client.get_json(operation, &request).await?;
        let page = decode_page::<Application>(operation, body)?;
        screen(self.client.validation_mode(), operation, &page.items)?;
        tracing::info!(
            count = page.items.len(),
            total_count = page.total_count,
            "listed applications"
        );
        Ok(page)
    }

    pub async fn get(&self, id: &str) -> Result<Application, ClientError> {
        let id = require_id(id, "application ID")?;
        let operation = Application::GET_OPERATION;
        let request = ApiRequest::new(["v1", "applications", id]);

        let body = self.client.get_json(operation, &request).await?;
        let app = decode_entity::<Application>(operation, body)?;
        screen(self.client.validation_mode(), operation, [&app])?;
        tracing::info!(app_id = id, "fetched application");
        Ok(app)
    }

    /// Server-side search via `q`.
    pub async fn search(
        &self,
        query: &str,
        options: ListOptions,
    ) -> Result<Page<Application>, ClientError> {
        let query = require_query(query)?;
        let request =
            options.apply_paging(ApiRequest::new(["v1", "applications", "search"]).query("q", query));

        let body = self.client.get_json(SEARCH_OPERATION, &request).await?;
        let page = decode_page::<Application>(SEARCH_OPERATION, body)?;
        screen(self.client.validation_mode(), SEARCH_OPERATION, &page.items)?;
        tracing::info!(query, count = page.items.len(), "searched applications");
        Ok(page)
    }
}
