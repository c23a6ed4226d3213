use replicated_core::Release;

use super::Entity;

impl Entity for Release {
    const KIND: &'static str = "release";
    const COLLECTION: &'static str = "releases";
    const LIST_OPERATION: &'static str = "list releases";
    const GET_OPERATION: &'static str = "get release";

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.version.as_str(), self.status.as_str(), self.notes.as_str()]
    }
}
