use replicated_core::Channel;

use super::Entity;

impl Entity for Channel {
    const KIND: &'static str = "channel";
    const COLLECTION: &'static str = "channels";
    const LIST_OPERATION: &'static str = "list channels";
    const GET_OPERATION: &'static str = "get channel";

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.channel_slug.as_str(),
            self.description.as_str(),
        ]
    }
}
