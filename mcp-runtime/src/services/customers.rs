use replicated_core::Customer;

use super::Entity;

impl Entity for Customer {
    const KIND: &'static str = "customer";
    const COLLECTION: &'static str = "customers";
    const LIST_OPERATION: &'static str = "list customers";
    const GET_OPERATION: &'static str = "get customer";

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.email.as_str(),
            self.customer_type.as_str(),
            self.license_id.as_str(),
            self.license_type.as_str(),
            self.channel_name.as_str(),
        ]
    }
}
