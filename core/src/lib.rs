//! Vendor-portal entity models and their validation rules.
//!
//! Every entity is plain value data decoded from a vendor API response.
//! Relationships between entities are carried as string IDs only.

pub mod application;
pub mod channel;
pub mod customer;
mod de;
pub mod error;
pub mod release;
pub mod validation;

pub use application::Application;
pub use channel::Channel;
pub use customer::{Customer, CustomerType, LicenseType};
pub use error::ValidationError;
pub use release::{Release, ReleaseStatus};
pub use validation::Validate;
