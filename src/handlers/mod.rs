//! HTTP handlers for the tenant schema manager and tenant resolution.

pub mod resolve;
pub mod schema;
pub use resolve::*;
pub use schema::*;
