pub mod id;
pub mod models;

pub use id::{prefixed_ulid, ticket_room};
