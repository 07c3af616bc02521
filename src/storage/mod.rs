mod preferences;
mod schema;

pub use schema::{Database, DatabaseError};
