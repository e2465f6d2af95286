mod error;
mod models;
mod options;
mod repository;
mod schema;

pub use error::DbError;
pub use models::*;
pub use options::*;
pub use repository::{DB_FILE_NAME, Store, UpsertOutcome};
