use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Db(#[from] wahoo_db::DbError),

    #[error("Unmappable event: {0}")]
    Unmappable(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
