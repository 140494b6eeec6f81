use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZollError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid package URL: {0}")]
    Validation(String),

    #[error("Report publish error: {0}")]
    Publish(String),

    #[error("Task not found: {0}")]
    TaskNotFound(u64),

    #[error("Report not found: {0}")]
    ReportNotFound(String),
}
