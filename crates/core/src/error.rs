#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Unknown quality tier: {0}")]
    UnknownQuality(String),

    #[error("Base image is required")]
    MissingBaseImage,
}
