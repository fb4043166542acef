use thiserror::Error;

/// Errors raised while loading or validating the static catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to parse catalog document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate domestic event id {0}")]
    DuplicateEventId(u32),

    #[error("catalog section '{0}' is empty")]
    EmptySection(&'static str),

    #[error("cooperation parameter '{0}' of kind '{1}' is missing its options list")]
    MissingOptions(String, &'static str),
}
