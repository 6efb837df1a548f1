use crate::types::TemplateInfo;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("multiple templates named {name} in repository")]
    Ambiguous {
        name: String,
        candidates: Vec<TemplateInfo>,
    },

    #[error("download failed: empty template id")]
    EmptyId,

    #[error("repository returned status {0}")]
    Status(u16),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
