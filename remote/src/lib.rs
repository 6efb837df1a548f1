mod client;
mod error;
mod types;

pub use client::RepoClient;
pub use error::RepoError;
pub use types::{DownloadProgress, TemplateHash, TemplateInfo};
