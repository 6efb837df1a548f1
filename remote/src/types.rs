use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One catalog record as served by `/template/info`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "filename", default)]
    pub file: String,
    #[serde(rename = "signature", default)]
    pub signatures: HashMap<String, String>,
    #[serde(default)]
    pub hash: TemplateHash,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateHash {
    #[serde(alias = "Md5", default)]
    pub md5: String,
    #[serde(alias = "Sha256", default)]
    pub sha256: String,
}

/// Progress event for one archive transfer. `total` is absent when the
/// repository did not declare a Content-Length.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub current: u64,
    pub total: Option<u64>,
    pub error: Option<String>,
}
