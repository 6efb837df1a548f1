use std::collections::HashMap;
use strata_remote::{TemplateHash, TemplateInfo};

/// One template import in flight. Constructed from the request
/// selector, filled in as resolution, verification and download
/// proceed, and discarded once the deploy completes.
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub owner: Vec<String>,
    pub version: String,
    pub branch: String,
    pub signatures: HashMap<String, String>,
    pub hash: TemplateHash,
    /// Cache file name when the template was resolved locally.
    pub file: String,
    /// Repository lookup failed or was skipped; only best-effort
    /// verification is possible.
    pub local: bool,
}

impl Template {
    /// Parse the request selector: `id:<id>`, `owner/name`, or a bare
    /// name.
    pub fn parse_selector(&mut self, selector: &str) {
        if let Some(id) = selector.strip_prefix("id:") {
            self.id = id.to_string();
        } else if let Some((owner, name)) = selector.split_once('/') {
            self.owner.push(owner.to_string());
            self.name = name.to_string();
        } else {
            self.name = selector.to_string();
        }
    }

    /// Adopt the resolved catalog record. The local cache file name is
    /// deliberately not taken over: a repository archive is always
    /// staged under its content id.
    pub fn absorb(&mut self, info: TemplateInfo) {
        self.id = info.id;
        self.name = info.name;
        self.owner = info.owner;
        self.version = info.version;
        self.signatures = info.signatures;
        self.hash = info.hash;
    }

    /// Catalog query carrying the selector fields.
    pub fn query(&self) -> TemplateInfo {
        TemplateInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            version: self.version.clone(),
            ..Default::default()
        }
    }

    /// Staged archive file name under the tmp directory.
    pub fn archive_name(&self) -> String {
        if self.file.is_empty() {
            self.id.clone()
        } else {
            self.file.clone()
        }
    }
}
