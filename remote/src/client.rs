use crate::error::RepoError;
use crate::types::{DownloadProgress, TemplateInfo};
use async_stream::stream;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tokio_stream::{Stream, StreamExt};

type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

pub struct RepoClient {
    base_url: String,
    client: reqwest::Client,
}

impl RepoClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RepoError> {
        let client = reqwest::Client::builder().user_agent("strata/0.1.0").build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Reachability probe. Any HTTP response from the catalog counts;
    /// failure switches the import pipeline to local fallback.
    pub async fn check(&self) -> Result<(), RepoError> {
        self.client.get(&self.base_url).send().await?;
        Ok(())
    }

    fn info_url(&self, query: &TemplateInfo, token: &str, any_version: bool) -> String {
        if !query.id.is_empty() {
            return format!("{}/template/info?id={}&token={}", self.base_url, query.id, token);
        }
        if any_version {
            format!(
                "{}/template/info?name={}&token={}",
                self.base_url, query.name, token
            )
        } else {
            format!(
                "{}/template/info?name={}&version={}&token={}",
                self.base_url, query.name, query.version, token
            )
        }
    }

    /// Resolve a template selector against the catalog. A pinned-version
    /// query that comes back 404 is retried once across all versions so
    /// every available match is surfaced.
    pub async fn info(&self, query: &TemplateInfo, token: &str) -> Result<TemplateInfo, RepoError> {
        let url = self.info_url(query, token, false);
        tracing::debug!("Requesting template info: {}", url);

        let mut response = self.client.get(&url).send().await?;

        if query.id.is_empty() && response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!("Requested template version not found, getting available");
            let url = self.info_url(query, token, true);
            tracing::debug!("Requesting template info: {}", url);
            response = self.client.get(&url).send().await?;
        }

        if !response.status().is_success() {
            return Err(RepoError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        let list: Vec<TemplateInfo> = serde_json::from_str(&body)?;
        let selector = if query.id.is_empty() {
            query.name.clone()
        } else {
            query.id.clone()
        };
        let info = select_candidate(&selector, list)?;
        tracing::debug!("Name: {}, version: {}", info.name, info.version);
        Ok(info)
    }

    fn download_url(&self, template: &TemplateInfo, token: &str) -> String {
        match template.owner.first() {
            Some(owner) => format!(
                "{}/template/download?id={}&owner={}&token={}",
                self.base_url, template.id, owner, token
            ),
            None => format!(
                "{}/template/download?id={}&token={}",
                self.base_url, template.id, token
            ),
        }
    }

    /// Stream the template archive into `dest`, yielding transfer
    /// progress. The terminal event carries the error when the transfer
    /// failed; otherwise the stream ends after the final byte count.
    pub fn download(
        &self,
        template: &TemplateInfo,
        token: &str,
        dest: PathBuf,
    ) -> BoxStream<DownloadProgress> {
        let client = self.client.clone();
        let id = template.id.clone();
        let url = self.download_url(template, token);

        let output = stream! {
            if id.is_empty() {
                yield DownloadProgress {
                    current: 0,
                    total: None,
                    error: Some(RepoError::EmptyId.to_string()),
                };
                return;
            }

            let mut out = match tokio::fs::File::create(&dest).await {
                Ok(f) => f,
                Err(e) => {
                    yield DownloadProgress {
                        current: 0,
                        total: None,
                        error: Some(format!("failed to create {}: {}", dest.display(), e)),
                    };
                    return;
                }
            };

            tracing::debug!("Downloading template archive: {}", url);
            let response = match client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    yield DownloadProgress { current: 0, total: None, error: Some(e.to_string()) };
                    return;
                }
            };

            if !response.status().is_success() {
                yield DownloadProgress {
                    current: 0,
                    total: None,
                    error: Some(format!("repository returned status {}", response.status().as_u16())),
                };
                return;
            }

            let total = response.content_length();
            let mut current = 0u64;
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield DownloadProgress { current, total, error: Some(e.to_string()) };
                        return;
                    }
                };

                if let Err(e) = out.write_all(&chunk).await {
                    yield DownloadProgress { current, total, error: Some(e.to_string()) };
                    return;
                }

                current += chunk.len() as u64;
                yield DownloadProgress { current, total, error: None };
            }

            if let Err(e) = out.flush().await {
                yield DownloadProgress { current, total, error: Some(e.to_string()) };
            }
        };

        Box::pin(output)
    }
}

/// Pick the single matching record, or fail with the full candidate
/// list when more than one distinct template answers to the selector.
fn select_candidate(
    selector: &str,
    mut list: Vec<TemplateInfo>,
) -> Result<TemplateInfo, RepoError> {
    if list.is_empty() {
        return Err(RepoError::NotFound(selector.to_string()));
    }

    let distinct = {
        let mut ids: Vec<&str> = list.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    };

    if distinct > 1 {
        return Err(RepoError::Ambiguous {
            name: selector.to_string(),
            candidates: list,
        });
    }

    Ok(list.remove(0))
}
