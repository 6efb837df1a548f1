use crate::error::TemplateError;
use crate::trust::Keyring;
use crate::types::Template;
use md5::Context;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Verdict over a local-cache candidate. The interactive confirmation
/// for an unverifiable candidate is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalTrust {
    Trusted(String),
    NeedsConfirmation(String),
    Rejected,
}

/// Check that at least one declared owner signature opens to exactly
/// the template's content id. A template declaring no signatures at all
/// is rejected outright, before any download.
pub async fn verify_signature(
    keyring: &dyn Keyring,
    template: &Template,
) -> Result<(), TemplateError> {
    if template.signatures.is_empty() {
        return Err(TemplateError::Unsigned);
    }

    for (owner, signature) in &template.signatures {
        for key in keyring.public_keys(owner).await {
            match keyring.open_signature(&key, signature).await {
                Some(id) if id == template.id => {
                    tracing::info!("Template owner signature verified");
                    tracing::debug!("Signature belongs to {}", owner);
                    return Ok(());
                }
                _ => tracing::debug!("Signature does not match template id"),
            }
        }
    }

    Err(TemplateError::Unverified)
}

/// Compare the staged archive's recomputed digests against the declared
/// content id and checksums. Only meaningful after the signature check
/// succeeded.
pub async fn verify_integrity(staged: &Path, template: &Template) -> Result<(), TemplateError> {
    let (md5, sha256) = file_digests(staged).await?;
    if hash_matches(template, &md5, &sha256) {
        return Ok(());
    }
    Err(TemplateError::IntegrityMismatch(
        staged.display().to_string(),
    ))
}

/// Scan the local cache for a candidate archive. A hash match against
/// the declared id/checksums is accepted silently; a candidate that
/// cannot be verified (no id to compare against) needs an explicit
/// operator decision.
pub async fn local_candidate(
    tmp_dir: &Path,
    template: &Template,
) -> Result<LocalTrust, TemplateError> {
    let mut entries = match tokio::fs::read_dir(tmp_dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LocalTrust::Rejected),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.starts_with(&template.name) || !entry.file_type().await?.is_file() {
            continue;
        }

        if template.id.is_empty() {
            return Ok(LocalTrust::NeedsConfirmation(file_name));
        }

        let (md5, sha256) = file_digests(&entry.path()).await?;
        if hash_matches(template, &md5, &sha256) {
            return Ok(LocalTrust::Trusted(file_name));
        }
    }

    Ok(LocalTrust::Rejected)
}

fn hash_matches(template: &Template, md5: &str, sha256: &str) -> bool {
    md5 == template.id
        || (!template.hash.md5.is_empty() && md5 == template.hash.md5)
        || (!template.hash.sha256.is_empty() && sha256 == template.hash.sha256)
}

/// MD5 and SHA-256 of a file, streamed in 1 MiB chunks.
pub async fn file_digests(path: &Path) -> Result<(String, String), std::io::Error> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut md5 = Context::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        md5.consume(&buf[..n]);
        sha256.update(&buf[..n]);
    }

    Ok((format!("{:x}", md5.finalize()), hex::encode(sha256.finalize())))
}
