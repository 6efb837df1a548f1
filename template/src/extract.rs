use crate::error::TemplateError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::path::Path;
use tar::Archive;

/// Declared-parent key inside a template archive's `config` file.
pub const PARENT_KEY: &str = "subutai.parent";

/// Archive unpacking capability; the production implementation drives
/// flate2 + tar, tests substitute a fake writing files directly.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), TemplateError>;
}

pub struct TarGzExtractor;

#[async_trait]
impl ArchiveExtractor for TarGzExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), TemplateError> {
        let file = std::fs::File::open(archive)
            .map_err(|e| TemplateError::Extraction(format!("{}: {}", archive.display(), e)))?;
        std::fs::create_dir_all(dest)?;

        let mut tar = Archive::new(GzDecoder::new(file));
        tar.set_overwrite(true);
        tar.set_preserve_permissions(true);
        tar.set_unpack_xattrs(true);
        tar.unpack(dest)
            .map_err(|e| TemplateError::Extraction(format!("{}: {}", archive.display(), e)))?;
        Ok(())
    }
}

/// Read a `key = value` entry from a container configuration file.
pub fn config_value(content: &str, key: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=')
            && k.trim() == key
        {
            return Some(v.trim().to_string());
        }
    }
    None
}

/// Unpack the staged archive into `<tmp_dir>/<id>.dir` and return the
/// declared parent template name. The parent is reported only when it
/// is declared, differs from the template's own name, and is not
/// already a known base template.
pub async fn extract_template(
    extractor: &dyn ArchiveExtractor,
    tmp_dir: &Path,
    archive: &str,
    id: &str,
    name: &str,
    is_known: &(dyn Fn(&str) -> bool + Sync),
) -> Result<Option<String>, TemplateError> {
    let src = tmp_dir.join(archive);
    let dest = tmp_dir.join(format!("{}.dir", id));
    tracing::debug!("Extracting {} to {}", src.display(), dest.display());
    extractor.extract(&src, &dest).await?;

    let config = tokio::fs::read_to_string(dest.join("config"))
        .await
        .map_err(|e| TemplateError::Extraction(format!("unreadable template config: {}", e)))?;

    match config_value(&config, PARENT_KEY) {
        Some(parent) if !parent.is_empty() && parent != name && !is_known(&parent) => {
            Ok(Some(parent))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pack_archive, DirExtractor};
    use tempfile::TempDir;

    #[test]
    fn test_config_value() {
        let content = "# template configuration\n\
                       subutai.parent = base\n\
                       lxc.utsname=child\n";
        assert_eq!(config_value(content, "subutai.parent"), Some("base".to_string()));
        assert_eq!(config_value(content, "lxc.utsname"), Some("child".to_string()));
        assert_eq!(config_value(content, "missing"), None);
    }

    #[test]
    fn test_config_value_skips_comments() {
        let content = "# subutai.parent = wrong\nsubutai.parent = base\n";
        assert_eq!(config_value(content, "subutai.parent"), Some("base".to_string()));
    }

    #[tokio::test]
    async fn test_extract_reports_parent() {
        let dir = TempDir::new().unwrap();
        let extractor = DirExtractor::new(&[("config", "subutai.parent = base\n")]);

        let parent = extract_template(&extractor, dir.path(), "child-id", "child-id", "child", &|_| false)
            .await
            .unwrap();
        assert_eq!(parent, Some("base".to_string()));
    }

    #[tokio::test]
    async fn test_extract_guards_self_parent() {
        let dir = TempDir::new().unwrap();
        let extractor = DirExtractor::new(&[("config", "subutai.parent = child\n")]);

        let parent = extract_template(&extractor, dir.path(), "child-id", "child-id", "child", &|_| false)
            .await
            .unwrap();
        assert_eq!(parent, None);
    }

    #[tokio::test]
    async fn test_extract_guards_known_parent() {
        let dir = TempDir::new().unwrap();
        let extractor = DirExtractor::new(&[("config", "subutai.parent = base\n")]);

        let parent = extract_template(&extractor, dir.path(), "child-id", "child-id", "child", &|name| {
            name == "base"
        })
        .await
        .unwrap();
        assert_eq!(parent, None);
    }

    #[tokio::test]
    async fn test_extract_without_parent() {
        let dir = TempDir::new().unwrap();
        let extractor = DirExtractor::new(&[("config", "lxc.utsname = base\n")]);

        let parent = extract_template(&extractor, dir.path(), "base-id", "base-id", "base", &|_| false)
            .await
            .unwrap();
        assert_eq!(parent, None);
    }

    #[tokio::test]
    async fn test_targz_round_trip() {
        let dir = TempDir::new().unwrap();
        let archive = pack_archive(&[
            ("config", b"subutai.parent = base\n".to_vec()),
            ("fstab", b"proc /proc proc defaults 0 0\n".to_vec()),
            ("deltas/rootfs.delta", b"stream".to_vec()),
        ]);
        tokio::fs::write(dir.path().join("child-id"), &archive).await.unwrap();

        let parent = extract_template(
            &TarGzExtractor,
            dir.path(),
            "child-id",
            "child-id",
            "child",
            &|_| false,
        )
        .await
        .unwrap();

        assert_eq!(parent, Some("base".to_string()));
        let unpacked = dir.path().join("child-id.dir");
        assert!(unpacked.join("fstab").exists());
        assert!(unpacked.join("deltas/rootfs.delta").exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_fatal() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("bad-id"), b"not a tarball").await.unwrap();

        let result = extract_template(
            &TarGzExtractor,
            dir.path(),
            "bad-id",
            "bad-id",
            "bad",
            &|_| false,
        )
        .await;
        assert!(matches!(result, Err(TemplateError::Extraction(_))));
    }
}
