use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("template is not signed")]
    Unsigned,

    #[error("failed to verify owner signature")]
    Unverified,

    #[error("checksum mismatch for {0}")]
    IntegrityMismatch(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("repository error: {0}")]
    Repo(#[from] strata_remote::RepoError),

    #[error("storage error: {0}")]
    Storage(#[from] strata_snapshot::SnapshotError),

    #[error("registry error: {0}")]
    Registry(#[from] strata_registry::RegistryError),

    #[error("runtime error: {0}")]
    Runtime(#[from] crate::runtime::RuntimeError),

    #[error("trust error: {0}")]
    Trust(#[from] crate::trust::TrustError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
