mod config;
mod configure;
mod deploy;
mod error;
mod extract;
mod import;
mod lock;
mod runtime;
mod trust;
mod types;
mod verify;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{AgentConfig, MANAGEMENT, MANAGEMENT_IP, MANAGEMENT_PORTS};
pub use error::TemplateError;
pub use extract::{ArchiveExtractor, TarGzExtractor};
pub use import::{ImportOutcome, ImportRequest, ImportService};
pub use lock::ImportLock;
pub use runtime::{ContainerRuntime, LxcRuntime, RuntimeError};
pub use trust::{GpgKeyring, Keyring, TrustError};
pub use types::Template;
