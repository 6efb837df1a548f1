use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;

/// Advisory lock serializing imports of one template name across
/// concurrent agent invocations. Dropping the guard releases the lock
/// on every exit path of the guarded region.
pub struct ImportLock {
    path: PathBuf,
    released: bool,
}

impl ImportLock {
    /// Block until the named lock is held, polling once a second. Lock
    /// files whose recorded owner is dead, or is not a concurrent
    /// import invocation, are reclaimed before the next attempt.
    pub async fn acquire(dir: &Path, name: &str) -> Result<ImportLock, std::io::Error> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("strata.{}.import", name));

        loop {
            if Self::try_acquire(&path)? {
                tracing::debug!("Acquired import lock {}", path.display());
                return Ok(ImportLock {
                    path,
                    released: false,
                });
            }

            if Self::is_stale(&path) {
                tracing::debug!("Removing broken lock file {}", path.display());
                let _ = std::fs::remove_file(&path);
                continue;
            }

            sleep(Duration::from_secs(1)).await;
        }
    }

    fn try_acquire(path: &Path) -> Result<bool, std::io::Error> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                write!(file, "{}", std::process::id())?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// A lock is stale when its recorded pid is gone or the owning
    /// process is not running a template import.
    fn is_stale(path: &Path) -> bool {
        let pid = match std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
        {
            Some(pid) => pid,
            None => return true,
        };

        let cmdline = match std::fs::read(format!("/proc/{}/cmdline", pid)) {
            Ok(raw) => String::from_utf8_lossy(&raw).replace('\0', " "),
            Err(_) => return true,
        };

        !is_import_process(&cmdline)
    }

    /// Idempotent; the guard also releases from `Drop`.
    pub fn release(mut self) {
        self.released = true;
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for ImportLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn is_import_process(cmdline: &str) -> bool {
    cmdline.contains("strata") && cmdline.contains("import")
}
