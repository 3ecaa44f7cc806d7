//! PosixDriver - `file://` endpoints on a locally mounted filesystem.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DeletionOutcome, Pfn};
use crate::ports::DeletionDriver;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PosixDriver {
    /// Only paths below this directory may be removed.
    root: Option<PathBuf>,
    timeout: Duration,
}

impl PosixDriver {
    pub fn new() -> Self {
        Self {
            root: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn classify(err: &io::Error) -> DeletionOutcome {
        match err.kind() {
            io::ErrorKind::NotFound => DeletionOutcome::Deleted,
            io::ErrorKind::PermissionDenied
            | io::ErrorKind::IsADirectory
            | io::ErrorKind::ReadOnlyFilesystem => DeletionOutcome::permanent(err.to_string()),
            _ => DeletionOutcome::transient(err.to_string()),
        }
    }
}

impl Default for PosixDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeletionDriver for PosixDriver {
    fn scheme(&self) -> &str {
        "file"
    }

    async fn delete(&self, pfn: &Pfn) -> DeletionOutcome {
        let Some(path) = pfn.to_file_path() else {
            return DeletionOutcome::permanent(format!("{pfn} is not a local file path"));
        };
        if let Some(root) = &self.root
            && !path.starts_with(root)
        {
            return DeletionOutcome::permanent(format!(
                "{} is outside {}",
                path.display(),
                root.display()
            ));
        }

        match tokio::time::timeout(self.timeout, remove(&path)).await {
            Ok(Ok(())) => DeletionOutcome::Deleted,
            Ok(Err(err)) => Self::classify(&err),
            Err(_) => DeletionOutcome::transient(format!(
                "delete of {} timed out after {:?}",
                path.display(),
                self.timeout
            )),
        }
    }
}

async fn remove(path: &Path) -> io::Result<()> {
    tokio::fs::remove_file(path).await
}
