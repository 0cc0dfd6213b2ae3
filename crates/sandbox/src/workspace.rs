//! Sandbox workspace and per-invocation namespaces.
//!
//! The workspace root is shared by every invocation of one engine; each
//! invocation gets its own freshly created directory under it, so two
//! concurrent runs never see each other's source files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tempfile::TempDir;

use code_agent_core::{Error, Result};

const WORKSPACE_PREFIX: &str = "ai_agent_";

/// Exclusively owned temporary directory hosting invocation namespaces.
#[derive(Debug)]
pub struct SandboxWorkspace {
    root: PathBuf,
    dir: Mutex<Option<TempDir>>,
    next_seq: AtomicU64,
}

impl SandboxWorkspace {
    /// Create a workspace in `parent`, or in the system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        let root = dir.path().to_path_buf();
        tracing::info!(root = %root.display(), "Sandbox workspace created");

        Ok(Self {
            root,
            dir: Mutex::new(Some(dir)),
            next_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_destroyed(&self) -> bool {
        self.dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Allocate a namespace no other live invocation references.
    ///
    /// The name combines a sequence number with a random UUID and the
    /// directory is created with `create_dir`, which fails rather than
    /// reusing an existing path.
    pub async fn allocate(&self) -> Result<InvocationNamespace> {
        if self.is_destroyed() {
            return Err(Error::workspace("workspace has been destroyed"));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let path = self
            .root
            .join(format!("inv-{:06}-{}", seq, uuid::Uuid::new_v4().simple()));

        tokio::fs::create_dir(&path).await.map_err(|e| {
            Error::workspace(format!(
                "failed to create namespace {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(namespace = %path.display(), "Namespace allocated");
        Ok(InvocationNamespace {
            path,
            released: false,
        })
    }

    /// Recursively remove the workspace. Safe to call more than once;
    /// failures are logged, never returned.
    pub fn destroy(&self) {
        let taken = self
            .dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(dir) = taken else {
            return;
        };
        match dir.close() {
            Ok(()) => tracing::info!(root = %self.root.display(), "Sandbox workspace destroyed"),
            Err(e) => tracing::warn!(
                root = %self.root.display(),
                error = %e,
                "Sandbox workspace only partially removed"
            ),
        }
    }
}

/// A directory owned by exactly one invocation.
///
/// Released explicitly with [`release`](Self::release), or on drop if the
/// invocation ends any other way (error, panic, dropped future).
#[derive(Debug)]
pub struct InvocationNamespace {
    path: PathBuf,
    released: bool,
}

impl InvocationNamespace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside this namespace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the namespace. A namespace that is already gone is not an error.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => tracing::debug!(namespace = %self.path.display(), "Namespace released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                namespace = %self.path.display(),
                error = %e,
                "Failed to release namespace"
            ),
        }
    }
}

impl Drop for InvocationNamespace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                namespace = %self.path.display(),
                error = %e,
                "Failed to release namespace on drop"
            ),
        }
    }
}
