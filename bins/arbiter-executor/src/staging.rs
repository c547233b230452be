/// Staging Area - per-job workspaces for untrusted code
///
/// Every execution job gets a private directory `<root>/<uuid>/` holding its
/// source file, its input file and whatever the compiler produces. Concurrent
/// jobs share the root but never a directory, so no locking is needed.
///
/// A `Workspace` is released exactly once: explicitly through `release()` on
/// the normal path, or from `Drop` when the job is abandoned (error, panic,
/// cancelled future). Either way nothing it staged survives the job.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const INPUT_FILE: &str = "input.txt";

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Create the staging root if needed
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Allocate a fresh workspace directory tagged with a new UUID
    pub async fn allocate(&self) -> io::Result<Workspace> {
        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());

        // create_dir (not create_dir_all) so an impossible collision fails loudly
        tokio::fs::create_dir(&dir).await?;
        debug!(job_id = %id, "Workspace allocated");

        Ok(Workspace {
            id,
            dir,
            source: None,
            input: None,
            released: false,
        })
    }
}

#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    source: Option<PathBuf>,
    input: Option<PathBuf>,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    /// Write the submitted code under `file_name` inside the workspace
    pub async fn stage_source(&mut self, file_name: &str, code: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, code).await?;
        self.source = Some(path.clone());
        Ok(path)
    }

    /// Write the stdin contents for the run step
    pub async fn stage_input(&mut self, input: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(INPUT_FILE);
        tokio::fs::write(&path, input).await?;
        self.input = Some(path.clone());
        Ok(path)
    }

    /// Remove the workspace and everything in it, compiled artifacts included
    pub async fn release(mut self) -> io::Result<()> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(job_id = %self.id, "Workspace released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Cannot await in Drop; the directory is small so a blocking remove is fine
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(job_id = %self.id, error = %e, "Failed to release abandoned workspace");
            }
        } else {
            debug!(job_id = %self.id, "Abandoned workspace released");
        }
    }
}
