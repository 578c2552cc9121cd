//! Task snapshot file reading.
//!
//! The task list is owned by whatever tool tracks the user's tasks; taskgate
//! only reads a JSON array of tasks from a file and feeds it to the
//! controller.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use taskgate_core::Task;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum TaskFileError {
    #[error("failed to read task file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse task file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Parses a JSON array of tasks.
pub fn parse_tasks(source: &str, path: &Path) -> Result<Vec<Task>, TaskFileError> {
    serde_json::from_str(source).map_err(|source| TaskFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the task snapshot at `path`.
///
/// A missing file is `Ok(None)`: the task tool may not have written it yet.
pub fn read_tasks(path: &Path) -> Result<Option<Vec<Task>>, TaskFileError> {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(TaskFileError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let tasks = parse_tasks(&source, path)?;
    trace!(path = %path.display(), count = tasks.len(), "Read task snapshot");
    Ok(Some(tasks))
}
