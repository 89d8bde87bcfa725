//! Model checkpoint JSON files.
//!
//! Layout under the forecaster's checkpoint root
//! (`<parent>/<catchment>/<model_dir>`):
//!
//! ```text
//! 0/model.json
//! 1/model.json
//! ...
//! ```
//!
//! One subdirectory per ensemble member, named by its variant index. Whether
//! the root exists decides between building fresh models and loading these.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const CHECKPOINT_FILE: &str = "model.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointFile<T> {
    tool: String,
    index: usize,
    model: T,
}

pub fn checkpoint_root(parent: &Path, catchment: &str, model_dir: &str) -> PathBuf {
    parent.join(catchment).join(model_dir)
}

pub fn member_dir(root: &Path, index: usize) -> PathBuf {
    root.join(index.to_string())
}

/// Write member `index`'s state; returns the file written.
pub fn write_checkpoint<T: Serialize>(root: &Path, index: usize, model: &T) -> Result<PathBuf, AppError> {
    let dir = member_dir(root, index);
    fs::create_dir_all(&dir)
        .map_err(|e| AppError::io(format!("failed to create checkpoint dir '{}'", dir.display()), e))?;

    let path = dir.join(CHECKPOINT_FILE);
    let file = File::create(&path)
        .map_err(|e| AppError::io(format!("failed to create checkpoint '{}'", path.display()), e))?;
    let body = CheckpointFile {
        tool: "rivercast".to_string(),
        index,
        model,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &body)
        .map_err(|e| AppError::Model(format!("failed to write checkpoint '{}': {e}", path.display())))?;
    Ok(path)
}

/// Read member `index`'s state. Any failure is a `ModelLoad` error.
pub fn read_checkpoint<T: DeserializeOwned>(root: &Path, index: usize) -> Result<T, AppError> {
    let path = member_dir(root, index).join(CHECKPOINT_FILE);
    let file = File::open(&path).map_err(|e| AppError::ModelLoad {
        index,
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let body: CheckpointFile<T> = serde_json::from_reader(file).map_err(|e| AppError::ModelLoad {
        index,
        path: path.clone(),
        reason: format!("invalid checkpoint JSON: {e}"),
    })?;
    if body.index != index {
        return Err(AppError::ModelLoad {
            index,
            path,
            reason: format!("checkpoint belongs to member {}", body.index),
        });
    }
    Ok(body.model)
}
