//! Settings file access

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::DeployerError;

/// Location of a file the deployer reads or writes
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Parse the whole file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, DeployerError> {
        let contents = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Replace the file contents, creating missing parent directories
    pub async fn write_string(&self, contents: &str) -> Result<(), DeployerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&self.path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}
