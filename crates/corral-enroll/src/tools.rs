//! Downloadable cluster tools.
//!
//! Joining nodes fetch their node software from the coordinator. Only the
//! names listed in [`DOWNLOADABLE_TOOLS`] are ever served; anything else is
//! unknown even if a file by that name sits in the tools directory.

use std::path::PathBuf;

use tokio::fs::File;

use crate::error::EnrollError;

pub const DOWNLOADABLE_TOOLS: &[&str] = &["ciao-launcher", "ciao-controller", "corral"];

#[derive(Debug, Clone)]
pub struct ToolCatalog {
    dir: PathBuf,
}

impl ToolCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn is_downloadable(name: &str) -> bool {
        DOWNLOADABLE_TOOLS.contains(&name)
    }

    /// Open an allowed tool that exists on disk as a regular file.
    pub async fn open(&self, name: &str) -> Result<File, EnrollError> {
        if !Self::is_downloadable(name) {
            return Err(EnrollError::UnknownTool(name.to_string()));
        }
        let path = self.dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(EnrollError::ToolMissing(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnrollError::ToolMissing(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(File::open(&path).await?)
    }
}
