//! Read-only source tree access
//!
//! Offered to the model only when `core.source_root` is configured, for files
//! that are not in any collection. Every path goes through `FileSystemGuard`
//! before any I/O.

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use sdk::types::ToolError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{ToolContext, TypedTool};
use crate::fs_guard::FileSystemGuard;
use sdk::errors::EngineError;

#[derive(Debug)]
pub struct FilesystemTool {
    guard: FileSystemGuard,
}

impl FilesystemTool {
    pub fn new(root: PathBuf) -> Result<Self, EngineError> {
        Ok(Self {
            guard: FileSystemGuard::new(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    /// Read a UTF-8 file under the source root.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let path = self.resolve_path(path)?;
        debug!("Reading file: {}", path.display());

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", self.guard.relative(&path).display()))?;

        debug!("Read {} bytes from {}", content.len(), path.display());
        Ok(content)
    }

    /// List a directory under the source root: directories first, then files
    /// with their sizes, then symlinks.
    pub async fn list_dir(&self, path: &str) -> Result<String> {
        let path = self.resolve_path(path)?;
        debug!("Listing directory: {}", path.display());

        let mut entries = fs::read_dir(&path).await.with_context(|| {
            format!(
                "Failed to read directory {}",
                self.guard.relative(&path).display()
            )
        })?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut links = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let ft = entry.file_type().await?;
            if ft.is_dir() {
                dirs.push(format!("d  {}/", name));
            } else if ft.is_symlink() {
                links.push(format!("l  {}", name));
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push(format!("f  {:>8}  {}", format_size(size), name));
            }
        }

        dirs.sort();
        files.sort();
        links.sort();

        let shown = self.guard.relative(&path);
        let header = if shown.as_os_str().is_empty() {
            ".".to_string()
        } else {
            shown.display().to_string()
        };

        let mut out = Vec::with_capacity(dirs.len() + files.len() + links.len() + 1);
        out.push(format!(
            "{}/  ({} entries)",
            header,
            dirs.len() + files.len() + links.len()
        ));
        out.extend(dirs);
        out.extend(files);
        out.extend(links);
        Ok(out.join("\n"))
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        self.guard.validate_path(Path::new(path)).map_err(|e| {
            warn!("Path validation failed for {}: {}", path, e);
            anyhow::Error::new(e)
        })
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn sandbox<'a>(ctx: &'a ToolContext, tool: &str) -> Result<&'a FilesystemTool, ToolError> {
    ctx.fs.as_deref().ok_or_else(|| ToolError::ExecutionFailed {
        tool: tool.to_string(),
        reason: "no source root is configured".to_string(),
    })
}

fn failed(tool: &str, e: anyhow::Error) -> ToolError {
    ToolError::ExecutionFailed {
        tool: tool.to_string(),
        reason: format!("{:#}", e),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// Path relative to the source root
    pub path: String,
}

pub struct ReadFileTool;

#[async_trait]
impl TypedTool for ReadFileTool {
    type Args = ReadFileArgs;

    const NAME: &'static str = "read_file";
    const DESCRIPTION: &'static str =
        "Read a file straight from the source tree. Use get_file for indexed files.";

    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<Value, ToolError> {
        let fs = sandbox(ctx, Self::NAME)?;
        let text = fs
            .read_file(&args.path)
            .await
            .map_err(|e| failed(Self::NAME, e))?;
        Ok(json!({"path": args.path, "text": text}))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListDirArgs {
    /// Directory relative to the source root
    #[serde(default = "default_dir")]
    pub path: String,
}

fn default_dir() -> String {
    ".".to_string()
}

pub struct ListDirTool;

#[async_trait]
impl TypedTool for ListDirTool {
    type Args = ListDirArgs;

    const NAME: &'static str = "list_dir";
    const DESCRIPTION: &'static str = "List a directory of the source tree.";

    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<Value, ToolError> {
        let fs = sandbox(ctx, Self::NAME)?;
        let listing = fs
            .list_dir(&args.path)
            .await
            .map_err(|e| failed(Self::NAME, e))?;
        Ok(json!({"path": args.path, "listing": listing}))
    }
}
