//! File-rewrite collaborator.
//!
//! Stateless read/modify/write of one text file inside the working checkout.
//! Missing files are treated as empty, so a fresh checkout and a reused one
//! behave the same.

use std::path::Path;

use crate::Result;

/// Outcome of one rewrite, returned to the entrypoint payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RewriteOutcome {
    pub success: bool,
    pub old_content: String,
    pub new_content: String,
}

/// Replace the file's content, returning what was there before.
pub async fn rewrite_file(path: &Path, new_content: &str) -> Result<RewriteOutcome> {
    let old_content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, new_content).await?;

    tracing::debug!(
        path = %path.display(),
        old_len = old_content.len(),
        new_len = new_content.len(),
        "file rewritten"
    );

    Ok(RewriteOutcome {
        success: true,
        old_content,
        new_content: new_content.to_string(),
    })
}
