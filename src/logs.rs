//! Log collection for diagnostics.
//!
//! Daemon logs live on the node that ran them. They are fetched next to the
//! harness under the same relative path and their tail is printed.

use std::path::Path;

use crate::error::Result;
use crate::node::Node;

/// Last `n` lines of `content`.
pub fn tail_lines(content: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

/// Fetch `path` from `node` and return its last `lines` lines.
pub async fn collect_tail(node: &dyn Node, path: &Path, lines: usize) -> Result<String> {
    node.copy_from_remote(path, path).await?;
    let content = tokio::fs::read_to_string(path).await?;
    Ok(tail_lines(&content, lines).join("\n"))
}

/// Print the tail of a daemon log under a `=== <desc> Log ===` banner.
/// Unreadable logs are reported, never fatal.
pub async fn print_log(desc: &str, path: &Path, node: &dyn Node, lines: usize) {
    println!("\n=== {desc} Log ===");
    match collect_tail(node, path, lines).await {
        Ok(tail) => println!("{tail}"),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "log unavailable");
            println!("Could not read {}", path.display());
        }
    }
}
