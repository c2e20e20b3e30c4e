//! Human-readable rendering of job events and pool state.

use docsmith::PoolStatus;
use docsmith_core::IndexProgress;

/// One status line for an indexing progress event
pub fn format_progress(progress: &IndexProgress) -> String {
  match progress {
    IndexProgress::Clone { source } => format!("Fetching {}", source),
    IndexProgress::Extract { files } => format!("Selected {} files", files),
    IndexProgress::Chunk { files, chunks } => format!("Split {} files into {} chunks", files, chunks),
    IndexProgress::Embed { current, total } => {
      let percent = progress.percent().unwrap_or(0);
      format!("Embedded {}/{} chunks ({}%)", current, total, percent)
    }
    IndexProgress::Store { chunks } => format!("Storing {} chunks", chunks),
    IndexProgress::Complete { metadata } => format!(
      "Indexed {}/{}@{}: {} files, {} chunks ({} {})",
      metadata.owner,
      metadata.repo,
      metadata.branch,
      metadata.file_count,
      metadata.chunk_count,
      metadata.provider,
      metadata.model
    ),
    IndexProgress::Cancelled => "Indexing cancelled".to_string(),
    IndexProgress::Error { message } => format!("Indexing failed: {}", message),
  }
}

/// Markdown heading that opens a generated section
pub fn format_section_heading(title: &str) -> String {
  format!("\n## {}\n\n", title)
}

pub fn format_pool_status(pools: &[PoolStatus]) -> String {
  let mut out = String::new();
  for pool in pools {
    out.push_str(&format!("{:<16} {} keys", pool.id, pool.size));
    if pool.in_cooldown > 0 {
      out.push_str(&format!(", {} cooling down", pool.in_cooldown));
    }
    out.push('\n');
    if pool.labels.is_empty() {
      out.push_str("                 (no credentials configured)\n");
    }
    for label in &pool.labels {
      out.push_str(&format!("                 - {}\n", label));
    }
  }
  out
}
