//! Marked blocks inside shared text files
//!
//! A block is owned by the engine and delimited by `# BEGIN <marker>` and
//! `# END <marker>` comment lines. Blocks with different markers coexist in the
//! same file and never touch each other or the surrounding content.

use crate::error::{Error, Result};
use crate::fsutil::{self, Ownership};
use crate::task::HostEntry;
use std::path::Path;

/// Outcome of applying a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Changed,
    Unchanged,
}

/// Opening delimiter line for a marker
pub fn begin_marker(marker: &str) -> String {
    format!("# BEGIN {marker}")
}

/// Closing delimiter line for a marker
pub fn end_marker(marker: &str) -> String {
    format!("# END {marker}")
}

/// Render host entries as block body lines, preserving order
pub fn render_entries(entries: &[HostEntry]) -> Vec<String> {
    entries.iter().map(HostEntry::render).collect()
}

/// Ensure the block for `marker` in `path` lists exactly `entries`.
///
/// An empty list removes the block entirely.
pub fn apply_block(path: &Path, marker: &str, entries: &[HostEntry]) -> Result<BlockOutcome> {
    apply_lines(path, marker, &render_entries(entries))
}

/// Ensure the block for `marker` in `path` holds exactly `lines`
pub fn apply_lines(path: &Path, marker: &str, lines: &[String]) -> Result<BlockOutcome> {
    let current = fsutil::read_text_optional(path)?;

    if current.is_none() && lines.is_empty() {
        return Ok(BlockOutcome::Unchanged);
    }

    let existing = current.unwrap_or_default();
    let desired = splice(&existing, marker, lines)?;
    if desired == existing {
        log::debug!("Block '{}' in {} already current", marker, path.display());
        return Ok(BlockOutcome::Unchanged);
    }

    fsutil::write_atomic(path, desired.as_bytes(), None, Ownership::default())?;
    if lines.is_empty() {
        log::info!("Removed block '{}' from {}", marker, path.display());
    } else {
        log::info!("Updated block '{}' in {}", marker, path.display());
    }
    Ok(BlockOutcome::Changed)
}

/// Content of `existing` after setting the block for `marker` to `lines`.
///
/// New blocks are appended; a missing final newline is added first so the
/// block starts on its own line.
pub fn splice(existing: &str, marker: &str, lines: &[String]) -> Result<String> {
    let begin = begin_marker(marker);
    let end = end_marker(marker);
    let rendered = render_block(&begin, &end, lines);

    match locate(existing, &begin, &end)? {
        Some((start, stop)) => {
            let mut out = String::with_capacity(existing.len() + rendered.len());
            out.push_str(&existing[..start]);
            out.push_str(&rendered);
            out.push_str(&existing[stop..]);
            Ok(out)
        }
        None if lines.is_empty() => Ok(existing.to_string()),
        None => {
            let mut out = existing.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&rendered);
            Ok(out)
        }
    }
}

fn render_block(begin: &str, end: &str, lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    out.push_str(begin);
    out.push('\n');
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(end);
    out.push('\n');
    out
}

/// Byte range of the block including both delimiter lines and their newlines
fn locate(existing: &str, begin: &str, end: &str) -> Result<Option<(usize, usize)>> {
    let mut offset = 0;
    let mut start = None;
    let mut found = None;

    for line in existing.split_inclusive('\n') {
        let text = line.trim_end();
        if text == begin {
            if start.is_some() || found.is_some() {
                return Err(Error::action(format!(
                    "more than one block marked '{begin}'"
                )));
            }
            start = Some(offset);
        } else if text == end {
            match start.take() {
                Some(s) => found = Some((s, offset + line.len())),
                None => {
                    return Err(Error::action(format!("'{end}' without matching '{begin}'")));
                }
            }
        }
        offset += line.len();
    }

    if start.is_some() {
        return Err(Error::action(format!("'{begin}' is never closed by '{end}'")));
    }
    Ok(found)
}
