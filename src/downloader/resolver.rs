// Artifact resolver - locates the produced file and names it for the caller

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::fs;

use super::errors::DownloadError;
use super::models::{Artifact, MediaFormat};
use super::strategy::TierKind;

/// Leftovers from interrupted downloads, never a finished artifact
const PARTIAL_SUFFIXES: [&str; 4] = [".part", ".ytdl", ".temp", ".tmp"];

/// Find the produced file in `dir`.
///
/// When several candidates exist the most recently modified wins, ties broken
/// by name so the choice is deterministic. Zero bytes counts as missing.
pub async fn locate_output(dir: &Path) -> Result<(PathBuf, u64), DownloadError> {
    let mut entries = fs::read_dir(dir).await?;
    let mut candidates: Vec<(SystemTime, PathBuf, u64)> = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, path, meta.len()));
    }

    if candidates.len() > 1 {
        tracing::warn!(
            dir = %dir.display(),
            count = candidates.len(),
            "multiple output files, picking the newest"
        );
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    match candidates.into_iter().next() {
        Some((_, path, size)) if size > 0 => Ok((path, size)),
        _ => Err(DownloadError::EmptyOutput(dir.display().to_string())),
    }
}

/// Remove every file in `dir`, leaving subdirectories alone.
///
/// Run before each attempt so a later tier can only succeed with its own output.
pub async fn clear_outputs(dir: &Path) -> Result<usize, DownloadError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            continue;
        }
        fs::remove_file(entry.path()).await?;
        removed += 1;
    }
    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "cleared leftovers from previous attempt");
    }
    Ok(removed)
}

/// Keep alphanumerics, spaces, `-` and `_`; path separators become `_`.
pub fn sanitize_title(title: &str) -> String {
    title
        .replace(['/', '\\'], "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `<resource_id|download>_<YYYYMMDD_HHMMSS>`
pub fn fallback_stem(resource_id: Option<&str>, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let id = resource_id
        .map(sanitize_title)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "download".to_string());
    format!("{}_{}", id, stamp)
}

/// Display filename: sanitized title when usable, else the fallback stem.
///
/// The extension follows the file actually produced, since fallback tiers may
/// not deliver the requested container.
pub fn display_name(
    title: Option<&str>,
    resource_id: Option<&str>,
    produced: &Path,
    format: MediaFormat,
    now: OffsetDateTime,
) -> String {
    let stem = title
        .map(sanitize_title)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_stem(resource_id, now));
    let ext = produced
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| format.extension());
    format!("{}.{}", stem, ext)
}

/// Assemble the artifact for a located file
pub fn build_artifact(
    path: PathBuf,
    byte_size: u64,
    format: MediaFormat,
    tier: TierKind,
    title: Option<&str>,
    resource_id: Option<&str>,
) -> Artifact {
    let now = OffsetDateTime::now_utc();
    let display_name = display_name(title, resource_id, &path, format, now);
    Artifact {
        path,
        byte_size,
        content_type: format.content_type(),
        display_name,
        tier,
    }
}
