//! Output lifecycle: prepare a private staging directory next to the output
//! root, write every location exactly once, then swap the whole set into place.
//!
//! Readers of the output root only ever see the previous complete run or the
//! new complete run. An uncommitted staging directory is removed on drop.

use crate::error::{AnalyticsError, AnalyticsResult};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use uuid::Uuid;

pub const PART_FILE: &str = "part-00000.json";
pub const MANIFEST_FILE: &str = "_manifest.json";

const ROOT_LOCATION: &str = "output_root";

pub struct OutputStaging {
    root: PathBuf,
    staging: TempDir,
}

impl OutputStaging {
    pub fn prepare(root: &Path) -> AnalyticsResult<Self> {
        let name = root
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AnalyticsError::sink(
                    ROOT_LOCATION,
                    format!("output root {} must name a directory", root.display()),
                )
            })?;
        let parent = parent_dir(root);
        std::fs::create_dir_all(parent).map_err(|err| {
            AnalyticsError::sink(
                ROOT_LOCATION,
                format!("failed to create {}: {err}", parent.display()),
            )
        })?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging-"))
            .tempdir_in(parent)
            .map_err(|err| {
                AnalyticsError::sink(
                    ROOT_LOCATION,
                    format!("failed to create staging dir in {}: {err}", parent.display()),
                )
            })?;
        tracing::debug!(
            phase = "sink_prepare",
            root = %root.display(),
            staging = %staging.path().display(),
            "output staging prepared"
        );
        Ok(Self {
            root: root.to_path_buf(),
            staging,
        })
    }

    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }

    /// Writes `rows` as JSON lines to `<location>/part-00000.json`. A location
    /// can be written once per run.
    pub fn write_location<T: Serialize>(&self, location: &str, rows: &[T]) -> AnalyticsResult<u64> {
        let started = Instant::now();
        let dir = self.staging.path().join(location);
        std::fs::create_dir(&dir).map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => AnalyticsError::sink(location, "already written in this run"),
            _ => AnalyticsError::sink(location, err),
        })?;

        let file = File::create(dir.join(PART_FILE)).map_err(|err| AnalyticsError::sink(location, err))?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut writer, row).map_err(|err| AnalyticsError::sink(location, err))?;
            writer
                .write_all(b"\n")
                .map_err(|err| AnalyticsError::sink(location, err))?;
        }
        let file = writer
            .into_inner()
            .map_err(|err| AnalyticsError::sink(location, err.error()))?;
        file.sync_all().map_err(|err| AnalyticsError::sink(location, err))?;

        tracing::info!(
            phase = "sink_write",
            location,
            rows = rows.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "output location staged"
        );
        Ok(rows.len() as u64)
    }

    /// Writes the manifest and replaces the output root with the staged set.
    pub fn commit<M: Serialize>(self, manifest: &M) -> AnalyticsResult<PathBuf> {
        let Self { root, staging } = self;
        write_manifest(staging.path(), manifest)?;

        let parent = parent_dir(&root).to_path_buf();
        let staged = staging.keep();

        let previous = if root.exists() {
            let name = root
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("output");
            let aside = parent.join(format!(".{name}.previous-{}", Uuid::new_v4()));
            if let Err(err) = std::fs::rename(&root, &aside) {
                let _ = std::fs::remove_dir_all(&staged);
                return Err(AnalyticsError::sink(
                    ROOT_LOCATION,
                    format!("failed to move previous output aside: {err}"),
                ));
            }
            Some(aside)
        } else {
            None
        };

        if let Err(err) = std::fs::rename(&staged, &root) {
            if let Some(aside) = previous.as_ref() {
                let _ = std::fs::rename(aside, &root);
            }
            let _ = std::fs::remove_dir_all(&staged);
            return Err(AnalyticsError::sink(
                ROOT_LOCATION,
                format!("failed to move staged output into {}: {err}", root.display()),
            ));
        }

        if let Some(aside) = previous {
            if let Err(err) = std::fs::remove_dir_all(&aside) {
                tracing::warn!(
                    path = %aside.display(),
                    error = %err,
                    "failed to remove previous output; leaving it in place"
                );
            }
        }

        tracing::info!(phase = "sink_commit", root = %root.display(), "output committed");
        Ok(root)
    }
}

fn parent_dir(root: &Path) -> &Path {
    root.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn write_manifest<M: Serialize>(dir: &Path, manifest: &M) -> AnalyticsResult<()> {
    let contents =
        serde_json::to_vec_pretty(manifest).map_err(|err| AnalyticsError::sink(MANIFEST_FILE, err))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|err| AnalyticsError::sink(MANIFEST_FILE, err))?;
    tmp.write_all(&contents)
        .map_err(|err| AnalyticsError::sink(MANIFEST_FILE, err))?;
    tmp.flush()
        .map_err(|err| AnalyticsError::sink(MANIFEST_FILE, err))?;
    tmp.persist(dir.join(MANIFEST_FILE))
        .map_err(|err| AnalyticsError::sink(MANIFEST_FILE, format!("failed to persist manifest: {err}")))?;
    Ok(())
}
