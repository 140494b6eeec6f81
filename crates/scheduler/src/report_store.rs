//! File-backed report store.
//!
//! Reports are immutable JSON documents at a deterministic location
//! derived from the package coordinate:
//! `reports/{ecosystem}/{name}/{version}/report.json` under the data
//! dir. Written once with create-new semantics; a report that already
//! exists is authoritative and never overwritten.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use zoll_core::{PackageCoordinate, ZollError};

/// The stored analysis document. `findings` is the analyzer output,
/// carried as opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub coordinate: PackageCoordinate,
    pub package_url: String,
    pub created_at: DateTime<Utc>,
    pub findings: Value,
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    /// Data-dir-relative reference, stored on completed tasks and
    /// returned to callers.
    pub fn reference(coordinate: &PackageCoordinate) -> String {
        format!(
            "reports/{}/{}/{}/report.json",
            coordinate.ecosystem, coordinate.name, coordinate.version
        )
    }

    /// Absolute location of a coordinate's report file.
    pub fn location(&self, coordinate: &PackageCoordinate) -> PathBuf {
        self.root.join(Self::reference(coordinate))
    }

    pub fn exists(&self, coordinate: &PackageCoordinate) -> bool {
        self.location(coordinate).is_file()
    }

    pub fn load(&self, coordinate: &PackageCoordinate) -> Result<Report, ZollError> {
        let path = self.location(coordinate);
        if !path.is_file() {
            return Err(ZollError::ReportNotFound(coordinate.to_string()));
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ZollError::Serialize(format!("report at {} is corrupt: {}", path.display(), e))
        })
    }

    /// Store a report unless one already exists. First writer wins; on
    /// the re-run race the existing file is left untouched. Returns the
    /// report reference either way.
    pub fn save_if_absent(&self, report: &Report) -> Result<String, ZollError> {
        let reference = Self::reference(&report.coordinate);
        let path = self.location(&report.coordinate);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(reference = %reference, "report already stored, keeping existing");
                return Ok(reference);
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = serde_json::to_vec_pretty(report)
            .map_err(|e| ZollError::Serialize(e.to_string()))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(reference)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
