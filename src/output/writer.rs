use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use crate::config::OutputConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Xml,
    MtuCsv,
    HourlyCsv,
    DailyStatsCsv,
}

impl ArtifactKind {
    /// `EnergyPrice_DA_<AREA>_<start>_<end>` plus a kind-specific suffix.
    pub fn file_name(self, area: &str, start: NaiveDate, end: NaiveDate) -> String {
        let stem = format!(
            "EnergyPrice_DA_{}_{}_{}",
            area,
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        );
        match self {
            Self::Xml => format!("{}.xml", stem),
            Self::MtuCsv => format!("{}_MTU.csv", stem),
            Self::HourlyCsv => format!("{}_Hourly.csv", stem),
            Self::DailyStatsCsv => format!("{}_DailyStats.csv", stem),
        }
    }

    pub fn enabled(self, output: &OutputConfig) -> bool {
        match self {
            Self::Xml => output.xml,
            Self::MtuCsv => output.mtu_csv,
            Self::HourlyCsv => output.hourly_csv,
            Self::DailyStatsCsv => output.daily_stats_csv,
        }
    }
}

/// Writes produced byte buffers into one output directory.
pub struct ArtifactWriter {
    directory: PathBuf,
}

impl ArtifactWriter {
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create output directory: {}", directory.display()))?;

        Ok(Self { directory })
    }

    /// Write (or replace) a file and return its path.
    pub fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.directory.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        file.write_all(bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}
