//! Offset records on disk
//!
//! A two-column `Channel,Offset` CSV. Channels that were never balanced get an
//! empty offset field so they are not mistaken for a 0 dB offset.

use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ExportError;

pub struct OffsetExporter {
    directory: PathBuf,
}

impl OffsetExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// `speaker_offsets_2024_Jan_02_1530.csv`
    pub fn file_name(now: DateTime<Local>) -> String {
        format!("speaker_offsets_{}.csv", now.format("%Y_%b_%d_%H%M"))
    }

    /// Write `records` to a new date-stamped file and return its path
    pub fn save(&self, records: &[(u16, Option<f64>)]) -> Result<PathBuf, ExportError> {
        let path = self.directory.join(Self::file_name(Local::now()));
        self.save_to(&path, records)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path, records: &[(u16, Option<f64>)]) -> Result<(), ExportError> {
        check_write_access(path)?;

        let file = File::create(path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ExportError::PermissionDenied(path.display().to_string()),
            _ => ExportError::Io(e),
        })?;
        let mut writer = BufWriter::new(file);
        write_csv(&mut writer, records)?;
        writer.flush()?;

        tracing::info!("Saved {} offsets to {}", records.len(), path.display());
        Ok(())
    }
}

/// Header plus one `channel,offset` row per record
pub fn write_csv<W: Write>(writer: &mut W, records: &[(u16, Option<f64>)]) -> io::Result<()> {
    writeln!(writer, "Channel,Offset")?;
    for (channel, offset) in records {
        match offset {
            Some(offset) => writeln!(writer, "{},{:?}", channel, offset)?,
            None => writeln!(writer, "{},", channel)?,
        }
    }
    Ok(())
}

fn check_write_access(path: &Path) -> Result<(), ExportError> {
    let denied = || ExportError::PermissionDenied(path.display().to_string());

    match std::fs::metadata(path) {
        Ok(meta) if meta.permissions().readonly() => return Err(denied()),
        Ok(_) => return Ok(()),
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(ExportError::Io(e)),
        Err(_) => {}
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let meta = std::fs::metadata(parent)?;
    if meta.permissions().readonly() {
        return Err(denied());
    }
    Ok(())
}
