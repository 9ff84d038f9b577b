use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, ValidationError, Vo2LabError};
use crate::metrics::EnduranceMetrics;
use crate::models::{EnduranceStage, Phase, PhaseRecords};

pub mod csv;
pub mod json;

pub use json::{PhaseReport, SessionReport};

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// A row layout for one phase's export table
pub trait TabularRecord: Sized {
    /// Phase whose export this row belongs to
    const PHASE: Phase;

    /// Column names in their fixed order
    const HEADERS: &'static [&'static str];

    /// Formatted cell values, one per header
    fn to_fields(&self) -> Vec<String>;

    /// Rebuild a row from exported cells; `row` is 1-based for messages
    fn from_fields(row: usize, fields: &::csv::StringRecord)
        -> std::result::Result<Self, ValidationError>;
}

/// A produced export, ready for the caller to persist or offer for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Data rows, excluding the header
    pub rows: usize,
}

impl ExportArtifact {
    /// Write the artifact into `dir`, creating it if needed
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(&self.filename);
        fs::write(&path, &self.bytes)?;

        info!(path = %path.display(), rows = self.rows, "Export written");
        Ok(path)
    }
}

/// Serializes phase records into downloadable tables
pub struct ReportExporter;

impl ReportExporter {
    /// Export any phase's rows as CSV named after the participant.
    ///
    /// # Errors
    /// `EmptyInput` if there are no rows.
    pub fn export<R: TabularRecord>(records: &[R], participant_id: &str) -> Result<ExportArtifact> {
        if records.is_empty() {
            return Err(Vo2LabError::empty_input(format!("export {}", R::PHASE)));
        }

        let bytes = csv::encode(records)?;

        Ok(ExportArtifact {
            filename: Self::export_filename(R::PHASE, participant_id, ExportFormat::Csv),
            bytes,
            rows: records.len(),
        })
    }

    /// Export endurance records together with their derived columns.
    ///
    /// The derived rows must describe exactly these records, in order.
    pub fn export_endurance(
        records: &[EnduranceStage],
        metrics: &EnduranceMetrics,
        participant_id: &str,
    ) -> Result<ExportArtifact> {
        if records.is_empty() {
            return Err(Vo2LabError::empty_input(format!("export {}", Phase::Endurance)));
        }

        let aligned = metrics.rows.len() == records.len()
            && metrics
                .rows
                .iter()
                .zip(records)
                .all(|(row, record)| &row.record == record);

        if !aligned {
            return Err(ValidationError::DerivedLengthMismatch {
                records: records.len(),
                derived: metrics.rows.len(),
            }
            .into());
        }

        Self::export(&metrics.rows, participant_id)
    }

    /// Export a recorded phase; the endurance phase needs its derived metrics
    pub fn export_phase(
        records: &PhaseRecords,
        derived: Option<&EnduranceMetrics>,
        participant_id: &str,
    ) -> Result<ExportArtifact> {
        match (records, derived) {
            (PhaseRecords::Simple(records), _) => Self::export(records, participant_id),
            (PhaseRecords::RunningEconomy(records), _) => Self::export(records, participant_id),
            (PhaseRecords::Endurance(records), Some(metrics)) => {
                Self::export_endurance(records, metrics, participant_id)
            }
            (PhaseRecords::Endurance(records), None) => {
                if records.is_empty() {
                    return Err(Vo2LabError::empty_input(format!("export {}", Phase::Endurance)));
                }
                Err(ValidationError::DerivedLengthMismatch {
                    records: records.len(),
                    derived: 0,
                }
                .into())
            }
        }
    }

    /// Read an exported table back into rows
    pub fn parse<R: TabularRecord>(bytes: &[u8]) -> Result<Vec<R>> {
        csv::decode(bytes)
    }

    /// `<PhasePrefix>_<participantId>.<ext>`
    pub fn export_filename(phase: Phase, participant_id: &str, format: ExportFormat) -> String {
        format!(
            "{}_{}.{}",
            phase.export_prefix(),
            sanitize_component(participant_id),
            format.extension()
        )
    }
}

/// Replace characters that cannot appear in a single path component
fn sanitize_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Format with exactly `dp` decimal places, rounding half away from zero
pub fn fixed(value: Decimal, dp: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded.to_string()
}
