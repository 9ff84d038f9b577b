use ::csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::{fixed, TabularRecord};
use crate::error::{Result, ValidationError, Vo2LabError};
use crate::metrics::EnduranceRow;
use crate::models::{EnduranceStage, Phase, RunningEconomyStage, SimpleStage};
use crate::session::MEASUREMENT_DP;

const VO2: &str = "VO2 (ml/kg/min)";
const HEART_RATE: &str = "HR (bpm)";

/// Encode rows as a header line plus one line per row
pub(super) fn encode<R: TabularRecord>(records: &[R]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(R::HEADERS)?;
    for record in records {
        writer.write_record(record.to_fields())?;
    }

    writer
        .into_inner()
        .map_err(|e| Vo2LabError::Io(e.into_error()))
}

/// Decode a table produced by [`encode`]
pub(super) fn decode<R: TabularRecord>(bytes: &[u8]) -> Result<Vec<R>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes);

    let headers = reader.headers()?;
    if headers.iter().ne(R::HEADERS.iter().copied()) {
        return Err(Vo2LabError::Serialization(format!(
            "unexpected {} header: {}",
            R::PHASE,
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        rows.push(R::from_fields(i + 1, &record)?);
    }

    Ok(rows)
}

fn cell<T: FromStr>(
    fields: &StringRecord,
    row: usize,
    index: usize,
    column: &'static str,
) -> std::result::Result<T, ValidationError> {
    let raw = fields.get(index).unwrap_or_default();
    raw.trim().parse::<T>().map_err(|_| ValidationError::MalformedRow {
        row,
        column,
        value: raw.to_string(),
    })
}

impl TabularRecord for SimpleStage {
    const PHASE: Phase = Phase::Simple;
    const HEADERS: &'static [&'static str] = &["Minute", VO2];

    fn to_fields(&self) -> Vec<String> {
        vec![self.stage.to_string(), fixed(self.vo2, MEASUREMENT_DP)]
    }

    fn from_fields(row: usize, fields: &StringRecord) -> std::result::Result<Self, ValidationError> {
        Ok(SimpleStage {
            stage: cell(fields, row, 0, "Minute")?,
            vo2: cell::<Decimal>(fields, row, 1, VO2)?,
        })
    }
}

impl TabularRecord for RunningEconomyStage {
    const PHASE: Phase = Phase::RunningEconomy;
    const HEADERS: &'static [&'static str] = &["Stage", "Speed (km/h)", VO2, HEART_RATE, "RPE"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.stage.to_string(),
            fixed(self.speed_kmh, MEASUREMENT_DP),
            fixed(self.vo2, MEASUREMENT_DP),
            self.heart_rate.to_string(),
            self.rpe.to_string(),
        ]
    }

    fn from_fields(row: usize, fields: &StringRecord) -> std::result::Result<Self, ValidationError> {
        Ok(RunningEconomyStage {
            stage: cell(fields, row, 0, "Stage")?,
            speed_kmh: cell(fields, row, 1, "Speed (km/h)")?,
            vo2: cell(fields, row, 2, VO2)?,
            heart_rate: cell(fields, row, 3, HEART_RATE)?,
            rpe: cell(fields, row, 4, "RPE")?,
        })
    }
}

impl TabularRecord for EnduranceRow {
    const PHASE: Phase = Phase::Endurance;
    const HEADERS: &'static [&'static str] = &[
        "Stage",
        "Gradient (%)",
        VO2,
        HEART_RATE,
        "RPE",
        "%HRmax",
        "exceedsThreshold",
    ];

    fn to_fields(&self) -> Vec<String> {
        let record = &self.record;
        vec![
            record.stage.to_string(),
            fixed(record.gradient_pct, MEASUREMENT_DP),
            fixed(record.vo2, MEASUREMENT_DP),
            record.heart_rate.to_string(),
            record.rpe.to_string(),
            fixed(self.percent_hr_max, 2),
            self.exceeds_threshold.to_string(),
        ]
    }

    fn from_fields(row: usize, fields: &StringRecord) -> std::result::Result<Self, ValidationError> {
        Ok(EnduranceRow {
            record: EnduranceStage {
                stage: cell(fields, row, 0, "Stage")?,
                gradient_pct: cell(fields, row, 1, "Gradient (%)")?,
                vo2: cell(fields, row, 2, VO2)?,
                heart_rate: cell(fields, row, 3, HEART_RATE)?,
                rpe: cell(fields, row, 4, "RPE")?,
            },
            percent_hr_max: cell(fields, row, 5, "%HRmax")?,
            exceeds_threshold: cell(fields, row, 6, "exceedsThreshold")?,
        })
    }
}
