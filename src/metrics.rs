//! Derived metrics for recorded test phases
//!
//! Summaries are plain arithmetic: the maximum and mean of the VO2 column for
//! any phase, and for the endurance phase the heart rate as a percentage of the
//! predicted maximum together with a threshold flag.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ValidationError, Vo2LabError};
use crate::heart_rate::HrMaxFormula;
use crate::models::{EnduranceStage, Participant, PhaseRecords, StageRecord};

/// Default %HRmax above which a stage is flagged
pub const DEFAULT_THRESHOLD_PERCENT: Decimal = dec!(90);

/// VO2 summary of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vo2Summary {
    /// Highest VO2 in ml/kg/min
    pub max: Decimal,
    /// Arithmetic mean VO2 in ml/kg/min
    pub mean: Decimal,
    /// Stage where the maximum first occurred
    pub max_stage: u8,
    /// Number of stages summarised
    pub stage_count: usize,
}

/// An endurance stage with its derived heart-rate columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnduranceRow {
    pub record: EnduranceStage,
    /// Heart rate as a percentage of predicted HRmax
    pub percent_hr_max: Decimal,
    /// `percent_hr_max` strictly above the threshold
    pub exceeds_threshold: bool,
}

/// Endurance phase records augmented with derived metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnduranceMetrics {
    pub predicted_hr_max: Decimal,
    pub threshold_percent: Decimal,
    pub rows: Vec<EnduranceRow>,
    pub vo2max: Decimal,
    pub vo2mean: Decimal,
}

impl EnduranceMetrics {
    /// Number of stages above the threshold
    pub fn flagged_stages(&self) -> usize {
        self.rows.iter().filter(|row| row.exceeds_threshold).count()
    }
}

/// Computes summaries and derived columns from stage records
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsEngine {
    threshold_percent: Decimal,
    hr_max_formula: HrMaxFormula,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        MetricsEngine {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            hr_max_formula: HrMaxFormula::default(),
        }
    }
}

impl MetricsEngine {
    /// Create an engine with a custom threshold and HRmax formula
    ///
    /// # Errors
    /// `InvalidParameter` if the threshold is not positive
    pub fn new(threshold_percent: Decimal, hr_max_formula: HrMaxFormula) -> Result<Self> {
        if threshold_percent <= Decimal::ZERO {
            return Err(Vo2LabError::invalid_parameter(
                "threshold_percent",
                threshold_percent,
            ));
        }

        Ok(MetricsEngine {
            threshold_percent,
            hr_max_formula,
        })
    }

    pub fn threshold_percent(&self) -> Decimal {
        self.threshold_percent
    }

    pub fn hr_max_formula(&self) -> HrMaxFormula {
        self.hr_max_formula
    }

    /// Predicted HRmax for the participant under the configured formula
    pub fn predicted_hr_max(&self, participant: &Participant) -> Decimal {
        self.hr_max_formula.for_participant(participant)
    }

    /// Maximum and mean VO2 over any phase's records.
    ///
    /// Ties for the maximum resolve to the earliest stage.
    pub fn compute_simple_summary<R: StageRecord>(records: &[R]) -> Result<Vo2Summary> {
        let first = records
            .first()
            .ok_or_else(|| Vo2LabError::empty_input("summarise VO2"))?;

        let mut max = first.vo2();
        let mut max_stage = first.stage();
        let mut sum = Decimal::ZERO;

        for record in records {
            let vo2 = record.vo2();
            if vo2 > max {
                max = vo2;
                max_stage = record.stage();
            }
            sum = sum.checked_add(vo2).ok_or_else(|| ValidationError::OutOfRange {
                field: "vo2",
                stage: record.stage(),
                value: vo2.to_string(),
                reason: "too large to summarise".to_string(),
            })?;
        }

        let mean = sum / Decimal::from(records.len());

        let phase = R::PHASE;
        debug!(phase = %phase, max = %max, mean = %mean, "VO2 summary computed");

        Ok(Vo2Summary {
            max,
            mean,
            max_stage,
            stage_count: records.len(),
        })
    }

    /// Summary of whichever phase the records belong to
    pub fn summarize_phase(records: &PhaseRecords) -> Result<Vo2Summary> {
        match records {
            PhaseRecords::Simple(records) => Self::compute_simple_summary(records),
            PhaseRecords::RunningEconomy(records) => Self::compute_simple_summary(records),
            PhaseRecords::Endurance(records) => Self::compute_simple_summary(records),
        }
    }

    /// Augment endurance records with %HRmax and the threshold flag.
    ///
    /// # Errors
    /// `InvalidParameter` if `predicted_hr_max` is not positive, `EmptyInput`
    /// if there are no records.
    pub fn compute_endurance_metrics(
        &self,
        records: &[EnduranceStage],
        predicted_hr_max: Decimal,
    ) -> Result<EnduranceMetrics> {
        if predicted_hr_max <= Decimal::ZERO {
            return Err(Vo2LabError::invalid_parameter(
                "predicted_hr_max",
                predicted_hr_max,
            ));
        }

        let summary = Self::compute_simple_summary(records)?;

        let rows: Vec<EnduranceRow> = records
            .iter()
            .map(|record| {
                let percent_hr_max =
                    Decimal::from(record.heart_rate) * dec!(100) / predicted_hr_max;
                EnduranceRow {
                    record: record.clone(),
                    percent_hr_max,
                    exceeds_threshold: percent_hr_max > self.threshold_percent,
                }
            })
            .collect();

        let metrics = EnduranceMetrics {
            predicted_hr_max,
            threshold_percent: self.threshold_percent,
            rows,
            vo2max: summary.max,
            vo2mean: summary.mean,
        };

        debug!(
            predicted_hr_max = %predicted_hr_max,
            flagged = metrics.flagged_stages(),
            "Endurance metrics computed"
        );

        Ok(metrics)
    }

    /// Endurance metrics using the participant's predicted HRmax
    pub fn endurance_for_participant(
        &self,
        records: &[EnduranceStage],
        participant: &Participant,
    ) -> Result<EnduranceMetrics> {
        self.compute_endurance_metrics(records, self.predicted_hr_max(participant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunningEconomyStage, SimpleStage};
    use chrono::NaiveDate;

    fn simple(values: &[Decimal]) -> Vec<SimpleStage> {
        values
            .iter()
            .enumerate()
            .map(|(i, &vo2)| SimpleStage {
                stage: i as u8 + 1,
                vo2,
            })
            .collect()
    }

    fn endurance_stage(stage: u8, heart_rate: u16, vo2: Decimal) -> EnduranceStage {
        EnduranceStage {
            stage,
            gradient_pct: Decimal::from(stage) * dec!(2),
            vo2,
            heart_rate,
            rpe: 15,
        }
    }

    #[test]
    fn test_simple_summary() {
        let summary =
            MetricsEngine::compute_simple_summary(&simple(&[dec!(10), dec!(20), dec!(30)])).unwrap();

        assert_eq!(summary.max, dec!(30));
        assert_eq!(summary.mean, dec!(20));
        assert_eq!(summary.max_stage, 3);
        assert_eq!(summary.stage_count, 3);
    }

    #[test]
    fn test_simple_summary_tie_breaks_to_first_stage() {
        let summary = MetricsEngine::compute_simple_summary(&simple(&[
            dec!(41.5),
            dec!(48.2),
            dec!(47.9),
            dec!(48.2),
        ]))
        .unwrap();

        assert_eq!(summary.max, dec!(48.2));
        assert_eq!(summary.max_stage, 2);
    }

    #[test]
    fn test_simple_summary_empty() {
        let records: Vec<SimpleStage> = Vec::new();
        let err = MetricsEngine::compute_simple_summary(&records).unwrap_err();
        assert!(matches!(err, Vo2LabError::EmptyInput { .. }));
    }

    #[test]
    fn test_simple_summary_overflow_is_an_error() {
        let err = MetricsEngine::compute_simple_summary(&simple(&[Decimal::MAX, Decimal::MAX]))
            .unwrap_err();
        assert!(matches!(
            err,
            Vo2LabError::Validation(ValidationError::OutOfRange { field: "vo2", stage: 2, .. })
        ));
    }

    #[test]
    fn test_summary_over_running_economy() {
        let records = vec![
            RunningEconomyStage {
                stage: 1,
                speed_kmh: dec!(8),
                vo2: dec!(28.4),
                heart_rate: 132,
                rpe: 9,
            },
            RunningEconomyStage {
                stage: 2,
                speed_kmh: dec!(10),
                vo2: dec!(34.6),
                heart_rate: 148,
                rpe: 12,
            },
        ];

        let summary = MetricsEngine::compute_simple_summary(&records).unwrap();
        assert_eq!(summary.max, dec!(34.6));
        assert_eq!(summary.mean, dec!(31.5));
    }

    #[test]
    fn test_threshold_is_strictly_greater() {
        let engine = MetricsEngine::default();
        let metrics = engine
            .compute_endurance_metrics(&[endurance_stage(1, 171, dec!(45))], dec!(190))
            .unwrap();

        assert_eq!(metrics.rows[0].percent_hr_max, dec!(90));
        assert!(!metrics.rows[0].exceeds_threshold);
    }

    #[test]
    fn test_threshold_exceeded() {
        let engine = MetricsEngine::default();
        let metrics = engine
            .compute_endurance_metrics(&[endurance_stage(1, 180, dec!(45))], dec!(190))
            .unwrap();

        assert_eq!(metrics.rows[0].percent_hr_max.round_dp(2), dec!(94.74));
        assert!(metrics.rows[0].exceeds_threshold);
        assert_eq!(metrics.flagged_stages(), 1);
    }

    #[test]
    fn test_zero_heart_rate() {
        let engine = MetricsEngine::default();
        let metrics = engine
            .compute_endurance_metrics(&[endurance_stage(1, 0, dec!(12))], dec!(190))
            .unwrap();

        assert_eq!(metrics.rows[0].percent_hr_max, Decimal::ZERO);
        assert!(!metrics.rows[0].exceeds_threshold);
    }

    #[test]
    fn test_invalid_predicted_hr_max() {
        let engine = MetricsEngine::default();
        let records = [endurance_stage(1, 150, dec!(40))];

        for bad in [dec!(0), dec!(-10)] {
            let err = engine.compute_endurance_metrics(&records, bad).unwrap_err();
            assert!(matches!(err, Vo2LabError::InvalidParameter { .. }));
        }
    }

    #[test]
    fn test_endurance_session_level_values() {
        let engine = MetricsEngine::default();
        let records = [
            endurance_stage(1, 150, dec!(40)),
            endurance_stage(2, 165, dec!(50)),
            endurance_stage(3, 182, dec!(54)),
        ];
        let metrics = engine.compute_endurance_metrics(&records, dec!(190)).unwrap();

        assert_eq!(metrics.vo2max, dec!(54));
        assert_eq!(metrics.vo2mean, dec!(48));
        assert_eq!(metrics.rows.len(), 3);
        assert_eq!(metrics.rows[2].record, records[2]);
    }

    #[test]
    fn test_custom_threshold_and_formula() {
        let engine = MetricsEngine::new(dec!(85), HrMaxFormula::Tanaka).unwrap();
        let participant = Participant::new(
            "P07",
            "Lab",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            40,
        );
        assert_eq!(engine.predicted_hr_max(&participant), dec!(180));

        let metrics = engine
            .endurance_for_participant(&[endurance_stage(1, 162, dec!(44))], &participant)
            .unwrap();
        assert_eq!(metrics.rows[0].percent_hr_max, dec!(90));
        assert!(metrics.rows[0].exceeds_threshold);

        assert!(MetricsEngine::new(dec!(0), HrMaxFormula::Fox).is_err());
    }

    #[test]
    fn test_metrics_serialization() {
        let summary =
            MetricsEngine::compute_simple_summary(&simple(&[dec!(30.5), dec!(40.5)])).unwrap();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"max_stage\":2"));

        let deserialized: Vo2Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, summary);
    }
}
