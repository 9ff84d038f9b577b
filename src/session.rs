//! Session model for a single test session
//!
//! Holds the participant and the validated stage records of each submitted
//! phase. A phase is absent until its form has been submitted, and each
//! submission replaces the previous one for that phase atomically.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ValidationError};
use crate::models::{
    EnduranceStage, Participant, Phase, PhaseRecords, RunningEconomyStage, SimpleStage,
};

/// Decimal places kept for VO2, speed and gradient in exports
pub const MEASUREMENT_DP: u32 = 1;

/// Bounds applied to every phase submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolLimits {
    /// Fewest stages a phase may declare
    pub min_stages: u8,

    /// Most stages a phase may declare
    pub max_stages: u8,

    /// Stage count the form surface proposes initially
    pub default_stages: u8,

    /// Lowest valid RPE (inclusive)
    pub rpe_min: u8,

    /// Highest valid RPE (inclusive)
    pub rpe_max: u8,

    /// Upper bound for VO2, speed and gradient values (inclusive)
    #[serde(default = "default_max_measurement")]
    pub max_measurement: Decimal,
}

fn default_max_measurement() -> Decimal {
    dec!(1000)
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        ProtocolLimits {
            min_stages: 1,
            max_stages: 20,
            default_stages: 8,
            rpe_min: 6,
            rpe_max: 20,
            max_measurement: default_max_measurement(),
        }
    }
}

/// Raw per-field values for one phase, as collected by the form surface.
///
/// Integer fields are signed so that invalid negative input can reach
/// validation instead of being silently wrapped.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseInput {
    Simple {
        vo2: Vec<Decimal>,
    },
    RunningEconomy {
        speed_kmh: Vec<Decimal>,
        vo2: Vec<Decimal>,
        heart_rate: Vec<i32>,
        rpe: Vec<i32>,
    },
    Endurance {
        gradient_pct: Vec<Decimal>,
        vo2: Vec<Decimal>,
        heart_rate: Vec<i32>,
        rpe: Vec<i32>,
    },
}

impl PhaseInput {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseInput::Simple { .. } => Phase::Simple,
            PhaseInput::RunningEconomy { .. } => Phase::RunningEconomy,
            PhaseInput::Endurance { .. } => Phase::Endurance,
        }
    }
}

/// One participant's test session
#[derive(Debug, Clone)]
pub struct SessionModel {
    id: Uuid,
    participant: Participant,
    limits: ProtocolLimits,
    phases: BTreeMap<Phase, PhaseRecords>,
}

impl SessionModel {
    /// Start a session with the default protocol limits
    pub fn new(participant: Participant) -> Self {
        Self::with_limits(participant, ProtocolLimits::default())
    }

    pub fn with_limits(participant: Participant, limits: ProtocolLimits) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, participant = %participant.id, "Session started");

        SessionModel {
            id,
            participant,
            limits,
            phases: BTreeMap::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn limits(&self) -> &ProtocolLimits {
        &self.limits
    }

    /// Validate and store a phase submission.
    ///
    /// Either the whole phase is replaced or, on error, the session is left
    /// exactly as it was.
    pub fn record_phase(&mut self, stage_count: u32, input: PhaseInput) -> Result<&PhaseRecords> {
        let phase = input.phase();

        let records = match self.build_records(stage_count, &input) {
            Ok(records) => records,
            Err(e) => {
                warn!(session = %self.id, phase = %phase, error = %e, "Phase submission rejected");
                return Err(e.into());
            }
        };

        let replaced = self.phases.insert(phase, records).is_some();
        info!(
            session = %self.id,
            phase = %phase,
            stages = stage_count,
            replaced,
            "Phase recorded"
        );

        Ok(&self.phases[&phase])
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseRecords> {
        self.phases.get(&phase)
    }

    pub fn is_recorded(&self, phase: Phase) -> bool {
        self.phases.contains_key(&phase)
    }

    /// Phases submitted so far, in declaration order
    pub fn recorded_phases(&self) -> Vec<Phase> {
        self.phases.keys().copied().collect()
    }

    pub fn simple(&self) -> Option<&[SimpleStage]> {
        match self.phases.get(&Phase::Simple) {
            Some(PhaseRecords::Simple(records)) => Some(records),
            _ => None,
        }
    }

    pub fn running_economy(&self) -> Option<&[RunningEconomyStage]> {
        match self.phases.get(&Phase::RunningEconomy) {
            Some(PhaseRecords::RunningEconomy(records)) => Some(records),
            _ => None,
        }
    }

    pub fn endurance(&self) -> Option<&[EnduranceStage]> {
        match self.phases.get(&Phase::Endurance) {
            Some(PhaseRecords::Endurance(records)) => Some(records),
            _ => None,
        }
    }

    fn build_records(
        &self,
        stage_count: u32,
        input: &PhaseInput,
    ) -> std::result::Result<PhaseRecords, ValidationError> {
        let count = self.check_stage_count(stage_count)?;
        let phase = input.phase();
        let expected = count as usize;

        match input {
            PhaseInput::Simple { vo2 } => {
                check_len(phase, "vo2", vo2.len(), expected)?;

                let mut records = Vec::with_capacity(expected);
                for (stage, &value) in (1..=count).zip(vo2) {
                    records.push(SimpleStage {
                        stage,
                        vo2: self.measured("vo2", stage, value)?,
                    });
                }

                Ok(PhaseRecords::Simple(records))
            }
            PhaseInput::RunningEconomy {
                speed_kmh,
                vo2,
                heart_rate,
                rpe,
            } => {
                check_len(phase, "speed", speed_kmh.len(), expected)?;
                check_len(phase, "vo2", vo2.len(), expected)?;
                check_len(phase, "heart_rate", heart_rate.len(), expected)?;
                check_len(phase, "rpe", rpe.len(), expected)?;

                let mut records = Vec::with_capacity(expected);
                for (i, stage) in (1..=count).enumerate() {
                    records.push(RunningEconomyStage {
                        stage,
                        speed_kmh: self.measured("speed", stage, speed_kmh[i])?,
                        vo2: self.measured("vo2", stage, vo2[i])?,
                        heart_rate: heart_rate_bpm(stage, heart_rate[i])?,
                        rpe: self.check_rpe(stage, rpe[i])?,
                    });
                }

                Ok(PhaseRecords::RunningEconomy(records))
            }
            PhaseInput::Endurance {
                gradient_pct,
                vo2,
                heart_rate,
                rpe,
            } => {
                check_len(phase, "gradient", gradient_pct.len(), expected)?;
                check_len(phase, "vo2", vo2.len(), expected)?;
                check_len(phase, "heart_rate", heart_rate.len(), expected)?;
                check_len(phase, "rpe", rpe.len(), expected)?;

                let mut records = Vec::with_capacity(expected);
                for (i, stage) in (1..=count).enumerate() {
                    records.push(EnduranceStage {
                        stage,
                        gradient_pct: self.measured("gradient", stage, gradient_pct[i])?,
                        vo2: self.measured("vo2", stage, vo2[i])?,
                        heart_rate: heart_rate_bpm(stage, heart_rate[i])?,
                        rpe: self.check_rpe(stage, rpe[i])?,
                    });
                }

                Ok(PhaseRecords::Endurance(records))
            }
        }
    }

    fn check_stage_count(&self, stage_count: u32) -> std::result::Result<u8, ValidationError> {
        let min = self.limits.min_stages;
        let max = self.limits.max_stages;

        match u8::try_from(stage_count) {
            Ok(count) if (min..=max).contains(&count) => Ok(count),
            _ => Err(ValidationError::StageCountOutOfRange {
                count: stage_count,
                min,
                max,
            }),
        }
    }

    /// VO2, speed and gradient: non-negative, bounded, at most one decimal place
    fn measured(
        &self,
        field: &'static str,
        stage: u8,
        value: Decimal,
    ) -> std::result::Result<Decimal, ValidationError> {
        let reason = if value.is_sign_negative() && !value.is_zero() {
            Some("must not be negative".to_string())
        } else if value > self.limits.max_measurement {
            Some(format!("must not exceed {}", self.limits.max_measurement))
        } else if value.normalize().scale() > MEASUREMENT_DP {
            Some(format!("must have at most {} decimal place", MEASUREMENT_DP))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ValidationError::OutOfRange {
                field,
                stage,
                value: value.to_string(),
                reason,
            }),
            None => Ok(value),
        }
    }

    fn check_rpe(&self, stage: u8, value: i32) -> std::result::Result<u8, ValidationError> {
        let min = i32::from(self.limits.rpe_min);
        let max = i32::from(self.limits.rpe_max);

        if (min..=max).contains(&value) {
            // Bounds are u8, so the value fits
            Ok(value as u8)
        } else {
            Err(ValidationError::OutOfRange {
                field: "rpe",
                stage,
                value: value.to_string(),
                reason: format!("must be within {}-{}", min, max),
            })
        }
    }
}

fn check_len(
    phase: Phase,
    field: &'static str,
    actual: usize,
    expected: usize,
) -> std::result::Result<(), ValidationError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ValidationError::LengthMismatch {
            phase,
            field,
            expected,
            actual,
        })
    }
}


fn heart_rate_bpm(stage: u8, value: i32) -> std::result::Result<u16, ValidationError> {
    u16::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field: "heart_rate",
        stage,
        value: value.to_string(),
        reason: if value < 0 {
            "must not be negative".to_string()
        } else {
            format!("must not exceed {}", u16::MAX)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Vo2LabError;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn create_test_session() -> SessionModel {
        SessionModel::new(Participant::new(
            "P01",
            "Dr. Smith",
            NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
            30,
        ))
    }

    fn endurance_input() -> PhaseInput {
        PhaseInput::Endurance {
            gradient_pct: vec![dec!(0), dec!(2.5), dec!(5)],
            vo2: vec![dec!(35.2), dec!(42.8), dec!(51.1)],
            heart_rate: vec![150, 171, 185],
            rpe: vec![11, 15, 19],
        }
    }

    #[test]
    fn test_record_simple_phase() {
        let mut session = create_test_session();
        assert!(!session.is_recorded(Phase::Simple));

        session
            .record_phase(3, PhaseInput::Simple { vo2: vec![dec!(10), dec!(20), dec!(30)] })
            .unwrap();

        let records = session.simple().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records.iter().map(|r| r.stage).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(records[2].vo2, dec!(30));
        assert_eq!(session.recorded_phases(), vec![Phase::Simple]);
    }

    #[test]
    fn test_record_endurance_phase() {
        let mut session = create_test_session();
        session.record_phase(3, endurance_input()).unwrap();

        let records = session.endurance().unwrap();
        assert_eq!(records[1].gradient_pct, dec!(2.5));
        assert_eq!(records[1].heart_rate, 171);
        assert_eq!(records[2].rpe, 19);
        assert!(session.simple().is_none());
        assert!(session.running_economy().is_none());
    }

    #[test]
    fn test_stage_count_bounds() {
        let mut session = create_test_session();

        let err = session
            .record_phase(0, PhaseInput::Simple { vo2: vec![] })
            .unwrap_err();
        assert!(matches!(
            err,
            Vo2LabError::Validation(ValidationError::StageCountOutOfRange { count: 0, .. })
        ));

        let err = session
            .record_phase(21, PhaseInput::Simple { vo2: vec![dec!(40); 21] })
            .unwrap_err();
        assert!(matches!(
            err,
            Vo2LabError::Validation(ValidationError::StageCountOutOfRange { count: 21, .. })
        ));

        assert!(session.record_phase(300, PhaseInput::Simple { vo2: vec![] }).is_err());
    }

    #[test]
    fn test_length_mismatch_names_field() {
        let mut session = create_test_session();
        let input = PhaseInput::RunningEconomy {
            speed_kmh: vec![dec!(8), dec!(10)],
            vo2: vec![dec!(30), dec!(36)],
            heart_rate: vec![140, 155],
            rpe: vec![10],
        };

        let err = session.record_phase(2, input).unwrap_err();
        match err {
            Vo2LabError::Validation(ValidationError::LengthMismatch {
                field,
                expected,
                actual,
                ..
            }) => {
                assert_eq!(field, "rpe");
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_range_violations() {
        let mut session = create_test_session();

        let mut bad_rpe = endurance_input();
        if let PhaseInput::Endurance { rpe, .. } = &mut bad_rpe {
            rpe[1] = 21;
        }
        assert!(session.record_phase(3, bad_rpe).is_err());

        let mut low_rpe = endurance_input();
        if let PhaseInput::Endurance { rpe, .. } = &mut low_rpe {
            rpe[0] = 5;
        }
        assert!(session.record_phase(3, low_rpe).is_err());

        let mut negative_hr = endurance_input();
        if let PhaseInput::Endurance { heart_rate, .. } = &mut negative_hr {
            heart_rate[2] = -1;
        }
        assert!(session.record_phase(3, negative_hr).is_err());

        let mut negative_gradient = endurance_input();
        if let PhaseInput::Endurance { gradient_pct, .. } = &mut negative_gradient {
            gradient_pct[0] = dec!(-0.5);
        }
        assert!(session.record_phase(3, negative_gradient).is_err());

        let err = session
            .record_phase(1, PhaseInput::Simple { vo2: vec![dec!(-1)] })
            .unwrap_err();
        assert!(err.to_string().contains("vo2 at stage 1"));

        assert!(session.recorded_phases().is_empty());
    }

    #[test]
    fn test_running_economy_range_violations() {
        let mut session = create_test_session();
        session
            .record_phase(1, PhaseInput::Simple { vo2: vec![dec!(31.5)] })
            .unwrap();
        let before = session.phase(Phase::Simple).cloned();

        let err = session
            .record_phase(
                2,
                PhaseInput::RunningEconomy {
                    speed_kmh: vec![dec!(8), dec!(-10)],
                    vo2: vec![dec!(30), dec!(36)],
                    heart_rate: vec![140, 155],
                    rpe: vec![10, 12],
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Vo2LabError::Validation(ValidationError::OutOfRange { field: "speed", stage: 2, .. })
        ));

        let err = session
            .record_phase(
                2,
                PhaseInput::RunningEconomy {
                    speed_kmh: vec![dec!(8), dec!(10)],
                    vo2: vec![dec!(30), dec!(36)],
                    heart_rate: vec![140, 70_000],
                    rpe: vec![10, 12],
                },
            )
            .unwrap_err();
        match err {
            Vo2LabError::Validation(ValidationError::OutOfRange {
                field,
                stage,
                reason,
                ..
            }) => {
                assert_eq!(field, "heart_rate");
                assert_eq!(stage, 2);
                assert_eq!(reason, "must not exceed 65535");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(!session.is_recorded(Phase::RunningEconomy));
        assert_eq!(session.phase(Phase::Simple).cloned(), before);
        assert_eq!(session.recorded_phases(), vec![Phase::Simple]);
    }

    #[test]
    fn test_measurement_precision() {
        let mut session = create_test_session();

        let err = session
            .record_phase(1, PhaseInput::Simple { vo2: vec![dec!(35.25)] })
            .unwrap_err();
        match err {
            Vo2LabError::Validation(ValidationError::OutOfRange { field, reason, .. }) => {
                assert_eq!(field, "vo2");
                assert_eq!(reason, "must have at most 1 decimal place");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(session.simple().is_none());

        // Trailing zeros do not count as precision
        let records = session
            .record_phase(2, PhaseInput::Simple { vo2: vec![dec!(35.20), dec!(40.000)] })
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_measurement_upper_bound() {
        let mut session = create_test_session();

        let err = session
            .record_phase(2, PhaseInput::Simple { vo2: vec![Decimal::MAX, Decimal::MAX] })
            .unwrap_err();
        assert!(matches!(
            err,
            Vo2LabError::Validation(ValidationError::OutOfRange { field: "vo2", stage: 1, .. })
        ));

        let mut gradient = endurance_input();
        if let PhaseInput::Endurance { gradient_pct, .. } = &mut gradient {
            gradient_pct[2] = dec!(1000.1);
        }
        assert!(session.record_phase(3, gradient).is_err());

        let records = session
            .record_phase(1, PhaseInput::Simple { vo2: vec![dec!(1000)] })
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_rpe_bounds_are_inclusive() {
        let mut session = create_test_session();
        let input = PhaseInput::RunningEconomy {
            speed_kmh: vec![dec!(8), dec!(10)],
            vo2: vec![dec!(30), dec!(36)],
            heart_rate: vec![0, 155],
            rpe: vec![6, 20],
        };

        let records = session.record_phase(2, input).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_negative_zero_is_accepted() {
        let mut session = create_test_session();
        let records = session
            .record_phase(1, PhaseInput::Simple { vo2: vec![-Decimal::ZERO] })
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_resubmission_replaces_phase() {
        let mut session = create_test_session();
        session
            .record_phase(2, PhaseInput::Simple { vo2: vec![dec!(10), dec!(20)] })
            .unwrap();
        session
            .record_phase(1, PhaseInput::Simple { vo2: vec![dec!(45)] })
            .unwrap();

        let records = session.simple().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vo2, dec!(45));
    }

    #[test]
    fn test_failed_submission_keeps_prior_state() {
        let mut session = create_test_session();
        session.record_phase(3, endurance_input()).unwrap();
        session
            .record_phase(2, PhaseInput::Simple { vo2: vec![dec!(10), dec!(20)] })
            .unwrap();
        let before = session.phase(Phase::Endurance).cloned();

        let mut bad = endurance_input();
        if let PhaseInput::Endurance { vo2, .. } = &mut bad {
            vo2[2] = dec!(-3);
        }
        assert!(session.record_phase(3, bad).is_err());

        assert_eq!(session.phase(Phase::Endurance).cloned(), before);
        assert_eq!(session.simple().unwrap().len(), 2);
    }

    #[test]
    fn test_custom_limits() {
        let limits = ProtocolLimits {
            max_stages: 4,
            rpe_min: 1,
            rpe_max: 10,
            ..ProtocolLimits::default()
        };
        let mut session = SessionModel::with_limits(create_test_session().participant().clone(), limits);

        assert!(session
            .record_phase(5, PhaseInput::Simple { vo2: vec![dec!(30); 5] })
            .is_err());

        let input = PhaseInput::RunningEconomy {
            speed_kmh: vec![dec!(8)],
            vo2: vec![dec!(30)],
            heart_rate: vec![140],
            rpe: vec![3],
        };
        assert!(session.record_phase(1, input).is_ok());
    }
}
