use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant metadata captured once at the start of a test session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant number or code (free text)
    pub id: String,

    /// Name of the researcher running the test
    pub researcher: String,

    /// Date the test was performed
    pub test_date: NaiveDate,

    /// Age in years, used to derive the predicted maximum heart rate
    pub age: u16,
}

impl Participant {
    pub fn new(
        id: impl Into<String>,
        researcher: impl Into<String>,
        test_date: NaiveDate,
        age: u16,
    ) -> Self {
        Participant {
            id: id.into(),
            researcher: researcher.into(),
            test_date,
            age,
        }
    }
}

/// Test phases a session can record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Minute-by-minute VO2 readings only
    Simple,
    /// Sub-maximal stages at increasing speed
    RunningEconomy,
    /// Incremental gradient stages to exhaustion
    Endurance,
}

impl Phase {
    /// Prefix used for export filenames
    pub fn export_prefix(&self) -> &'static str {
        match self {
            Phase::Simple => "VO2",
            Phase::RunningEconomy => "RunningEconomy",
            Phase::Endurance => "VO2max",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Simple => write!(f, "Simple test"),
            Phase::RunningEconomy => write!(f, "Running economy"),
            Phase::Endurance => write!(f, "VO2max test"),
        }
    }
}

/// Common view over the per-phase stage record types
pub trait StageRecord {
    /// Phase this record kind belongs to
    const PHASE: Phase;

    /// 1-based stage index
    fn stage(&self) -> u8;

    /// Oxygen uptake in ml/kg/min
    fn vo2(&self) -> Decimal;
}

/// Stage records that also carry heart rate and perceived exertion
pub trait HeartRateRecord: StageRecord {
    fn heart_rate(&self) -> u16;

    fn rpe(&self) -> u8;
}

/// One minute of a simple VO2 test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleStage {
    pub stage: u8,
    pub vo2: Decimal,
}

/// One speed stage of a running-economy test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningEconomyStage {
    pub stage: u8,

    /// Treadmill speed in km/h
    pub speed_kmh: Decimal,

    pub vo2: Decimal,

    /// Heart rate in beats per minute
    pub heart_rate: u16,

    /// Rating of perceived exertion (Borg 6-20)
    pub rpe: u8,
}

/// One gradient stage of an endurance/VO2max test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnduranceStage {
    pub stage: u8,

    /// Treadmill gradient in percent
    pub gradient_pct: Decimal,

    pub vo2: Decimal,

    /// Heart rate in beats per minute
    pub heart_rate: u16,

    /// Rating of perceived exertion (Borg 6-20)
    pub rpe: u8,
}

impl StageRecord for SimpleStage {
    const PHASE: Phase = Phase::Simple;

    fn stage(&self) -> u8 {
        self.stage
    }

    fn vo2(&self) -> Decimal {
        self.vo2
    }
}

impl StageRecord for RunningEconomyStage {
    const PHASE: Phase = Phase::RunningEconomy;

    fn stage(&self) -> u8 {
        self.stage
    }

    fn vo2(&self) -> Decimal {
        self.vo2
    }
}

impl StageRecord for EnduranceStage {
    const PHASE: Phase = Phase::Endurance;

    fn stage(&self) -> u8 {
        self.stage
    }

    fn vo2(&self) -> Decimal {
        self.vo2
    }
}

impl HeartRateRecord for RunningEconomyStage {
    fn heart_rate(&self) -> u16 {
        self.heart_rate
    }

    fn rpe(&self) -> u8 {
        self.rpe
    }
}

impl HeartRateRecord for EnduranceStage {
    fn heart_rate(&self) -> u16 {
        self.heart_rate
    }

    fn rpe(&self) -> u8 {
        self.rpe
    }
}

/// The ordered records of one submitted phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseRecords {
    Simple(Vec<SimpleStage>),
    RunningEconomy(Vec<RunningEconomyStage>),
    Endurance(Vec<EnduranceStage>),
}

impl PhaseRecords {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseRecords::Simple(_) => Phase::Simple,
            PhaseRecords::RunningEconomy(_) => Phase::RunningEconomy,
            PhaseRecords::Endurance(_) => Phase::Endurance,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PhaseRecords::Simple(records) => records.len(),
            PhaseRecords::RunningEconomy(records) => records.len(),
            PhaseRecords::Endurance(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_phase_export_prefix() {
        assert_eq!(Phase::Simple.export_prefix(), "VO2");
        assert_eq!(Phase::RunningEconomy.export_prefix(), "RunningEconomy");
        assert_eq!(Phase::Endurance.export_prefix(), "VO2max");
    }

    #[test]
    fn test_phase_records() {
        let records = PhaseRecords::Simple(vec![
            SimpleStage { stage: 1, vo2: dec!(12.5) },
            SimpleStage { stage: 2, vo2: dec!(18.0) },
        ]);

        assert_eq!(records.phase(), Phase::Simple);
        assert_eq!(records.len(), 2);
        assert!(!records.is_empty());
        assert!(PhaseRecords::Endurance(Vec::new()).is_empty());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Endurance.to_string(), "VO2max test");
        assert_eq!(Phase::RunningEconomy.to_string(), "Running economy");
    }
}
