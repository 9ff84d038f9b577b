//! Predicted maximum heart rate
//!
//! The estimate only feeds the %HRmax column of the endurance phase. The
//! formula is a configuration choice; none of them is validated here.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::Participant;

/// Formula used to predict HRmax from age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HrMaxFormula {
    /// 220 - age
    #[default]
    Fox,
    /// 208 - 0.7 x age
    Tanaka,
    /// 211 - 0.64 x age
    Nes,
    /// Measured or externally supplied HRmax, age is ignored
    Fixed(u16),
}

impl HrMaxFormula {
    /// Predicted HRmax in bpm for the given age.
    ///
    /// Ages past the formula's intercept yield zero or negative values; those
    /// are rejected where the value is used as a divisor.
    pub fn predict(&self, age: u16) -> Decimal {
        let age = Decimal::from(age);
        match self {
            HrMaxFormula::Fox => dec!(220) - age,
            HrMaxFormula::Tanaka => dec!(208) - dec!(0.7) * age,
            HrMaxFormula::Nes => dec!(211) - dec!(0.64) * age,
            HrMaxFormula::Fixed(bpm) => Decimal::from(*bpm),
        }
    }

    pub fn for_participant(&self, participant: &Participant) -> Decimal {
        self.predict(participant.age)
    }
}

impl fmt::Display for HrMaxFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HrMaxFormula::Fox => write!(f, "220 - age"),
            HrMaxFormula::Tanaka => write!(f, "208 - 0.7 x age"),
            HrMaxFormula::Nes => write!(f, "211 - 0.64 x age"),
            HrMaxFormula::Fixed(bpm) => write!(f, "fixed {} bpm", bpm),
        }
    }
}

impl FromStr for HrMaxFormula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fox" => Ok(HrMaxFormula::Fox),
            "tanaka" => Ok(HrMaxFormula::Tanaka),
            "nes" => Ok(HrMaxFormula::Nes),
            other => other
                .parse::<u16>()
                .map(HrMaxFormula::Fixed)
                .map_err(|_| {
                    format!(
                        "Unknown HRmax formula: '{}'. Valid options: fox, tanaka, nes or a bpm value",
                        s
                    )
                }),
        }
    }
}
