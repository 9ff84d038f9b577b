use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

use super::{ExportArtifact, ExportFormat};
use crate::error::{Result, Vo2LabError};
use crate::metrics::{MetricsEngine, Vo2Summary};
use crate::models::{Participant, Phase, PhaseRecords};
use crate::session::SessionModel;

/// Per-phase section of a session report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub summary: Vo2Summary,
    /// Only present for the endurance phase
    pub predicted_hr_max: Option<Decimal>,
    /// Stages above the %HRmax threshold (endurance phase only)
    pub flagged_stages: Option<usize>,
}

/// Summary of everything recorded in one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub participant: Participant,
    pub generated_at: DateTime<Utc>,
    pub phases: Vec<PhaseReport>,
}

impl SessionReport {
    /// Summarise every recorded phase of the session
    pub fn build(session: &SessionModel, engine: &MetricsEngine) -> Result<Self> {
        let mut phases = Vec::new();

        for phase in session.recorded_phases() {
            let Some(records) = session.phase(phase) else {
                continue;
            };

            let report = match records {
                PhaseRecords::Endurance(stages) => {
                    let metrics = engine.endurance_for_participant(stages, session.participant())?;
                    PhaseReport {
                        phase,
                        summary: MetricsEngine::compute_simple_summary(stages)?,
                        predicted_hr_max: Some(metrics.predicted_hr_max),
                        flagged_stages: Some(metrics.flagged_stages()),
                    }
                }
                other => PhaseReport {
                    phase,
                    summary: MetricsEngine::summarize_phase(other)?,
                    predicted_hr_max: None,
                    flagged_stages: None,
                },
            };
            phases.push(report);
        }

        Ok(SessionReport {
            session_id: session.session_id(),
            participant: session.participant().clone(),
            generated_at: Utc::now(),
            phases,
        })
    }

    /// Pretty-printed JSON artifact named after the participant
    pub fn to_artifact(&self) -> Result<ExportArtifact> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| Vo2LabError::Serialization(e.to_string()))?;

        Ok(ExportArtifact {
            filename: format!(
                "Session_{}.{}",
                super::sanitize_component(&self.participant.id),
                ExportFormat::Json.extension()
            ),
            bytes,
            rows: self.phases.len(),
        })
    }
}

/// Export any serializable data structure to JSON
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<()>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let json_data = serde_json::to_string_pretty(data)
        .map_err(|e| Vo2LabError::Serialization(e.to_string()))?;

    let mut file = std::fs::File::create(output_path)?;
    file.write_all(json_data.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PhaseInput;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::NamedTempFile;

    fn create_test_session(age: u16) -> SessionModel {
        let mut session = SessionModel::new(Participant::new(
            "P03",
            "Dr. Jones",
            NaiveDate::from_ymd_opt(2024, 9, 23).unwrap(),
            age,
        ));
        session
            .record_phase(2, PhaseInput::Simple { vo2: vec![dec!(30), dec!(40)] })
            .unwrap();
        session
            .record_phase(
                2,
                PhaseInput::Endurance {
                    gradient_pct: vec![dec!(0), dec!(2)],
                    vo2: vec![dec!(44), dec!(52)],
                    heart_rate: vec![165, 186],
                    rpe: vec![14, 19],
                },
            )
            .unwrap();
        session
    }

    #[test]
    fn test_build_session_report() {
        let session = create_test_session(30);
        let report = SessionReport::build(&session, &MetricsEngine::default()).unwrap();

        assert_eq!(report.session_id, session.session_id());
        assert_eq!(report.phases.len(), 2);
        assert_eq!(report.phases[0].phase, Phase::Simple);
        assert_eq!(report.phases[0].summary.mean, dec!(35));
        assert_eq!(report.phases[0].predicted_hr_max, None);

        let endurance = &report.phases[1];
        assert_eq!(endurance.summary.max, dec!(52));
        assert_eq!(endurance.predicted_hr_max, Some(dec!(190)));
        assert_eq!(endurance.flagged_stages, Some(1));
    }

    #[test]
    fn test_report_fails_on_invalid_hr_max() {
        let session = create_test_session(225);
        let err = SessionReport::build(&session, &MetricsEngine::default()).unwrap_err();
        assert!(matches!(err, Vo2LabError::InvalidParameter { .. }));
    }

    #[test]
    fn test_report_artifact() {
        let session = create_test_session(30);
        let report = SessionReport::build(&session, &MetricsEngine::default()).unwrap();
        let artifact = report.to_artifact().unwrap();

        assert_eq!(artifact.filename, "Session_P03.json");
        let content = String::from_utf8(artifact.bytes).unwrap();
        assert!(content.contains("\"researcher\": \"Dr. Jones\""));
        assert!(content.contains("\"phase\": \"Endurance\""));
    }

    #[test]
    fn test_export_json_generic() {
        #[derive(serde::Serialize)]
        struct TestData {
            name: String,
            value: u32,
        }

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let temp_file = NamedTempFile::new().unwrap();
        export_json(&data, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("\"name\": \"test\""));
        assert!(content.contains("\"value\": 42"));
    }
}
