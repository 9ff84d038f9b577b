//! Stage-indexed series for chart surfaces
//!
//! Series are plain `(stage, value)` pairs in stage order. Rendering is left to
//! the caller, except for the optional SVG line chart behind the `charts`
//! feature.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::metrics::EnduranceMetrics;
use crate::models::{HeartRateRecord, StageRecord};

/// One line of a stage chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub label: String,
    pub unit: String,
    pub points: Vec<(u8, Decimal)>,
}

impl ChartSeries {
    pub fn new(label: impl Into<String>, unit: impl Into<String>, points: Vec<(u8, Decimal)>) -> Self {
        ChartSeries {
            label: label.into(),
            unit: unit.into(),
            points,
        }
    }

    /// Paired x/y sequences as floating point
    pub fn xy(&self) -> (Vec<f64>, Vec<f64>) {
        self.points
            .iter()
            .map(|(stage, value)| (f64::from(*stage), value.to_f64().unwrap_or(f64::NAN)))
            .unzip()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub fn vo2_series<R: StageRecord>(records: &[R]) -> ChartSeries {
    ChartSeries::new(
        format!("VO2 ({})", R::PHASE),
        "ml/kg/min",
        records.iter().map(|r| (r.stage(), r.vo2())).collect(),
    )
}

pub fn heart_rate_series<R: HeartRateRecord>(records: &[R]) -> ChartSeries {
    ChartSeries::new(
        format!("Heart rate ({})", R::PHASE),
        "bpm",
        records
            .iter()
            .map(|r| (r.stage(), Decimal::from(r.heart_rate())))
            .collect(),
    )
}

pub fn rpe_series<R: HeartRateRecord>(records: &[R]) -> ChartSeries {
    ChartSeries::new(
        format!("RPE ({})", R::PHASE),
        "Borg 6-20",
        records
            .iter()
            .map(|r| (r.stage(), Decimal::from(r.rpe())))
            .collect(),
    )
}

pub fn percent_hr_max_series(metrics: &EnduranceMetrics) -> ChartSeries {
    ChartSeries::new(
        "%HRmax",
        "%",
        metrics
            .rows
            .iter()
            .map(|row| (row.record.stage, row.percent_hr_max))
            .collect(),
    )
}

#[cfg(feature = "charts")]
pub use render::render_svg;

#[cfg(feature = "charts")]
mod render {
    use plotters::prelude::*;
    use std::path::Path;
    use tracing::info;

    use super::ChartSeries;
    use crate::error::{Result, Vo2LabError};

    fn chart_error<E: std::fmt::Display>(e: E) -> Vo2LabError {
        Vo2LabError::Chart(e.to_string())
    }

    /// Draw the series as an SVG line chart at `path`
    pub fn render_svg<P: AsRef<Path>>(series: &ChartSeries, path: P) -> Result<()> {
        if series.is_empty() {
            return Err(Vo2LabError::empty_input("render chart"));
        }

        let (xs, ys) = series.xy();
        let x_max = xs.iter().copied().fold(1.0, f64::max) + 0.5;
        let y_top = ys.iter().copied().fold(0.0, f64::max);
        let y_max = if y_top > 0.0 { y_top * 1.1 } else { 1.0 };

        let root = SVGBackend::new(path.as_ref(), (800, 480)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&series.label, ("sans-serif", 24))
            .margin(12)
            .x_label_area_size(36)
            .y_label_area_size(52)
            .build_cartesian_2d(0.5f64..x_max, 0f64..y_max)
            .map_err(chart_error)?;

        chart
            .configure_mesh()
            .x_desc("Stage")
            .y_desc(series.unit.as_str())
            .draw()
            .map_err(chart_error)?;

        chart
            .draw_series(LineSeries::new(
                xs.iter().copied().zip(ys.iter().copied()),
                &BLUE,
            ))
            .map_err(chart_error)?;

        chart
            .draw_series(
                xs.iter()
                    .zip(ys.iter())
                    .map(|(&x, &y)| Circle::new((x, y), 3, BLUE.filled())),
            )
            .map_err(chart_error)?;

        root.present().map_err(chart_error)?;

        info!(path = %path.as_ref().display(), series = %series.label, "Chart rendered");
        Ok(())
    }
}
