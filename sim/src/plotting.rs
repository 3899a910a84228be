//! Per-axis trajectory charts for a single flight.
use heliland::sim::{FlightResult, FlightStep};
use plotters::prelude::*;
use std::error::Error;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}
impl Axis {
    const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    /// True, estimated and observed coordinate of one step.
    fn values(self, step: &FlightStep) -> [f64; 3] {
        match self {
            Axis::X => [step.true_x, step.estimated_x, step.observed_x],
            Axis::Y => [step.true_y, step.estimated_y, step.observed_y],
            Axis::Z => [step.true_z, step.estimated_z, step.observed_z],
        }
    }
}

/// Padded value range covering every series; widened when the series are flat.
fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return -1.0..1.0;
    }
    let pad = (max - min) * 0.05;
    if pad <= f64::EPSILON {
        return (min - 1.0)..(max + 1.0);
    }
    (min - pad)..(max + pad)
}

/// Chart the true, estimated and observed position of `result` against the step number, one SVG
/// per axis named `trajectory_<id>_<axis>.svg` in `output_dir`. Returns the written paths.
pub fn plot_trajectory(
    result: &FlightResult,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    if result.steps.is_empty() {
        return Err("No data points to plot".into());
    }
    let last_step = result.steps.len().max(2) as f64;
    let mut written = Vec::with_capacity(Axis::ALL.len());

    for axis in Axis::ALL {
        let path = output_dir.join(format!("trajectory_{}_{}.svg", result.id, axis.name()));
        let range = value_range(result.steps.iter().flat_map(|s| axis.values(s)));
        let series = |index: usize| {
            result
                .steps
                .iter()
                .map(move |s| (s.step as f64, axis.values(s)[index]))
        };

        let root = SVGBackend::new(&path, (1200, 400)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!(
                    "Flight {} ({}): {} position",
                    result.id,
                    result.layout,
                    axis.name()
                ),
                ("sans-serif", 16).into_font(),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..last_step, range)?;
        chart
            .configure_mesh()
            .x_desc("Step")
            .y_desc(axis.name())
            .draw()?;

        chart
            .draw_series(LineSeries::new(series(0), &BLUE))?
            .label("True")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
        chart
            .draw_series(LineSeries::new(series(1), &RED))?
            .label("Estimated")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
        chart
            .draw_series(LineSeries::new(series(2), &GREEN))?
            .label("Observed")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GREEN));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        drop(chart);
        // the backend borrows the path until dropped
        drop(root);
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heliland::LandmarkLayout;
    use heliland::sim::{SimulationConfig, run_flight};
    use std::fs;
    use tempfile::tempdir;

    fn short_flight() -> FlightResult {
        let config = SimulationConfig {
            num_particles: 20,
            flights_per_layout: 1,
            max_steps: 15,
            layouts: vec![LandmarkLayout::Cross],
            ..SimulationConfig::default()
        };
        run_flight(3, LandmarkLayout::Cross, &config, 5).unwrap()
    }

    #[test]
    fn test_plot_trajectory_writes_one_chart_per_axis() {
        let dir = tempdir().unwrap();
        let result = short_flight();
        assert!(!result.steps.is_empty());

        let files = plot_trajectory(&result, dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        for axis in ["x", "y", "z"] {
            let path = dir.path().join(format!("trajectory_3_{axis}.svg"));
            assert!(files.contains(&path));
            assert!(path.exists(), "{}", path.display());
            let contents = fs::read_to_string(&path).unwrap();
            assert!(contents.contains("<svg"));
            assert!(contents.contains("<polyline"));
        }
    }

    #[test]
    fn test_plot_trajectory_without_steps_fails() {
        let dir = tempdir().unwrap();
        let mut result = short_flight();
        result.steps.clear();
        assert!(plot_trajectory(&result, dir.path()).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_value_range() {
        let range = value_range([1.0, 3.0, f64::NAN, 2.0].into_iter());
        assert!(range.start < 1.0 && range.end > 3.0);
        assert_eq!(value_range([4.0, 4.0].into_iter()), 3.0..5.0);
        assert_eq!(value_range(std::iter::empty()), -1.0..1.0);
    }
}
