//! Simulated landing flights driven by the particle filter.
//!
//! This module provides:
//! - Guidance: [`plan_move`] and [`has_landed`]
//! - A serializable [`SimulationConfig`] that can be read from and written to JSON, YAML or TOML
//! - The flight loop ([`run_flight`], [`fly`]) and batch runner ([`run_simulation`])
//! - [`FlightResult`] and [`FlightStatistics`] with CSV export and a plain-text report
//!
//! A flight spawns a [`Mover`] at a random distance from the platform, seeds a filter on its true pose and
//! then repeats plan, move, predict, observe, update, resample and estimate until the estimate reports a
//! landing or the travel budget runs out. The flight counts as a success only if the *true* pose is within
//! the landing accuracy of the target at the end.
use crate::measurements::{LandmarkLayout, mean_displacement, observe, to_sensor_frame};
use crate::motion::{Mover, MoverIds};
use crate::particle::{
    HeadingAveraging, ParticleFilter, ParticleFilterConfig, ParticleResamplingStrategy,
};
use crate::{FilterError, Noise, Pose};

use log::{debug, info};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Slack added to the landing accuracy when comparing distances.
pub const LANDING_TOLERANCE: f64 = 1e-6;

/// Plan the next move from `estimate` towards `target`.
///
/// The move points along `target - estimate` with length `min(step_size, distance)` and carries the absolute
/// heading `atan2(dy, dx)` of that direction. If the estimate already sits on the target the move is zero
/// and keeps the estimate's heading.
pub fn plan_move(estimate: &Pose, target: &Pose, step_size: f64) -> Pose {
    let direction = target.position() - estimate.position();
    let distance = direction.norm();
    if distance == 0.0 {
        return Pose::new(0.0, 0.0, 0.0, estimate.heading);
    }
    let step = direction * (step_size.min(distance) / distance);
    Pose::new(step[0], step[1], step[2], direction[1].atan2(direction[0]))
}

/// Whether `position` is within `accuracy` (plus [`LANDING_TOLERANCE`]) of `target`.
pub fn has_landed(position: &Pose, target: &Pose, accuracy: f64) -> bool {
    position.distance_to(target) < accuracy + LANDING_TOLERANCE
}

/// Parameters of a batch of simulated flights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Particles per filter.
    pub num_particles: usize,
    /// Flights flown for every layout in `layouts`.
    pub flights_per_layout: usize,
    /// Maximum length of a planned move in meters.
    pub step_size: f64,
    /// Distance from the target under which a pose counts as landed.
    pub landing_accuracy: f64,
    /// A flight is abandoned once it has traveled this multiple of its shortest possible route.
    pub travel_budget_factor: f64,
    /// Hard cap on loop iterations per flight.
    pub max_steps: usize,
    /// Base seed. Flight `i` uses `seed + i`.
    pub seed: u64,
    pub resampling_strategy: ParticleResamplingStrategy,
    pub heading_averaging: HeadingAveraging,
    pub layouts: Vec<LandmarkLayout>,
    /// Landing point.
    pub target: Pose,
    pub observation_noise: Noise,
    pub motion_noise: Noise,
    pub filter_init_noise: Noise,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            num_particles: 100,
            flights_per_layout: 10,
            step_size: 1.0,
            landing_accuracy: 0.5,
            travel_budget_factor: 5.0,
            max_steps: 10_000,
            seed: 42,
            resampling_strategy: ParticleResamplingStrategy::default(),
            heading_averaging: HeadingAveraging::default(),
            layouts: LandmarkLayout::ALL.to_vec(),
            target: Pose::default(),
            observation_noise: Noise::positional(0.1),
            motion_noise: Noise::new(0.1, 0.1),
            filter_init_noise: Noise::new(0.5, 0.1),
        }
    }
}
impl Display for SimulationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Particles: {}", self.num_particles)?;
        writeln!(f, "Flights per layout: {}", self.flights_per_layout)?;
        writeln!(f, "Step size: {}", self.step_size)?;
        writeln!(f, "Landing accuracy: {}", self.landing_accuracy)?;
        writeln!(f, "Travel budget factor: {}", self.travel_budget_factor)?;
        writeln!(f, "Observation position noise: {}", self.observation_noise.position_std)?;
        writeln!(f, "Motion position noise: {}", self.motion_noise.position_std)?;
        writeln!(f, "Motion heading noise: {}", self.motion_noise.heading_std)?;
        writeln!(f, "Particle init position noise: {}", self.filter_init_noise.position_std)?;
        writeln!(f, "Particle init heading noise: {}", self.filter_init_noise.heading_std)?;
        writeln!(f, "Resampling: {:?}", self.resampling_strategy)?;
        writeln!(f, "Heading averaging: {:?}", self.heading_averaging)?;
        write!(f, "Seed: {}", self.seed)
    }
}
impl SimulationConfig {
    /// Reject configurations the flight loop cannot run with.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.num_particles == 0 {
            return Err(FilterError::InvalidConfiguration(
                "particle count must be positive".to_string(),
            ));
        }
        let positive = [
            ("step size", self.step_size),
            ("landing accuracy", self.landing_accuracy),
            ("travel budget factor", self.travel_budget_factor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FilterError::InvalidConfiguration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !self.target.is_finite() {
            return Err(FilterError::InvalidConfiguration(format!(
                "target must be finite, got {}",
                self.target
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(layout) = self.layouts.iter().find(|layout| !seen.insert(**layout)) {
            return Err(FilterError::InvalidConfiguration(format!(
                "layout {layout} is listed more than once"
            )));
        }
        self.observation_noise.validate()?;
        self.motion_noise.validate()?;
        self.filter_init_noise.validate()?;
        Ok(())
    }

    /// Cap heading standard deviations at pi.
    pub fn clamp_heading_noise(&mut self) {
        for noise in [
            &mut self.observation_noise,
            &mut self.motion_noise,
            &mut self.filter_init_noise,
        ] {
            if noise.heading_std > PI {
                noise.heading_std = PI;
            }
        }
    }

    /// Filter settings for a single flight.
    pub fn filter_config(&self, seed: u64) -> ParticleFilterConfig {
        ParticleFilterConfig {
            num_particles: self.num_particles,
            init_noise: self.filter_init_noise,
            resampling_strategy: self.resampling_strategy,
            heading_averaging: self.heading_averaging,
            seed,
        }
    }

    pub fn total_flights(&self) -> usize {
        self.layouts.len() * self.flights_per_layout
    }

    /// Every flight of the batch in order: layouts in configuration order, `flights_per_layout` each.
    pub fn flight_plan(&self) -> Vec<FlightSpec> {
        let mut ids = MoverIds::new();
        let mut plan = Vec::with_capacity(self.total_flights());
        for &layout in &self.layouts {
            for _ in 0..self.flights_per_layout {
                let id = ids.next_id();
                plan.push(FlightSpec {
                    id,
                    layout,
                    seed: self.seed.wrapping_add(id),
                });
            }
        }
        plan
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

/// Identity of one flight in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlightSpec {
    pub id: u64,
    pub layout: LandmarkLayout,
    pub seed: u64,
}

/// Why a flight loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightTermination {
    /// The estimate came within the landing accuracy of the target.
    EstimateLanded,
    /// The mover traveled its full budget.
    TravelBudgetExhausted,
    /// The iteration cap was hit.
    StepLimit,
}
impl Display for FlightTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlightTermination::EstimateLanded => "estimate landed",
            FlightTermination::TravelBudgetExhausted => "travel budget exhausted",
            FlightTermination::StepLimit => "step limit",
        };
        write!(f, "{s}")
    }
}

/// One row of a flight trajectory: the true pose, the filter estimate and the mean observed displacement
/// after a loop iteration. `effective_particles` is measured after the weight update, before resampling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightStep {
    pub step: usize,
    pub true_x: f64,
    pub true_y: f64,
    pub true_z: f64,
    pub true_heading: f64,
    pub estimated_x: f64,
    pub estimated_y: f64,
    pub estimated_z: f64,
    pub estimated_heading: f64,
    pub observed_x: f64,
    pub observed_y: f64,
    pub observed_z: f64,
    pub distance_traveled: f64,
    pub effective_particles: f64,
}
impl FlightStep {
    fn record(
        step: usize,
        mover: &Mover,
        estimate: &Pose,
        observation: &[Pose],
        effective_particles: f64,
    ) -> Self {
        let observed = mean_displacement(observation);
        FlightStep {
            step,
            true_x: mover.pose.x,
            true_y: mover.pose.y,
            true_z: mover.pose.z,
            true_heading: mover.pose.heading,
            estimated_x: estimate.x,
            estimated_y: estimate.y,
            estimated_z: estimate.z,
            estimated_heading: estimate.heading,
            observed_x: observed.x,
            observed_y: observed.y,
            observed_z: observed.z,
            distance_traveled: mover.distance_traveled,
            effective_particles,
        }
    }
}

/// Outcome of a single flight.
#[derive(Clone, Debug, PartialEq)]
pub struct FlightResult {
    pub id: u64,
    pub layout: LandmarkLayout,
    pub seed: u64,
    pub start: Pose,
    pub final_pose: Pose,
    pub final_estimate: Pose,
    /// Straight-line distance from the start to the target.
    pub shortest_distance: f64,
    pub distance_traveled: f64,
    /// Whether the true pose ended within the landing accuracy of the target.
    pub landed: bool,
    pub termination: FlightTermination,
    pub steps: Vec<FlightStep>,
}
impl FlightResult {
    /// Extra route length relative to the shortest route, in percent. Zero if the shortest route is zero.
    pub fn redundancy_percent(&self) -> f64 {
        if self.shortest_distance > 0.0 {
            (self.distance_traveled - self.shortest_distance) / self.shortest_distance * 100.0
        } else {
            0.0
        }
    }

    /// Write the per-step trajectory to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for step in &self.steps {
            writer.serialize(step)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Fly a freshly spawned mover for flight `id`.
///
/// All randomness (spawn point, motion, observation, filter) derives from `seed`.
///
/// # Errors
/// Returns [`FilterError::InvalidConfiguration`] if the configuration does not validate.
pub fn run_flight(
    id: u64,
    layout: LandmarkLayout,
    config: &SimulationConfig,
    seed: u64,
) -> Result<FlightResult, FilterError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mover = Mover::spawn(id, &mut rng);
    fly_with(mover, layout, config, seed, &mut rng)
}

/// Fly `mover` from its current pose.
pub fn fly(
    mover: Mover,
    layout: LandmarkLayout,
    config: &SimulationConfig,
    seed: u64,
) -> Result<FlightResult, FilterError> {
    let mut rng = StdRng::seed_from_u64(seed);
    fly_with(mover, layout, config, seed, &mut rng)
}

fn fly_with(
    mut mover: Mover,
    layout: LandmarkLayout,
    config: &SimulationConfig,
    seed: u64,
    rng: &mut StdRng,
) -> Result<FlightResult, FilterError> {
    config.validate()?;
    let start = mover.pose;
    let shortest_distance = mover.distance_to(&config.target);
    let budget = shortest_distance * config.travel_budget_factor;
    let mut filter = ParticleFilter::new(mover.pose, config.filter_config(rng.random()))?;
    let mut estimate = filter.estimate();
    let mut steps = Vec::new();
    debug!("Flight {} ({}) starting at {}", mover.id, layout, start);

    let termination = loop {
        if has_landed(&estimate, &config.target, config.landing_accuracy) {
            break FlightTermination::EstimateLanded;
        }
        if mover.distance_traveled >= budget {
            break FlightTermination::TravelBudgetExhausted;
        }
        if steps.len() >= config.max_steps {
            break FlightTermination::StepLimit;
        }
        let expected_move = plan_move(&estimate, &config.target, config.step_size);
        mover.apply(&expected_move, &config.motion_noise, rng)?;
        filter.predict(&expected_move, &config.motion_noise)?;

        let observation = observe(&mover.pose, layout, Some(&config.observation_noise), rng)?;
        let sensor_observation = to_sensor_frame(mover.pose.heading, &observation);
        filter.update_weights(
            mover.pose.heading,
            &sensor_observation,
            layout,
            &config.observation_noise,
            &config.motion_noise,
        )?;
        let effective_particles = filter.effective_sample_size();
        filter.resample();
        estimate = filter.estimate();
        steps.push(FlightStep::record(
            steps.len(),
            &mover,
            &estimate,
            &observation,
            effective_particles,
        ));
    };

    let landed = has_landed(&mover.pose, &config.target, config.landing_accuracy);
    debug!(
        "Flight {} ({}) finished after {} steps: {}, landed: {}, traveled {:.2} m",
        mover.id,
        layout,
        steps.len(),
        termination,
        landed,
        mover.distance_traveled
    );
    Ok(FlightResult {
        id: mover.id,
        layout,
        seed,
        start,
        final_pose: mover.pose,
        final_estimate: estimate,
        shortest_distance,
        distance_traveled: mover.distance_traveled,
        landed,
        termination,
        steps,
    })
}

/// Run every flight of the configuration sequentially.
pub fn run_simulation(config: &SimulationConfig) -> Result<Vec<FlightResult>, FilterError> {
    config.validate()?;
    info!(
        "Running {} flights with {} particles each",
        config.total_flights(),
        config.num_particles
    );
    config
        .flight_plan()
        .into_iter()
        .map(|flight| run_flight(flight.id, flight.layout, config, flight.seed))
        .collect()
}

/// Summary of all flights flown with one layout.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlightStatistics {
    pub layout: LandmarkLayout,
    pub flights: usize,
    pub landed: usize,
    /// Landed flights in percent.
    pub success_rate: f64,
    /// Mean route redundancy over landed flights, `None` if nothing landed.
    pub mean_redundancy: Option<f64>,
}
impl Display for FlightStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Layout: {}", self.layout)?;
        writeln!(f, "  Flights: {}", self.flights)?;
        match self.mean_redundancy {
            Some(r) => writeln!(f, "  Mean route redundancy: {r:.2}%")?,
            None => writeln!(f, "  Mean route redundancy: -")?,
        }
        write!(f, "  Successful landings: {:.1}%", self.success_rate)
    }
}

#[derive(Serialize)]
struct FlightRecord {
    id: u64,
    layout: LandmarkLayout,
    seed: u64,
    landed: bool,
    termination: FlightTermination,
    steps: usize,
    shortest_distance: f64,
    distance_traveled: f64,
    redundancy_percent: f64,
}

impl FlightStatistics {
    /// Group results by layout, in layout order.
    pub fn from_results(results: &[FlightResult]) -> Vec<FlightStatistics> {
        let mut grouped: BTreeMap<LandmarkLayout, Vec<&FlightResult>> = BTreeMap::new();
        for result in results {
            grouped.entry(result.layout).or_default().push(result);
        }
        grouped
            .into_iter()
            .map(|(layout, flights)| {
                let landed: Vec<&&FlightResult> = flights.iter().filter(|f| f.landed).collect();
                let mean_redundancy = if landed.is_empty() {
                    None
                } else {
                    Some(
                        landed.iter().map(|f| f.redundancy_percent()).sum::<f64>()
                            / landed.len() as f64,
                    )
                };
                FlightStatistics {
                    layout,
                    flights: flights.len(),
                    landed: landed.len(),
                    success_rate: 100.0 * landed.len() as f64 / flights.len() as f64,
                    mean_redundancy,
                }
            })
            .collect()
    }

    /// Write one CSV row per flight.
    pub fn flights_to_csv<P: AsRef<Path>>(results: &[FlightResult], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for result in results {
            writer.serialize(FlightRecord {
                id: result.id,
                layout: result.layout,
                seed: result.seed,
                landed: result.landed,
                termination: result.termination,
                steps: result.steps.len(),
                shortest_distance: result.shortest_distance,
                distance_traveled: result.distance_traveled,
                redundancy_percent: result.redundancy_percent(),
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Write the plain-text report: parameters, every flight per layout, and the per-layout summary.
pub fn write_report<P: AsRef<Path>>(
    path: P,
    config: &SimulationConfig,
    results: &[FlightResult],
) -> io::Result<()> {
    let separator = "-".repeat(57);
    let mut file = File::create(path)?;
    writeln!(file, "SIMULATION PARAMETERS:")?;
    writeln!(file, "{config}")?;
    writeln!(file, "{separator}")?;
    for layout in &config.layouts {
        writeln!(file, "Layout: {layout}")?;
        for (i, flight) in results.iter().filter(|r| r.layout == *layout).enumerate() {
            writeln!(
                file,
                "  Flight {}: {}, length: {:.2}, redundancy: {:.2}%",
                i + 1,
                if flight.landed { "landed" } else { "failed" },
                flight.distance_traveled,
                flight.redundancy_percent()
            )?;
        }
    }
    writeln!(file, "{separator}")?;
    for stats in FlightStatistics::from_results(results) {
        writeln!(file, "{stats}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use tempfile::tempdir;

    fn quick_config() -> SimulationConfig {
        SimulationConfig {
            num_particles: 20,
            flights_per_layout: 2,
            max_steps: 400,
            ..SimulationConfig::default()
        }
    }

    fn synthetic_result(layout: LandmarkLayout, landed: bool, traveled: f64) -> FlightResult {
        FlightResult {
            id: 0,
            layout,
            seed: 0,
            start: Pose::at(10.0, 0.0, 0.0),
            final_pose: Pose::default(),
            final_estimate: Pose::default(),
            shortest_distance: 10.0,
            distance_traveled: traveled,
            landed,
            termination: FlightTermination::EstimateLanded,
            steps: Vec::new(),
        }
    }

    #[test]
    fn plan_move_steps_towards_target() {
        let estimate = Pose::new(3.0, 4.0, 0.0, 1.0);
        let step = plan_move(&estimate, &Pose::default(), 1.0);
        assert_approx_eq!(step.x, -0.6, 1e-12);
        assert_approx_eq!(step.y, -0.8, 1e-12);
        assert_approx_eq!(step.z, 0.0, 1e-12);
        assert_approx_eq!(step.heading, (-4.0f64).atan2(-3.0), 1e-12);
    }

    #[test]
    fn plan_move_never_overshoots() {
        let estimate = Pose::at(0.0, 0.0, 0.3);
        let step = plan_move(&estimate, &Pose::default(), 1.0);
        assert_approx_eq!(step.z, -0.3, 1e-12);
        assert_approx_eq!(step.x, 0.0, 1e-12);
        let arrived = Pose::new(0.0, 0.0, 0.0, 0.7);
        assert_eq!(
            plan_move(&arrived, &Pose::default(), 1.0),
            Pose::new(0.0, 0.0, 0.0, 0.7)
        );
    }

    #[test]
    fn landing_threshold() {
        let target = Pose::default();
        assert!(has_landed(&Pose::at(0.0, 0.0, 0.49), &target, 0.5));
        assert!(has_landed(&Pose::at(0.0, 0.0, 0.5), &target, 0.5));
        assert!(!has_landed(&Pose::at(0.0, 0.0, 0.51), &target, 0.5));
    }

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layouts, LandmarkLayout::ALL.to_vec());
        assert_eq!(config.total_flights(), 30);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        let bad = [
            SimulationConfig {
                num_particles: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                step_size: 0.0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                landing_accuracy: -1.0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                travel_budget_factor: f64::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                motion_noise: Noise::new(-0.1, 0.1),
                ..SimulationConfig::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(FilterError::InvalidConfiguration(_))),
                "{config:?}"
            );
        }
    }

    #[test]
    fn validate_rejects_duplicate_layouts() {
        let config = SimulationConfig {
            layouts: vec![
                LandmarkLayout::Cross,
                LandmarkLayout::Triangle,
                LandmarkLayout::Cross,
            ],
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FilterError::InvalidConfiguration(_))
        ));
        assert!(run_simulation(&config).is_err());

        let distinct = SimulationConfig {
            layouts: vec![LandmarkLayout::Triangle, LandmarkLayout::Cross],
            ..SimulationConfig::default()
        };
        assert!(distinct.validate().is_ok());
    }

    #[test]
    fn heading_noise_is_clamped_to_pi() {
        let mut config = SimulationConfig {
            motion_noise: Noise::new(0.1, 10.0),
            filter_init_noise: Noise::new(0.5, 0.2),
            ..SimulationConfig::default()
        };
        config.clamp_heading_noise();
        assert_eq!(config.motion_noise.heading_std, PI);
        assert_eq!(config.filter_init_noise.heading_std, 0.2);
    }

    #[test]
    fn config_round_trips_through_every_format() {
        let dir = tempdir().unwrap();
        let config = SimulationConfig {
            num_particles: 321,
            layouts: vec![LandmarkLayout::Cross],
            resampling_strategy: ParticleResamplingStrategy::Systematic,
            heading_averaging: HeadingAveraging::Circular,
            target: Pose::new(1.0, -2.0, 0.0, 0.5),
            ..SimulationConfig::default()
        };
        for name in ["config.json", "config.yaml", "config.yml", "config.toml"] {
            let path = dir.path().join(name);
            config.to_file(&path).unwrap();
            let read = SimulationConfig::from_file(&path).unwrap();
            assert_eq!(read, config, "{name}");
        }
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "num_particles: 7\nlayouts: [triangle]\n").unwrap();
        let config = SimulationConfig::from_file(&path).unwrap();
        assert_eq!(config.num_particles, 7);
        assert_eq!(config.layouts, vec![LandmarkLayout::Triangle]);
        assert_eq!(config.step_size, 1.0);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.ini");
        let err = SimulationConfig::default().to_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(SimulationConfig::from_file(&path).is_err());
    }

    #[test]
    fn flight_plan_assigns_ids_and_seeds() {
        let config = SimulationConfig {
            flights_per_layout: 2,
            layouts: vec![LandmarkLayout::Triangle, LandmarkLayout::CrossWithCenter],
            seed: 100,
            ..SimulationConfig::default()
        };
        let plan = config.flight_plan();
        assert_eq!(plan.len(), 4);
        assert_eq!(
            plan[2],
            FlightSpec {
                id: 2,
                layout: LandmarkLayout::CrossWithCenter,
                seed: 102
            }
        );
        assert_eq!(plan[1].layout, LandmarkLayout::Triangle);
    }

    #[test]
    fn flights_are_reproducible() {
        let config = quick_config();
        let a = run_flight(3, LandmarkLayout::Cross, &config, 9).unwrap();
        let b = run_flight(3, LandmarkLayout::Cross, &config, 9).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id, 3);
        assert!(!a.steps.is_empty());
        assert!(a.steps.len() <= config.max_steps);
    }

    #[test]
    fn flight_stops_at_step_limit() {
        let config = SimulationConfig {
            max_steps: 3,
            ..quick_config()
        };
        let result = run_flight(0, LandmarkLayout::Triangle, &config, 1).unwrap();
        assert_eq!(result.termination, FlightTermination::StepLimit);
        assert_eq!(result.steps.len(), 3);
        assert!(!result.landed);
    }

    #[test]
    fn invalid_config_fails_flight() {
        let config = SimulationConfig {
            num_particles: 0,
            ..quick_config()
        };
        assert!(run_flight(0, LandmarkLayout::Cross, &config, 1).is_err());
        assert!(run_simulation(&config).is_err());
    }

    #[test]
    fn redundancy_is_relative_to_shortest_route() {
        let result = synthetic_result(LandmarkLayout::Cross, true, 12.5);
        assert_approx_eq!(result.redundancy_percent(), 25.0, 1e-12);
        let mut zero = synthetic_result(LandmarkLayout::Cross, true, 3.0);
        zero.shortest_distance = 0.0;
        assert_eq!(zero.redundancy_percent(), 0.0);
    }

    #[test]
    fn statistics_group_by_layout() {
        let results = vec![
            synthetic_result(LandmarkLayout::Cross, true, 11.0),
            synthetic_result(LandmarkLayout::Triangle, false, 50.0),
            synthetic_result(LandmarkLayout::Cross, false, 50.0),
            synthetic_result(LandmarkLayout::Cross, true, 13.0),
        ];
        let stats = FlightStatistics::from_results(&results);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].layout, LandmarkLayout::Triangle);
        assert_eq!(stats[0].landed, 0);
        assert_eq!(stats[0].mean_redundancy, None);
        assert_eq!(stats[1].flights, 3);
        assert_eq!(stats[1].landed, 2);
        assert_approx_eq!(stats[1].success_rate, 200.0 / 3.0, 1e-9);
        assert_approx_eq!(stats[1].mean_redundancy.unwrap(), 20.0, 1e-9);
        assert!(stats[0].to_string().contains("Mean route redundancy: -"));
    }

    #[test]
    fn report_and_csv_exports() {
        let dir = tempdir().unwrap();
        let config = SimulationConfig {
            layouts: vec![LandmarkLayout::Cross],
            ..quick_config()
        };
        let results = run_simulation(&config).unwrap();
        assert_eq!(results.len(), 2);

        let report = dir.path().join("report.txt");
        write_report(&report, &config, &results).unwrap();
        let text = std::fs::read_to_string(&report).unwrap();
        assert!(text.starts_with("SIMULATION PARAMETERS:"));
        assert!(text.contains("Layout: CROSS"));
        assert!(text.contains("  Flight 2: "));
        assert!(text.contains("Successful landings"));

        let flights = dir.path().join("flights.csv");
        FlightStatistics::flights_to_csv(&results, &flights).unwrap();
        let mut reader = csv::Reader::from_path(&flights).unwrap();
        assert_eq!(reader.records().count(), 2);

        let trajectory = dir.path().join("trajectory_0.csv");
        results[0].to_csv(&trajectory).unwrap();
        let mut reader = csv::Reader::from_path(&trajectory).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "step");
        let rows: Vec<FlightStep> = reader
            .deserialize::<FlightStep>()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows, results[0].steps);
    }
}
