//! Particle filter for the pose of the landing vehicle.
//!
//! The filter keeps a fixed-size population of weighted pose hypotheses and exposes the classic
//! predict / update / resample / estimate cycle. Weights are only meaningful relative to each other within
//! a cycle; after every resample they are reset to `1/N`, so that a freshly resampled population's weighted
//! mean is its plain centroid.
//!
//! Likelihoods are accumulated in log space and exponentiated once per particle, which keeps the many small
//! per-landmark probabilities from underflowing one by one.
use crate::measurements::{LandmarkLayout, expected_observation, to_sensor_frame};
use crate::{FilterError, Noise, Pose};

use log::{debug, trace, warn};
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{self, Debug, Display};

/// Floor applied to every likelihood standard deviation.
pub const SIGMA_EPSILON: f64 = 1e-12;

/// A single weighted pose hypothesis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub pose: Pose,
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("z", &self.pose.z)
            .field("heading", &self.pose.heading)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(pose: Pose, weight: f64) -> Particle {
        Particle { pose, weight }
    }
}

/// How the heading component of the estimate is averaged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum HeadingAveraging {
    /// Weighted arithmetic mean of the raw heading values. Averaging headings on either side of +/-pi
    /// yields a value near 0.
    Linear,
    /// Direction of the weighted sum of unit vectors, in (-pi, pi].
    Circular,
}
impl Default for HeadingAveraging {
    fn default() -> Self {
        HeadingAveraging::Linear
    }
}

/// Method used to draw the new population from the weighted one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ParticleResamplingStrategy {
    /// N independent draws with replacement.
    Multinomial,
    /// One uniform offset, N evenly spaced pointers.
    Systematic,
    /// One uniform draw inside each of N equal strata.
    Stratified,
    /// Deterministic copies of `floor(N w)` plus systematic draws over the residuals.
    Residual,
}
impl Default for ParticleResamplingStrategy {
    fn default() -> Self {
        ParticleResamplingStrategy::Multinomial
    }
}
impl ParticleResamplingStrategy {
    /// Draw `n` indices into `weights`. The weights must be normalized.
    pub fn resample_indices<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        match self {
            ParticleResamplingStrategy::Multinomial => multinomial_resample(weights, n, rng),
            ParticleResamplingStrategy::Systematic => systematic_resample(weights, n, rng),
            ParticleResamplingStrategy::Stratified => stratified_resample(weights, n, rng),
            ParticleResamplingStrategy::Residual => residual_resample(weights, n, rng),
        }
    }
}

/// Multinomial resampling: `n` independent draws from the categorical distribution given by `weights`.
pub fn multinomial_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let mut cdf = Vec::with_capacity(weights.len());
    let mut acc = 0.0;
    for w in weights {
        acc += w;
        cdf.push(acc);
    }
    let last = weights.len() - 1;
    (0..n)
        .map(|_| {
            let u = rng.random::<f64>() * acc;
            cdf.partition_point(|&c| c <= u).min(last)
        })
        .collect()
}

/// Systematic resampling: a single uniform offset and `n` evenly spaced pointers into the CDF.
pub fn systematic_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let step = 1.0 / n as f64;
    let offset = rng.random::<f64>() * step;
    walk_cdf(weights, (0..n).map(|i| offset + i as f64 * step))
}

/// Stratified resampling: one uniform draw inside each of `n` equal strata.
pub fn stratified_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let positions: Vec<f64> = (0..n)
        .map(|i| (i as f64 + rng.random::<f64>()) / n as f64)
        .collect();
    walk_cdf(weights, positions.into_iter())
}

/// Residual resampling: `floor(n w_i)` deterministic copies of every particle, the remainder drawn
/// systematically from the fractional residuals.
pub fn residual_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let mut indices = Vec::with_capacity(n);
    let mut residual = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        let copies = (w * n as f64).floor() as usize;
        indices.extend(std::iter::repeat_n(i, copies));
        residual.push(w * n as f64 - copies as f64);
    }
    indices.truncate(n);
    let remaining = n - indices.len();
    if remaining > 0 {
        let sum_residual: f64 = residual.iter().sum();
        if sum_residual > 0.0 {
            for r in residual.iter_mut() {
                *r /= sum_residual;
            }
            indices.extend(systematic_resample(&residual, remaining, rng));
        } else {
            indices.extend(multinomial_resample(weights, remaining, rng));
        }
    }
    indices
}

/// Map sorted positions in [0, 1) to indices of the CDF interval containing them.
fn walk_cdf(weights: &[f64], positions: impl Iterator<Item = f64>) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut j = 0;
    let mut cumulative = weights[0];
    for position in positions {
        while cumulative <= position && j + 1 < weights.len() {
            j += 1;
            cumulative += weights[j];
        }
        indices.push(j);
    }
    indices
}

/// Log of the normal density of `error` under a zero-mean Gaussian with standard deviation `sigma`.
///
/// `sigma` is floored at [`SIGMA_EPSILON`] so that zero-noise configurations stay defined.
pub fn gaussian_log_likelihood(error: f64, sigma: f64) -> f64 {
    let sigma = sigma.max(SIGMA_EPSILON);
    -(error * error) / (2.0 * sigma * sigma) - (sigma * (2.0 * PI).sqrt()).ln()
}

/// Particle filter configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFilterConfig {
    pub num_particles: usize,
    /// Spread of the initial population around the seed pose.
    pub init_noise: Noise,
    pub resampling_strategy: ParticleResamplingStrategy,
    pub heading_averaging: HeadingAveraging,
    pub seed: u64,
}
impl Default for ParticleFilterConfig {
    fn default() -> Self {
        Self {
            num_particles: 100,
            init_noise: Noise::new(0.5, 0.1),
            resampling_strategy: ParticleResamplingStrategy::Multinomial,
            heading_averaging: HeadingAveraging::Linear,
            seed: 42,
        }
    }
}

/// Sequential Monte-Carlo estimator of the vehicle pose.
///
/// The population always holds exactly `N` particles, where `N` is fixed at construction.
#[derive(Clone)]
pub struct ParticleFilter {
    particles: Vec<Particle>,
    num_particles: usize,
    resampling_strategy: ParticleResamplingStrategy,
    heading_averaging: HeadingAveraging,
    rng: StdRng,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean = self.estimate();
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field(
                "mean_position",
                &format_args!("({:.3}, {:.3}, {:.3}) m", mean.x, mean.y, mean.z),
            )
            .field("mean_heading", &format_args!("{:.4} rad", mean.heading))
            .finish()
    }
}
impl ParticleFilter {
    /// Draw the initial population around `seed_pose`.
    ///
    /// Each particle's x, y and z are drawn independently from a Gaussian centered on the seed pose with
    /// `init_noise.position_std`, and the heading from a Gaussian with `init_noise.heading_std`. Every weight
    /// starts at `1/N`.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidConfiguration`] if the particle count is zero or the noise is invalid.
    pub fn new(seed_pose: Pose, config: ParticleFilterConfig) -> Result<Self, FilterError> {
        if config.num_particles == 0 {
            return Err(FilterError::InvalidConfiguration(
                "particle count must be positive".to_string(),
            ));
        }
        config.init_noise.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let position_noise = Normal::new(0.0, config.init_noise.position_std)
            .map_err(|e| FilterError::InvalidConfiguration(format!("init position noise: {e}")))?;
        let heading_noise = Normal::new(seed_pose.heading, config.init_noise.heading_std)
            .map_err(|e| FilterError::InvalidConfiguration(format!("init heading noise: {e}")))?;

        let weight = 1.0 / config.num_particles as f64;
        let mut particles = Vec::with_capacity(config.num_particles);
        for _ in 0..config.num_particles {
            let pose = Pose::new(
                seed_pose.x + position_noise.sample(&mut rng),
                seed_pose.y + position_noise.sample(&mut rng),
                seed_pose.z + position_noise.sample(&mut rng),
                heading_noise.sample(&mut rng),
            );
            particles.push(Particle::new(pose, weight));
        }
        debug!(
            "Initialized {} particles around {} with {}",
            config.num_particles, seed_pose, config.init_noise
        );
        Ok(ParticleFilter {
            particles,
            num_particles: config.num_particles,
            resampling_strategy: config.resampling_strategy,
            heading_averaging: config.heading_averaging,
            rng,
        })
    }

    /// Build a filter around an explicit population. `N` is the population size; the configuration's
    /// particle count and initialization noise are ignored.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidConfiguration`] if the population is empty or carries a negative or
    /// NaN weight.
    pub fn from_particles(
        particles: Vec<Particle>,
        config: ParticleFilterConfig,
    ) -> Result<Self, FilterError> {
        if particles.is_empty() {
            return Err(FilterError::InvalidConfiguration(
                "particle population must not be empty".to_string(),
            ));
        }
        if let Some(bad) = particles.iter().find(|p| !(p.weight >= 0.0)) {
            return Err(FilterError::InvalidConfiguration(format!(
                "particle weights must be non-negative, got {}",
                bad.weight
            )));
        }
        Ok(ParticleFilter {
            num_particles: particles.len(),
            particles,
            resampling_strategy: config.resampling_strategy,
            heading_averaging: config.heading_averaging,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight).collect()
    }
    pub fn len(&self) -> usize {
        self.particles.len()
    }
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }
    pub fn resampling_strategy(&self) -> ParticleResamplingStrategy {
        self.resampling_strategy
    }
    pub fn heading_averaging(&self) -> HeadingAveraging {
        self.heading_averaging
    }

    /// Overwrite every particle weight.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidConfiguration`] if the slice length differs from the population size
    /// or a weight is negative or NaN. The weights are left untouched in that case.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<(), FilterError> {
        if weights.len() != self.particles.len() {
            return Err(FilterError::InvalidConfiguration(format!(
                "expected {} weights, got {}",
                self.particles.len(),
                weights.len()
            )));
        }
        if let Some(bad) = weights.iter().find(|w| !(**w >= 0.0)) {
            return Err(FilterError::InvalidConfiguration(format!(
                "particle weights must be non-negative, got {bad}"
            )));
        }
        for (particle, &w) in self.particles.iter_mut().zip(weights.iter()) {
            particle.weight = w;
        }
        Ok(())
    }

    /// Weights scaled to sum to one, or `None` if the population carries no usable weight.
    ///
    /// Weights that overflowed to infinity saturate: the infinite ones share the mass equally.
    fn normalized_weights(&self) -> Option<Vec<f64>> {
        let weights = self.weights();
        if weights.iter().any(|w| w.is_infinite()) {
            let saturated: Vec<f64> = weights
                .iter()
                .map(|w| if w.is_infinite() { 1.0 } else { 0.0 })
                .collect();
            let count: f64 = saturated.iter().sum();
            return Some(saturated.into_iter().map(|w| w / count).collect());
        }
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) {
            return None;
        }
        if total.is_finite() {
            return Some(weights.into_iter().map(|w| w / total).collect());
        }
        // every weight is finite but their sum overflowed
        let max = weights.iter().cloned().fold(0.0, f64::max);
        let scaled: Vec<f64> = weights.into_iter().map(|w| w / max).collect();
        let total: f64 = scaled.iter().sum();
        Some(scaled.into_iter().map(|w| w / total).collect())
    }

    /// Effective number of particles, `1 / sum(w_i^2)` over normalized weights. Zero for a degenerate
    /// population.
    pub fn effective_sample_size(&self) -> f64 {
        match self.normalized_weights() {
            Some(weights) => {
                let sum_of_squares: f64 = weights.iter().map(|w| w * w).sum();
                if sum_of_squares > 0.0 {
                    1.0 / sum_of_squares
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// Weighted mean pose of the population.
    ///
    /// If the weights sum to zero the unweighted centroid is returned instead, and an empty population
    /// yields the zero pose. Heading is averaged according to the configured [`HeadingAveraging`].
    pub fn estimate(&self) -> Pose {
        if self.particles.is_empty() {
            return Pose::default();
        }
        let weights = self.normalized_weights().unwrap_or_else(|| {
            let uniform = 1.0 / self.particles.len() as f64;
            vec![uniform; self.particles.len()]
        });
        let mut x = 0.0;
        let mut y = 0.0;
        let mut z = 0.0;
        let mut heading = 0.0;
        let mut heading_sin = 0.0;
        let mut heading_cos = 0.0;
        for (particle, w) in self.particles.iter().zip(weights.iter()) {
            x += w * particle.pose.x;
            y += w * particle.pose.y;
            z += w * particle.pose.z;
            heading += w * particle.pose.heading;
            heading_sin += w * particle.pose.heading.sin();
            heading_cos += w * particle.pose.heading.cos();
        }
        let heading = match self.heading_averaging {
            HeadingAveraging::Linear => heading,
            HeadingAveraging::Circular => heading_sin.atan2(heading_cos),
        };
        Pose::new(x, y, z, heading)
    }

    /// Propagate every particle with the expected move.
    ///
    /// Translation is additive: each axis gains an independent draw from `N(expected_move.axis, sigma_p)`.
    /// Heading is replaced, not incremented: it becomes a draw from `N(expected_move.heading, sigma_h)`,
    /// since the expected move carries an absolute target heading.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidConfiguration`] if the motion noise is invalid. No particle is
    /// touched in that case.
    pub fn predict(&mut self, expected_move: &Pose, motion_noise: &Noise) -> Result<(), FilterError> {
        motion_noise.validate()?;
        let position_noise = Normal::new(0.0, motion_noise.position_std)
            .map_err(|e| FilterError::InvalidConfiguration(format!("motion position noise: {e}")))?;
        let heading_noise = Normal::new(expected_move.heading, motion_noise.heading_std)
            .map_err(|e| FilterError::InvalidConfiguration(format!("motion heading noise: {e}")))?;
        for particle in &mut self.particles {
            particle.pose.x += expected_move.x + position_noise.sample(&mut self.rng);
            particle.pose.y += expected_move.y + position_noise.sample(&mut self.rng);
            particle.pose.z += expected_move.z + position_noise.sample(&mut self.rng);
            particle.pose.heading = heading_noise.sample(&mut self.rng);
        }
        Ok(())
    }

    /// Re-weight every particle by the likelihood of `actual_observation`.
    ///
    /// For each particle the predicted observation is computed from its own pose and projected into the
    /// sensor frame of `reference_heading` (the observer's heading). Every landmark contributes four
    /// Gaussian log terms: the x, y and z residuals with `observation_noise.position_std`, and the heading
    /// residual between the particle and `reference_heading` with `motion_noise.heading_std`. The particle's
    /// weight becomes `exp` of the summed log terms.
    ///
    /// # Errors
    /// - [`FilterError::ObservationMismatch`] if `actual_observation` does not have one displacement per
    ///   landmark of `layout`. This is a caller bug; the weights from the previous cycle are left untouched.
    /// - [`FilterError::InvalidConfiguration`] if either noise is invalid.
    pub fn update_weights(
        &mut self,
        reference_heading: f64,
        actual_observation: &[Pose],
        layout: LandmarkLayout,
        observation_noise: &Noise,
        motion_noise: &Noise,
    ) -> Result<(), FilterError> {
        observation_noise.validate()?;
        motion_noise.validate()?;
        let expected = layout.landmark_count();
        if actual_observation.len() != expected {
            warn!(
                "Skipping weight update: {} displacements observed for the {} layout ({} landmarks)",
                actual_observation.len(),
                layout,
                expected
            );
            return Err(FilterError::ObservationMismatch {
                layout,
                expected,
                actual: actual_observation.len(),
            });
        }

        let position_sigma = observation_noise.position_std;
        let heading_sigma = motion_noise.heading_std;
        let log_weights: Vec<f64> = self
            .particles
            .iter()
            .map(|particle| {
                let predicted =
                    to_sensor_frame(reference_heading, &expected_observation(&particle.pose, layout));
                let heading_term =
                    gaussian_log_likelihood(reference_heading - particle.pose.heading, heading_sigma);
                predicted
                    .iter()
                    .zip(actual_observation.iter())
                    .map(|(predicted, actual)| {
                        gaussian_log_likelihood(actual.x - predicted.x, position_sigma)
                            + gaussian_log_likelihood(actual.y - predicted.y, position_sigma)
                            + gaussian_log_likelihood(actual.z - predicted.z, position_sigma)
                            + heading_term
                    })
                    .sum()
            })
            .collect();

        for (particle, log_weight) in self.particles.iter_mut().zip(log_weights) {
            particle.weight = log_weight.exp();
        }
        trace!("Updated weights: {:?}", self);
        Ok(())
    }

    /// Replace the population with `N` draws (with replacement) proportional to the current weights.
    ///
    /// Every new particle copies the drawn pose and gets weight `1/N`. If the total weight is zero the
    /// population is left exactly as it is.
    pub fn resample(&mut self) {
        let Some(weights) = self.normalized_weights() else {
            debug!("Total particle weight is zero; skipping resampling");
            return;
        };
        let n = self.num_particles;
        let indices = self
            .resampling_strategy
            .resample_indices(&weights, n, &mut self.rng);
        let weight = 1.0 / n as f64;
        let new_particles: Vec<Particle> = indices
            .into_iter()
            .map(|i| Particle::new(self.particles[i].pose, weight))
            .collect();
        self.particles = new_particles;
    }
}
