//! Particle filter toolbox for landing a vehicle on a marked platform
//!
//! This crate provides the tools for estimating the pose (position and heading) of a vehicle that is
//! approaching a fixed landing platform. The only information available to the estimator is a set of
//! noisy, relative observations of known landmark points painted on the platform. The estimator is a
//! sequential Monte-Carlo filter (particle filter): a population of weighted pose hypotheses that is
//! propagated with a motion model, re-weighted against each observation, and resampled.
//!
//! The filter is designed to be driven by an outer loop that plans a move towards the platform from the
//! current estimate, executes it, observes the landmarks, and feeds the observation back to the filter.
//! A reference implementation of that loop lives in [sim] and is used by the `heliland-sim` tool, but the
//! filter itself never initiates it. It only responds to the four operations:
//!
//! 1. [`ParticleFilter::predict`](particle::ParticleFilter::predict) – propagate every particle with the expected move.
//! 2. [`ParticleFilter::update_weights`](particle::ParticleFilter::update_weights) – evaluate the observation likelihood.
//! 3. [`ParticleFilter::resample`](particle::ParticleFilter::resample) – draw a fresh, equally weighted population.
//! 4. [`ParticleFilter::estimate`](particle::ParticleFilter::estimate) – read out the weighted mean pose.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the vector and rotation types used by the observation model.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number
//!   generation for process noise, measurement noise and resampling.
//!
//! All other functionality is auxiliary (configuration files, CSV export, reports).
//!
//! ## Crate overview
//!
//! - [measurements]: Landmark layouts, the observation model, and the transform into the heading-aligned sensor frame.
//! - [motion]: The noisy motion model and the ground-truth vehicle ([`Mover`](motion::Mover)).
//! - [particle]: The particle filter itself.
//! - [sim]: Guidance, the flight loop, statistics and reports.
//!
//! ## Coordinate and state definitions
//!
//! The state of the vehicle is a four element pose:
//!
//! $$
//! x = [p_x, p_y, p_z, \psi]
//! $$
//!
//! Where $p_x$, $p_y$ and $p_z$ are the position (meters) relative to the platform center and $\psi$ is the heading
//! (radians) measured counter-clockwise from the $x$ axis. The platform lies in the $z = 0$ plane. Heading is treated as
//! a plain real number throughout the filter (no wrap-around) unless circular averaging is selected, see
//! [`HeadingAveraging`](particle::HeadingAveraging).
//!
//! ## Randomness
//!
//! No function in this crate reaches for a global random generator. Every stochastic operation either takes an
//! explicit `&mut impl Rng` or uses the [`StdRng`](rand::rngs::StdRng) owned by the filter, seeded from its
//! configuration. Runs are therefore reproducible from their seeds.
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod sim;

pub use measurements::LandmarkLayout;
pub use motion::{Mover, MoverIds};
pub use particle::{
    HeadingAveraging, Particle, ParticleFilter, ParticleFilterConfig, ParticleResamplingStrategy,
};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

/// Errors reported by the filter and the models it depends on.
///
/// Numerical degeneracy (for example a population whose weights all underflowed to zero) is never an
/// error; those cases fall back to documented policies. Only malformed configuration and malformed
/// observations are surfaced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// A noise, particle count or simulation parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The observation does not have one displacement per landmark of the layout.
    #[error(
        "observation has {actual} landmark displacements but the {layout} layout predicts {expected}"
    )]
    ObservationMismatch {
        layout: LandmarkLayout,
        expected: usize,
        actual: usize,
    },
}

/// Position and heading of the vehicle, or a displacement/move expressed the same way.
///
/// `Pose` is a plain value type. The same container is used for absolute poses, for landmark
/// displacements (heading unused, left at zero), and for desired moves (heading is the absolute
/// target heading, not a delta).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// x coordinate in meters
    pub x: f64,
    /// y coordinate in meters
    pub y: f64,
    /// z coordinate (height above the platform) in meters
    pub z: f64,
    /// heading in radians
    #[serde(default)]
    pub heading: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose(x: {:.4}, y: {:.4}, z: {:.4}, heading: {:.4} rad)",
            self.x, self.y, self.z, self.heading
        )
    }
}
impl Pose {
    pub fn new(x: f64, y: f64, z: f64, heading: f64) -> Pose {
        Pose { x, y, z, heading }
    }
    /// A pose (or displacement) with zero heading.
    pub fn at(x: f64, y: f64, z: f64) -> Pose {
        Pose::new(x, y, z, 0.0)
    }
    /// Position part of the pose as a vector.
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
    /// Euclidean (3D) distance between the positions of two poses. Heading is ignored.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.position() - other.position()).norm()
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.heading.is_finite()
    }
}
impl From<Vector3<f64>> for Pose {
    fn from(position: Vector3<f64>) -> Self {
        Pose::at(position[0], position[1], position[2])
    }
}

/// Zero-mean Gaussian noise parameters for one physical noise source.
///
/// Each noise source (filter initialization, motion, observation) gets its own instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Noise {
    /// Standard deviation applied independently to each of the x, y and z axes (meters).
    pub position_std: f64,
    /// Standard deviation of the heading (radians).
    #[serde(default)]
    pub heading_std: f64,
}
impl Display for Noise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Noise(position_std: {}, heading_std: {})",
            self.position_std, self.heading_std
        )
    }
}
impl Noise {
    pub fn new(position_std: f64, heading_std: f64) -> Noise {
        Noise {
            position_std,
            heading_std,
        }
    }
    /// Positional noise only; the heading standard deviation is zero.
    pub fn positional(position_std: f64) -> Noise {
        Noise::new(position_std, 0.0)
    }
    /// Check that both standard deviations are finite and non-negative.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !(self.position_std.is_finite() && self.position_std >= 0.0) {
            return Err(FilterError::InvalidConfiguration(format!(
                "position standard deviation must be finite and non-negative, got {}",
                self.position_std
            )));
        }
        if !(self.heading_std.is_finite() && self.heading_std >= 0.0) {
            return Err(FilterError::InvalidConfiguration(format!(
                "heading standard deviation must be finite and non-negative, got {}",
                self.heading_std
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn pose_defaults_to_zero_heading() {
        let pose = Pose::at(1.0, 2.0, 3.0);
        assert_eq!(pose.heading, 0.0);
        assert_eq!(Pose::default(), Pose::new(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn pose_distance_ignores_heading() {
        let a = Pose::new(0.0, 0.0, 0.0, 1.0);
        let b = Pose::new(3.0, 4.0, 12.0, -2.0);
        assert_approx_eq!(a.distance_to(&b), 13.0, 1e-12);
        assert_approx_eq!(b.distance_to(&a), 13.0, 1e-12);
    }

    #[test]
    fn pose_from_vector() {
        let pose = Pose::from(Vector3::new(1.0, -1.0, 2.0));
        assert_eq!(pose, Pose::at(1.0, -1.0, 2.0));
        assert!(pose.is_finite());
        assert!(!Pose::at(f64::NAN, 0.0, 0.0).is_finite());
    }

    #[test]
    fn noise_heading_defaults_to_zero() {
        let noise = Noise::positional(0.3);
        assert_eq!(noise.position_std, 0.3);
        assert_eq!(noise.heading_std, 0.0);
    }

    #[test]
    fn noise_validation() {
        assert!(Noise::new(0.0, 0.0).validate().is_ok());
        assert!(Noise::new(0.5, 0.1).validate().is_ok());
        assert!(matches!(
            Noise::new(-0.1, 0.0).validate(),
            Err(FilterError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Noise::new(0.1, -1.0).validate(),
            Err(FilterError::InvalidConfiguration(_))
        ));
        assert!(Noise::new(f64::NAN, 0.0).validate().is_err());
        assert!(Noise::new(0.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn noise_deserializes_without_heading() {
        let noise: Noise = serde_json::from_str(r#"{"position_std": 0.25}"#).unwrap();
        assert_eq!(noise, Noise::positional(0.25));
    }
}
