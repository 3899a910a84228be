//! Observation model for the landing platform landmarks.
//!
//! The platform carries a small set of painted landmark points in its `z = 0` plane. The vehicle's sensor
//! measures, for each landmark, the displacement between the vehicle and that landmark. Landmark identity
//! is known: displacements are always reported in the order the layout defines its points, and the
//! likelihood evaluation in [`crate::particle`] pairs predicted and actual displacements by index.
//!
//! Two coordinate frames are used:
//! - world frame: displacements are `observer - landmark`, axis aligned with the platform.
//! - sensor frame: displacements are `landmark - observer`, rotated into the heading-aligned frame of the
//!   observer so that observations are comparable regardless of absolute heading.

use crate::{FilterError, Noise, Pose};

use nalgebra::{Rotation2, Vector2, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{self, Display};

/// Arrangement of landmark points on the platform.
///
/// The set of layouts is closed; each variant owns a fixed, ordered list of points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LandmarkLayout {
    /// Three points on the unit circle at 0, 120 and 240 degrees (equilateral triangle).
    Triangle,
    /// Four points at unit distance along -x, +x, +y and -y.
    Cross,
    /// The cross plus the platform center.
    CrossWithCenter,
}
impl Default for LandmarkLayout {
    fn default() -> Self {
        LandmarkLayout::CrossWithCenter
    }
}
impl Display for LandmarkLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LandmarkLayout::Triangle => "TRIANGLE",
            LandmarkLayout::Cross => "CROSS",
            LandmarkLayout::CrossWithCenter => "CROSS_WITH_CENTER",
        };
        write!(f, "{}", name)
    }
}
impl LandmarkLayout {
    /// Every layout, in the order simulations iterate them.
    pub const ALL: [LandmarkLayout; 3] = [
        LandmarkLayout::Triangle,
        LandmarkLayout::Cross,
        LandmarkLayout::CrossWithCenter,
    ];

    /// Landmark points in platform coordinates, in their canonical order.
    pub fn points(&self) -> Vec<Vector3<f64>> {
        match self {
            LandmarkLayout::Triangle => {
                let radius = 1.0;
                [0.0, 2.0 * PI / 3.0, 4.0 * PI / 3.0]
                    .iter()
                    .map(|a: &f64| Vector3::new(radius * a.cos(), radius * a.sin(), 0.0))
                    .collect()
            }
            LandmarkLayout::Cross => vec![
                Vector3::new(-1.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, -1.0, 0.0),
            ],
            LandmarkLayout::CrossWithCenter => vec![
                Vector3::new(-1.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, -1.0, 0.0),
                Vector3::new(0.0, 0.0, 0.0),
            ],
        }
    }

    /// Number of landmarks, i.e. the length of every observation of this layout.
    pub fn landmark_count(&self) -> usize {
        match self {
            LandmarkLayout::Triangle => 3,
            LandmarkLayout::Cross => 4,
            LandmarkLayout::CrossWithCenter => 5,
        }
    }
}

/// Noise-free world-frame displacements (`observer - landmark`) for every landmark of the layout.
pub fn expected_observation(observer: &Pose, layout: LandmarkLayout) -> Vec<Pose> {
    let position = observer.position();
    layout
        .points()
        .iter()
        .map(|landmark| Pose::from(position - landmark))
        .collect()
}

/// World-frame displacements of every landmark as seen from `observer`.
///
/// When `noise` is given, independent zero-mean Gaussian noise with `noise.position_std` is added to each
/// axis of each displacement. The heading component of the returned poses is always zero.
///
/// # Errors
/// Returns [`FilterError::InvalidConfiguration`] if the noise standard deviations are invalid.
pub fn observe<R: Rng + ?Sized>(
    observer: &Pose,
    layout: LandmarkLayout,
    noise: Option<&Noise>,
    rng: &mut R,
) -> Result<Vec<Pose>, FilterError> {
    let mut observation = expected_observation(observer, layout);
    if let Some(noise) = noise {
        noise.validate()?;
        let normal = Normal::new(0.0, noise.position_std).map_err(|e| {
            FilterError::InvalidConfiguration(format!("observation noise: {e}"))
        })?;
        for displacement in observation.iter_mut() {
            displacement.x += normal.sample(rng);
            displacement.y += normal.sample(rng);
            displacement.z += normal.sample(rng);
        }
    }
    Ok(observation)
}

/// Standard 2D rotation of `(x, y)` by `angle` radians counter-clockwise.
pub fn rotate_point(x: f64, y: f64, angle: f64) -> (f64, f64) {
    let rotated = Rotation2::new(angle) * Vector2::new(x, y);
    (rotated[0], rotated[1])
}

/// Reproject world-frame displacements into the heading-aligned sensor frame.
///
/// Each displacement is negated (landmark relative to the observer) and its horizontal part is rotated
/// by `-reference_heading`. The vertical component is only negated. Deterministic.
pub fn to_sensor_frame(reference_heading: f64, displacements: &[Pose]) -> Vec<Pose> {
    let rotation = Rotation2::new(-reference_heading);
    displacements
        .iter()
        .map(|d| {
            let horizontal = rotation * Vector2::new(-d.x, -d.y);
            Pose::at(horizontal[0], horizontal[1], -d.z)
        })
        .collect()
}

/// Per-axis mean of a set of displacements. An empty set yields the zero pose.
pub fn mean_displacement(displacements: &[Pose]) -> Pose {
    if displacements.is_empty() {
        return Pose::default();
    }
    let n = displacements.len() as f64;
    let sum = displacements
        .iter()
        .fold(Vector3::zeros(), |acc: Vector3<f64>, d| acc + d.position());
    Pose::from(sum / n)
}
