//! Per-object records stored in a population, plus two-body helpers.
//!
//! The record types are `#[repr(C)]` plain old data: the same layout is handed to
//! plugins through the C ABI and written verbatim to population files.

use bytemuck::{Pod, Zeroable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Earth gravitational parameter in km^3/s^2.
pub const MU_EARTH: f64 = 398_600.441_8;

/// Julian day of the J2000 epoch (2000-01-01 12:00 TT).
pub const JD_J2000: f64 = 2_451_545.0;

/// Julian day of the Unix epoch.
const JD_UNIX_EPOCH: f64 = 2_440_587.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Classical orbital elements. Distances in km, angles in radians.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Orbit {
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub inclination: f64,
    pub raan: f64,
    pub arg_of_perigee: f64,
    pub mean_anomaly: f64,
}

/// Cartesian 3-vector, km or km/s.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Auxiliary per-object properties. The runtime never interprets them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct ObjectProperties {
    pub id: i32,
    pub object_class: i32,
    pub mass: f64,
    pub diameter: f64,
    pub area_to_mass: f64,
    pub drag_coefficient: f64,
    pub reflectivity: f64,
}

impl Vector3 {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    #[must_use]
    pub fn distance(&self, other: &Vector3) -> f64 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z).length()
    }
}

impl Orbit {
    /// Mean motion in rad/s.
    #[must_use]
    pub fn mean_motion(&self) -> f64 {
        (MU_EARTH / self.semi_major_axis.powi(3)).sqrt()
    }

    /// Orbital period in seconds.
    #[must_use]
    pub fn period(&self) -> f64 {
        TAU / self.mean_motion()
    }

    /// Bound, finite, non-degenerate elliptic orbit.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let fields = [
            self.semi_major_axis,
            self.eccentricity,
            self.inclination,
            self.raan,
            self.arg_of_perigee,
            self.mean_anomaly,
        ];
        fields.iter().all(|v| v.is_finite())
            && self.semi_major_axis > 0.0
            && (0.0..1.0).contains(&self.eccentricity)
    }

    /// Return the orbit with its mean anomaly advanced by `seconds`, wrapped to [0, 2pi).
    #[must_use]
    pub fn advanced(&self, seconds: f64) -> Orbit {
        let mut next = *self;
        next.mean_anomaly = (self.mean_anomaly + self.mean_motion() * seconds).rem_euclid(TAU);
        next
    }

    /// Position and velocity in the inertial frame of the elements.
    #[must_use]
    pub fn to_cartesian(&self) -> (Vector3, Vector3) {
        let e = self.eccentricity;
        let a = self.semi_major_axis;
        let ecc_anomaly = solve_kepler(self.mean_anomaly, e);
        let true_anomaly = 2.0
            * ((1.0 + e).sqrt() * (ecc_anomaly / 2.0).sin())
                .atan2((1.0 - e).sqrt() * (ecc_anomaly / 2.0).cos());

        let radius = a * (1.0 - e * ecc_anomaly.cos());
        let p = a * (1.0 - e * e);
        let (sin_nu, cos_nu) = true_anomaly.sin_cos();
        let px = radius * cos_nu;
        let py = radius * sin_nu;
        let vscale = (MU_EARTH / p).sqrt();
        let vx = -vscale * sin_nu;
        let vy = vscale * (e + cos_nu);

        let (sin_o, cos_o) = self.raan.sin_cos();
        let (sin_w, cos_w) = self.arg_of_perigee.sin_cos();
        let (sin_i, cos_i) = self.inclination.sin_cos();
        let r11 = cos_o * cos_w - sin_o * sin_w * cos_i;
        let r12 = -cos_o * sin_w - sin_o * cos_w * cos_i;
        let r21 = sin_o * cos_w + cos_o * sin_w * cos_i;
        let r22 = -sin_o * sin_w + cos_o * cos_w * cos_i;
        let r31 = sin_w * sin_i;
        let r32 = cos_w * sin_i;

        (
            Vector3::new(r11 * px + r12 * py, r21 * px + r22 * py, r31 * px + r32 * py),
            Vector3::new(r11 * vx + r12 * vy, r21 * vx + r22 * vy, r31 * vx + r32 * vy),
        )
    }
}

/// Solve Kepler's equation `M = E - e sin E` for the eccentric anomaly.
#[must_use]
pub fn solve_kepler(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let m = mean_anomaly.rem_euclid(TAU);
    let mut ecc_anomaly = if eccentricity > 0.8 { std::f64::consts::PI } else { m };
    for _ in 0..50 {
        let f = ecc_anomaly - eccentricity * ecc_anomaly.sin() - m;
        let step = f / (1.0 - eccentricity * ecc_anomaly.cos());
        ecc_anomaly -= step;
        if step.abs() < 1e-12 {
            break;
        }
    }
    ecc_anomaly
}

/// Julian day of a UTC timestamp.
#[must_use]
pub fn julian_day(time: DateTime<Utc>) -> f64 {
    let seconds = time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9;
    JD_UNIX_EPOCH + seconds / SECONDS_PER_DAY
}

/// Seconds between two Julian days.
#[must_use]
pub fn seconds_between(from_jd: f64, to_jd: f64) -> f64 {
    (to_jd - from_jd) * SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn leo() -> Orbit {
        Orbit {
            semi_major_axis: 7000.0,
            eccentricity: 0.01,
            inclination: 0.9,
            raan: 0.3,
            arg_of_perigee: 1.1,
            mean_anomaly: 0.5,
        }
    }

    #[test]
    fn test_kepler_solution_satisfies_equation() {
        for &e in &[0.0, 0.1, 0.5, 0.9] {
            let m = 1.3;
            let ea = solve_kepler(m, e);
            assert!((ea - e * ea.sin() - m).abs() < 1e-10);
        }
    }

    #[test]
    fn test_cartesian_radius_within_apsides() {
        let orbit = leo();
        let (pos, vel) = orbit.to_cartesian();
        let r = pos.length();
        assert!(r >= orbit.semi_major_axis * (1.0 - orbit.eccentricity) - 1e-6);
        assert!(r <= orbit.semi_major_axis * (1.0 + orbit.eccentricity) + 1e-6);

        // vis-viva
        let v2 = MU_EARTH * (2.0 / r - 1.0 / orbit.semi_major_axis);
        assert!((vel.length().powi(2) - v2).abs() < 1e-6);
    }

    #[test]
    fn test_full_period_returns_to_start() {
        let orbit = leo();
        let later = orbit.advanced(orbit.period());
        let (a, _) = orbit.to_cartesian();
        let (b, _) = later.to_cartesian();
        assert!(a.distance(&b) < 1e-6);
    }

    #[test]
    fn test_orbit_validity() {
        assert!(leo().is_valid());
        assert!(!Orbit::default().is_valid());
        let mut hyperbolic = leo();
        hyperbolic.eccentricity = 1.2;
        assert!(!hyperbolic.is_valid());
    }

    #[test]
    fn test_julian_day_of_j2000() {
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_day(j2000) - JD_J2000).abs() < 1e-9);
        assert!((seconds_between(JD_J2000, JD_J2000 + 1.0) - 86_400.0).abs() < 1e-9);
    }
}
