use glam::{Quat, Vec3};

use crate::error::{Result, SpzError};

/// Degree 0 SH basis constant, `1 / (2 sqrt(pi))`.
pub const SH_C0: f32 = 0.282_094_8;

pub const MAX_SH_DEGREE: u8 = 3;

/// Number of SH coefficients per color channel on top of the DC term.
pub const fn sh_coeffs_for_degree(degree: u8) -> usize {
    let bases = degree as usize + 1;
    bases * bases - 1
}

pub fn sh_degree_from_coeffs(coeffs_per_channel: usize) -> Option<u8> {
    match coeffs_per_channel {
        0 => Some(0),
        3 => Some(1),
        8 => Some(2),
        15 => Some(3),
        _ => None,
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn inverse_sigmoid(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}

pub fn channel_to_sh(rgb: f32) -> f32 {
    (rgb - 0.5) / SH_C0
}

pub fn rgb_to_sh(rgb: Vec3) -> Vec3 {
    glam::vec3(
        channel_to_sh(rgb.x),
        channel_to_sh(rgb.y),
        channel_to_sh(rgb.z),
    )
}

pub fn sh_to_rgb(sh_dc: Vec3) -> Vec3 {
    sh_dc * SH_C0 + Vec3::splat(0.5)
}

/// A Gaussian splat scene as flat, parallel attribute arrays.
///
/// * `scales` are natural logs of the per-axis standard deviation.
/// * `rotations` are quaternions in `x, y, z, w` order.
/// * `alphas` are opacities before the sigmoid activation.
/// * `colors` are the degree 0 SH coefficients of each channel.
/// * `sh` holds the higher order coefficients, coefficient-major with the
///   color channel innermost: `sh[(point * coeffs + coeff) * 3 + channel]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GaussianCloud {
    pub num_points: usize,
    pub sh_degree: u8,
    pub antialiased: bool,
    pub positions: Vec<f32>,
    pub scales: Vec<f32>,
    pub rotations: Vec<f32>,
    pub alphas: Vec<f32>,
    pub colors: Vec<f32>,
    pub sh: Vec<f32>,
}

impl GaussianCloud {
    pub fn empty(sh_degree: u8, antialiased: bool) -> Self {
        Self {
            sh_degree,
            antialiased,
            ..Default::default()
        }
    }

    /// Allocates a scene of `num_points` identity splats: unit scale, no
    /// rotation, zero logit opacity and a mid-grey color.
    pub fn with_points(num_points: usize, sh_degree: u8, antialiased: bool) -> Self {
        let coeffs = sh_coeffs_for_degree(sh_degree.min(MAX_SH_DEGREE));
        Self {
            num_points,
            sh_degree,
            antialiased,
            positions: vec![0.0; num_points * 3],
            scales: vec![0.0; num_points * 3],
            rotations: [0.0, 0.0, 0.0, 1.0].repeat(num_points),
            alphas: vec![0.0; num_points],
            colors: vec![0.0; num_points * 3],
            sh: vec![0.0; num_points * coeffs * 3],
        }
    }

    pub fn sh_coeffs_per_point(&self) -> usize {
        sh_coeffs_for_degree(self.sh_degree)
    }

    /// Checks that every attribute array agrees with `num_points` and `sh_degree`.
    pub fn validate(&self) -> Result<()> {
        if self.sh_degree > MAX_SH_DEGREE {
            return Err(SpzError::invalid(format!(
                "SH degree {} is out of range, at most {MAX_SH_DEGREE} is supported",
                self.sh_degree
            )));
        }

        let n = self.num_points;
        let expected = [
            ("positions", self.positions.len(), 3),
            ("scales", self.scales.len(), 3),
            ("rotations", self.rotations.len(), 4),
            ("alphas", self.alphas.len(), 1),
            ("colors", self.colors.len(), 3),
            ("sh", self.sh.len(), self.sh_coeffs_per_point() * 3),
        ];

        for (name, len, per_point) in expected {
            let Some(want) = n.checked_mul(per_point) else {
                return Err(SpzError::invalid(format!(
                    "{n} points don't fit in memory ({name})"
                )));
            };
            if len != want {
                return Err(SpzError::invalid(format!(
                    "{name} has {len} values, expected {want} for {n} points at SH degree {}",
                    self.sh_degree
                )));
            }
        }

        Ok(())
    }

    pub fn position(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.positions[index * 3..index * 3 + 3])
    }

    pub fn scale(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.scales[index * 3..index * 3 + 3])
    }

    pub fn rotation(&self, index: usize) -> Quat {
        Quat::from_slice(&self.rotations[index * 4..index * 4 + 4])
    }

    pub fn color(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.colors[index * 3..index * 3 + 3])
    }

    /// All higher order coefficients of one point, coefficient-major.
    pub fn sh_coeffs(&self, index: usize) -> &[f32] {
        let stride = self.sh_coeffs_per_point() * 3;
        &self.sh[index * stride..(index + 1) * stride]
    }
}
