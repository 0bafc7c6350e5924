use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use glam::{Mat3, Quat, Vec3};

use crate::error::SpzError;
use crate::scene::GaussianCloud;

/// Axis convention of a scene: which way x (Left/Right), y (Down/Up) and
/// z (Back/Front) point.
///
/// `Unspecified` is not a frame, it means "leave the data alone". Any
/// transform to or from it is the identity.
#[derive(
    Default,
    ValueEnum,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Debug,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum CoordinateFrame {
    #[default]
    Unspecified = 0,
    Ldb = 1,
    Rdb = 2,
    Lub = 3,
    Rub = 4,
    Ldf = 5,
    Rdf = 6,
    Luf = 7,
    Ruf = 8,
}

/// Frame every container stores its data in.
pub const STORAGE_FRAME: CoordinateFrame = CoordinateFrame::Rub;

/// Frame assumed for PLY files, the convention of 3DGS training code.
pub const PLY_FRAME: CoordinateFrame = CoordinateFrame::Rdf;

impl CoordinateFrame {
    pub const ALL: [Self; 9] = [
        Self::Unspecified,
        Self::Ldb,
        Self::Rdb,
        Self::Lub,
        Self::Rub,
        Self::Ldf,
        Self::Rdf,
        Self::Luf,
        Self::Ruf,
    ];

    /// Direction of each axis relative to RUB, `None` when unspecified.
    fn axis_signs(self) -> Option<[f32; 3]> {
        let (x, y, z) = match self {
            Self::Unspecified => return None,
            Self::Ldb => (-1.0, -1.0, 1.0),
            Self::Rdb => (1.0, -1.0, 1.0),
            Self::Lub => (-1.0, 1.0, 1.0),
            Self::Rub => (1.0, 1.0, 1.0),
            Self::Ldf => (-1.0, -1.0, -1.0),
            Self::Rdf => (1.0, -1.0, -1.0),
            Self::Luf => (-1.0, 1.0, -1.0),
            Self::Ruf => (1.0, 1.0, -1.0),
        };
        Some([x, y, z])
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Ldb => "LDB",
            Self::Rdb => "RDB",
            Self::Lub => "LUB",
            Self::Rub => "RUB",
            Self::Ldf => "LDF",
            Self::Rdf => "RDF",
            Self::Luf => "LUF",
            Self::Ruf => "RUF",
        }
    }
}

impl TryFrom<u8> for CoordinateFrame {
    type Error = SpzError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| SpzError::InvalidCoordinateFrame(format!("unknown frame id {value}")))
    }
}

impl FromStr for CoordinateFrame {
    type Err = SpzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|frame| frame.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SpzError::InvalidCoordinateFrame(format!("unknown frame `{s}`")))
    }
}

impl fmt::Display for CoordinateFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which axes each higher order SH basis function is odd in, per coefficient.
/// Flipping an axis negates exactly the coefficients odd in it.
const SH_PARITY: [[bool; 3]; 15] = [
    // Band 1: y, z, x
    [false, true, false],
    [false, false, true],
    [true, false, false],
    // Band 2: xy, yz, 3z^2 - 1, xz, x^2 - y^2
    [true, true, false],
    [false, true, true],
    [false, false, false],
    [true, false, true],
    [false, false, false],
    // Band 3: y(3x^2 - y^2), xyz, y(5z^2 - 1), z(5z^2 - 3), x(5z^2 - 1), z(x^2 - y^2), x(x^2 - 3y^2)
    [false, true, false],
    [true, true, true],
    [false, true, false],
    [false, false, true],
    [true, false, false],
    [false, false, true],
    [true, false, false],
];

/// A 3x3 signed permutation taking coordinates from one frame to another.
///
/// The eight frames share their axis order and only differ in direction, so
/// every transform between them is diagonal and is stored as per-axis signs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTransform {
    signs: [f32; 3],
}

impl FrameTransform {
    pub const IDENTITY: Self = Self {
        signs: [1.0, 1.0, 1.0],
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn matrix(&self) -> Mat3 {
        Mat3::from_diagonal(Vec3::from_array(self.signs))
    }

    pub fn determinant(&self) -> f32 {
        self.signs.iter().product()
    }

    /// Applies `self` first, then `next`.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        Self {
            signs: [
                self.signs[0] * next.signs[0],
                self.signs[1] * next.signs[1],
                self.signs[2] * next.signs[2],
            ],
        }
    }

    pub fn apply_position(&self, position: Vec3) -> Vec3 {
        position * Vec3::from_array(self.signs)
    }

    /// Conjugates the rotation by the transform. The axis of a rotation is a
    /// pseudovector, so it picks up the determinant on top of the axis signs.
    pub fn apply_rotation(&self, rotation: Quat) -> Quat {
        let axis = rotation.xyz() * Vec3::from_array(self.signs) * self.determinant();
        Quat::from_xyzw(axis.x, axis.y, axis.z, rotation.w)
    }

    /// Scales are magnitudes: permuted along with the axes, never negated.
    pub fn apply_scale(&self, log_scale: Vec3) -> Vec3 {
        log_scale
    }

    /// Sign to multiply each of the first `coeffs` SH coefficients with.
    pub fn sh_signs(&self, coeffs: usize) -> Vec<f32> {
        SH_PARITY[..coeffs]
            .iter()
            .map(|odd| {
                odd.iter()
                    .zip(self.signs)
                    .filter(|(odd, _)| **odd)
                    .map(|(_, sign)| sign)
                    .product()
            })
            .collect()
    }

    /// Converts every spatial attribute of the cloud in place.
    pub fn apply(&self, cloud: &mut GaussianCloud) {
        if self.is_identity() {
            return;
        }

        let _span = tracing::trace_span!("FrameTransform::apply").entered();

        for position in cloud.positions.chunks_exact_mut(3) {
            let p = self.apply_position(Vec3::from_slice(position));
            p.write_to_slice(position);
        }

        for rotation in cloud.rotations.chunks_exact_mut(4) {
            let q = self.apply_rotation(Quat::from_slice(rotation));
            q.write_to_slice(rotation);
        }

        for scale in cloud.scales.chunks_exact_mut(3) {
            let s = self.apply_scale(Vec3::from_slice(scale));
            s.write_to_slice(scale);
        }

        let coeffs = cloud.sh_coeffs_per_point();
        if coeffs > 0 {
            let signs = self.sh_signs(coeffs);
            for point in cloud.sh.chunks_exact_mut(coeffs * 3) {
                for (coeff, sign) in point.chunks_exact_mut(3).zip(&signs) {
                    for value in coeff {
                        *value *= sign;
                    }
                }
            }
        }
    }
}

/// Transform taking coordinates expressed in `from` to coordinates in `to`.
pub fn transform(from: CoordinateFrame, to: CoordinateFrame) -> FrameTransform {
    match (from.axis_signs(), to.axis_signs()) {
        (Some(a), Some(b)) => FrameTransform {
            signs: [a[0] * b[0], a[1] * b[1], a[2] * b[2]],
        },
        _ => FrameTransform::IDENTITY,
    }
}
