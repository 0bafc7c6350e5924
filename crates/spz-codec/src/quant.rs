//! Fixed width integer codes for every splat attribute.
//!
//! The byte-wide attributes share one table of [`ByteQuantizer`]s keyed by
//! [`AttributeKind`]. Positions (24 bit fixed point with a per-file fraction)
//! and rotations (smallest three in 32 bits) have dedicated codecs below.

use std::f32::consts::{FRAC_1_SQRT_2, SQRT_2};

use glam::Quat;

use crate::scene::{inverse_sigmoid, sigmoid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Position,
    Scale,
    Rotation,
    Alpha,
    Color,
    ShBand1,
    ShBand2,
    ShBand3,
}

impl AttributeKind {
    /// Bits stored per component. Rotations store three 10 bit components
    /// plus a 2 bit index.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Position => POSITION_BITS,
            Self::Rotation => 10,
            Self::Scale
            | Self::Alpha
            | Self::Color
            | Self::ShBand1
            | Self::ShBand2
            | Self::ShBand3 => 8,
        }
    }

    /// Band of the `coeff`-th higher order SH coefficient (0 based, DC excluded).
    pub const fn sh_band(coeff: usize) -> Self {
        match coeff {
            0..3 => Self::ShBand1,
            3..8 => Self::ShBand2,
            _ => Self::ShBand3,
        }
    }

    pub fn byte_quantizer(self) -> Option<&'static ByteQuantizer> {
        QUANTIZERS.iter().find(|q| q.kind == self)
    }
}

/// How a byte code maps onto the attribute's value range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mapping {
    /// Unsigned code spread uniformly over `[min, max]`.
    Affine { min: f32, max: f32 },
    /// Signed code in `-127..=127` over `[-clip, clip]`, zero is exact.
    Symmetric { clip: f32 },
    /// Unsigned code with [`CENTER_CODE`] at zero, `step` apart. Zero is exact.
    Centered { step: f32 },
    /// Logit in, uniform code over the activated `[0, 1]` range.
    Sigmoid,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ByteQuantizer {
    pub kind: AttributeKind,
    pub mapping: Mapping,
}

pub const CENTER_CODE: u8 = 128;

// Keeps logits finite for codes 0 and 255.
const SIGMOID_EPS: f32 = 1.0 / 510.0;

impl ByteQuantizer {
    pub fn encode(&self, value: f32) -> u8 {
        match self.mapping {
            Mapping::Affine { min, max } => {
                let value = if value.is_nan() { (min + max) * 0.5 } else { value };
                ((value - min) / (max - min) * 255.0).round().clamp(0.0, 255.0) as u8
            }
            Mapping::Symmetric { clip } => {
                if value.is_nan() {
                    return 0;
                }
                let code = (value / clip * 127.0).round().clamp(-127.0, 127.0) as i8;
                code as u8
            }
            Mapping::Centered { step } => {
                if value.is_nan() {
                    return CENTER_CODE;
                }
                (value / step + f32::from(CENTER_CODE)).round().clamp(0.0, 255.0) as u8
            }
            Mapping::Sigmoid => {
                let p = if value.is_nan() { 0.5 } else { sigmoid(value) };
                (p * 255.0).round().clamp(0.0, 255.0) as u8
            }
        }
    }

    pub fn decode(&self, code: u8) -> f32 {
        match self.mapping {
            Mapping::Affine { min, max } => min + f32::from(code) / 255.0 * (max - min),
            Mapping::Symmetric { clip } => f32::from(code as i8) * clip / 127.0,
            Mapping::Centered { step } => {
                (i16::from(code) - i16::from(CENTER_CODE)) as f32 * step
            }
            Mapping::Sigmoid => {
                inverse_sigmoid((f32::from(code) / 255.0).clamp(SIGMOID_EPS, 1.0 - SIGMOID_EPS))
            }
        }
    }

    /// Distance between neighbouring codes. For [`Mapping::Sigmoid`] this is
    /// measured after the activation.
    pub fn step(&self) -> f32 {
        match self.mapping {
            Mapping::Affine { min, max } => (max - min) / 255.0,
            Mapping::Symmetric { clip } => clip / 127.0,
            Mapping::Centered { step } => step,
            Mapping::Sigmoid => 1.0 / 255.0,
        }
    }

    /// Values this quantizer represents without saturating.
    pub fn range(&self) -> (f32, f32) {
        match self.mapping {
            Mapping::Affine { min, max } => (min, max),
            Mapping::Symmetric { clip } => (-clip, clip),
            Mapping::Centered { step } => (
                -f32::from(CENTER_CODE) * step,
                f32::from(255 - CENTER_CODE) * step,
            ),
            Mapping::Sigmoid => (f32::NEG_INFINITY, f32::INFINITY),
        }
    }
}

/// Color codes use the 0.15 scale of the SPZ color code,
/// `code = dc * 0.15 * 255 + 128`.
const COLOR_STEP: f32 = 1.0 / (0.15 * 255.0);

pub const SCALE: ByteQuantizer = ByteQuantizer {
    kind: AttributeKind::Scale,
    mapping: Mapping::Affine {
        min: -10.0,
        max: 6.0,
    },
};

pub const ALPHA: ByteQuantizer = ByteQuantizer {
    kind: AttributeKind::Alpha,
    mapping: Mapping::Sigmoid,
};

pub const COLOR: ByteQuantizer = ByteQuantizer {
    kind: AttributeKind::Color,
    mapping: Mapping::Centered { step: COLOR_STEP },
};

pub const SH_BAND_1: ByteQuantizer = ByteQuantizer {
    kind: AttributeKind::ShBand1,
    mapping: Mapping::Symmetric { clip: 1.0 },
};

pub const SH_BAND_2: ByteQuantizer = ByteQuantizer {
    kind: AttributeKind::ShBand2,
    mapping: Mapping::Symmetric { clip: 0.5 },
};

pub const SH_BAND_3: ByteQuantizer = ByteQuantizer {
    kind: AttributeKind::ShBand3,
    mapping: Mapping::Symmetric { clip: 0.5 },
};

/// Every byte-wide attribute, one entry per kind.
pub static QUANTIZERS: [ByteQuantizer; 6] =
    [SCALE, ALPHA, COLOR, SH_BAND_1, SH_BAND_2, SH_BAND_3];

/// Quantizer for the `coeff`-th higher order SH coefficient.
pub fn sh_quantizer(coeff: usize) -> ByteQuantizer {
    match AttributeKind::sh_band(coeff) {
        AttributeKind::ShBand1 => SH_BAND_1,
        AttributeKind::ShBand2 => SH_BAND_2,
        _ => SH_BAND_3,
    }
}

pub const POSITION_BITS: u32 = 24;
pub const MAX_FRACTIONAL_BITS: u8 = 12;
const POSITION_MAX: f32 = ((1 << (POSITION_BITS - 1)) - 1) as f32;
const POSITION_MIN: f32 = -((1 << (POSITION_BITS - 1)) as f32);

/// Largest fraction (up to [`MAX_FRACTIONAL_BITS`]) that still fits the
/// largest coordinate into 24 signed bits. Scenes too large even for 0 bits
/// saturate.
pub fn fractional_bits_for(positions: &[f32]) -> u8 {
    let extent = positions
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0f32, |acc, v| acc.max(v.abs()));

    (0..=MAX_FRACTIONAL_BITS)
        .rev()
        .find(|bits| extent * (1u32 << bits) as f32 <= POSITION_MAX)
        .unwrap_or(0)
}

pub fn position_step(fractional_bits: u8) -> f32 {
    1.0 / (1u32 << fractional_bits) as f32
}

pub fn encode_position(value: f32, fractional_bits: u8) -> [u8; 3] {
    let scale = (1u32 << fractional_bits) as f32;
    let fixed = (value * scale).round().clamp(POSITION_MIN, POSITION_MAX) as i32;
    let [b0, b1, b2, _] = fixed.to_le_bytes();
    [b0, b1, b2]
}

pub fn decode_position(bytes: [u8; 3], fractional_bits: u8) -> f32 {
    let extend = if bytes[2] & 0x80 != 0 { 0xff } else { 0x00 };
    let fixed = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], extend]);
    fixed as f32 / (1u32 << fractional_bits) as f32
}

const ROTATION_MAGNITUDE_BITS: u32 = 9;
const ROTATION_MAGNITUDE_MASK: u32 = (1 << ROTATION_MAGNITUDE_BITS) - 1;
const ROTATION_SIGN_BIT: u32 = 1 << ROTATION_MAGNITUDE_BITS;

/// Distance between neighbouring codes of a stored rotation component.
pub fn rotation_step() -> f32 {
    FRAC_1_SQRT_2 / ROTATION_MAGNITUDE_MASK as f32
}

/// Packs a quaternion as "smallest three".
///
/// The largest magnitude component is dropped and rebuilt from the unit norm
/// on decode; the quaternion is negated first if needed so that component is
/// positive. From the most significant end the word holds the dropped index
/// (2 bits) and three `sign | magnitude` fields of 10 bits. Each remaining
/// component is at most `1/sqrt(2)` in magnitude, so it is scaled by `sqrt(2)`
/// to use the full 9 bits.
pub fn encode_rotation(rotation: Quat) -> [u8; 4] {
    let rotation = if rotation.is_finite() && rotation.length_squared() > 0.0 {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    };

    let mut q = rotation.to_array();
    let mut largest = 0;
    for i in 1..4 {
        if q[i].abs() > q[largest].abs() {
            largest = i;
        }
    }
    if q[largest] < 0.0 {
        q = q.map(|c| -c);
    }

    let mut packed = largest as u32;
    for (i, c) in q.iter().enumerate() {
        if i == largest {
            continue;
        }
        let magnitude = (c.abs() * SQRT_2 * ROTATION_MAGNITUDE_MASK as f32)
            .round()
            .min(ROTATION_MAGNITUDE_MASK as f32) as u32;
        let sign = if *c < 0.0 { ROTATION_SIGN_BIT } else { 0 };
        packed = (packed << 10) | sign | magnitude;
    }
    packed.to_le_bytes()
}

pub fn decode_rotation(bytes: [u8; 4]) -> Quat {
    let mut packed = u32::from_le_bytes(bytes);
    let largest = (packed >> 30) as usize;

    let mut q = [0.0f32; 4];
    let mut sum_squares = 0.0;
    for i in (0..4).rev() {
        if i == largest {
            continue;
        }
        let field = packed & 0x3ff;
        packed >>= 10;
        let magnitude =
            (field & ROTATION_MAGNITUDE_MASK) as f32 / ROTATION_MAGNITUDE_MASK as f32 * FRAC_1_SQRT_2;
        q[i] = if field & ROTATION_SIGN_BIT != 0 {
            -magnitude
        } else {
            magnitude
        };
        sum_squares += q[i] * q[i];
    }
    q[largest] = (1.0 - sum_squares).max(0.0).sqrt();
    Quat::from_array(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn samples(min: f32, max: f32) -> impl Iterator<Item = f32> {
        (0..=200).map(move |i| min + (max - min) * i as f32 / 200.0)
    }

    #[test]
    fn table_covers_byte_kinds() {
        for q in &QUANTIZERS {
            assert_eq!(q.kind.byte_quantizer(), Some(q));
            assert_eq!(q.kind.bits(), 8);
        }
        assert!(AttributeKind::Position.byte_quantizer().is_none());
        assert!(AttributeKind::Rotation.byte_quantizer().is_none());
    }

    #[test]
    fn byte_quantizers_stay_within_half_a_step() {
        for q in QUANTIZERS
            .iter()
            .filter(|q| q.mapping != Mapping::Sigmoid)
        {
            let (min, max) = q.range();
            for v in samples(min, max) {
                let back = q.decode(q.encode(v));
                assert!(
                    (back - v).abs() <= q.step() * 0.5 + 1e-5,
                    "{:?}: {v} came back as {back}",
                    q.kind
                );
            }
        }
    }

    #[test]
    fn alpha_is_accurate_after_activation() {
        let alpha = ALPHA;
        for v in samples(-8.0, 8.0) {
            let back = alpha.decode(alpha.encode(v));
            assert!(back.is_finite(), "{v}");
            assert!(
                (sigmoid(back) - sigmoid(v)).abs() <= alpha.step(),
                "{v} came back as {back}"
            );
        }
        assert!(alpha.decode(0).is_finite());
        assert!(alpha.decode(255).is_finite());
    }

    #[test]
    fn out_of_range_saturates() {
        let scale = SCALE;
        assert_eq!(scale.encode(-100.0), 0);
        assert_eq!(scale.encode(100.0), 255);
        assert_approx_eq!(scale.decode(255), 6.0);

        let sh = SH_BAND_2;
        assert_approx_eq!(sh.decode(sh.encode(3.0)), 0.5);
        assert_approx_eq!(sh.decode(sh.encode(-3.0)), -0.5);
    }

    #[test]
    fn nan_encodes_to_the_middle() {
        assert_eq!(SH_BAND_1.encode(f32::NAN), 0);
        assert_eq!(ALPHA.encode(f32::NAN), 128);
        assert_eq!(COLOR.decode(COLOR.encode(f32::NAN)), 0.0);
    }

    #[test]
    fn sh_zero_is_exact() {
        for coeff in 0..15 {
            let q = sh_quantizer(coeff);
            assert_eq!(q.decode(q.encode(0.0)), 0.0);
        }
    }

    #[test]
    fn color_zero_is_exact() {
        assert_eq!(COLOR.encode(0.0), CENTER_CODE);
        assert_eq!(COLOR.decode(COLOR.encode(0.0)), 0.0);
        assert_eq!(COLOR.decode(COLOR.encode(-0.001)), 0.0);
        assert_approx_eq!(COLOR.decode(COLOR.encode(1.0)), 1.0, COLOR.step() * 0.5);

        let (min, max) = COLOR.range();
        assert_eq!(COLOR.encode(min), 0);
        assert_eq!(COLOR.encode(max), 255);
        assert_eq!(COLOR.encode(100.0), 255);
    }

    #[test]
    fn sh_bands() {
        assert_eq!(AttributeKind::sh_band(0), AttributeKind::ShBand1);
        assert_eq!(AttributeKind::sh_band(2), AttributeKind::ShBand1);
        assert_eq!(AttributeKind::sh_band(3), AttributeKind::ShBand2);
        assert_eq!(AttributeKind::sh_band(7), AttributeKind::ShBand2);
        assert_eq!(AttributeKind::sh_band(8), AttributeKind::ShBand3);
        assert_eq!(AttributeKind::sh_band(14), AttributeKind::ShBand3);
    }

    #[test]
    fn fractional_bits_follow_extent() {
        assert_eq!(fractional_bits_for(&[]), MAX_FRACTIONAL_BITS);
        assert_eq!(fractional_bits_for(&[1.0, -2.0, 3.0]), MAX_FRACTIONAL_BITS);
        // 2^23 / 2^12 = 2048 is just out of reach at 12 bits.
        assert_eq!(fractional_bits_for(&[2048.0]), 11);
        assert_eq!(fractional_bits_for(&[-100_000.0]), 6);
        assert_eq!(fractional_bits_for(&[1.0e9]), 0);
        assert_eq!(fractional_bits_for(&[f32::INFINITY, 1.0]), MAX_FRACTIONAL_BITS);
    }

    #[test]
    fn positions_round_trip() {
        for bits in [0, 6, 12] {
            let step = position_step(bits);
            for v in [0.0f32, 1.0, -1.0, 0.123_456, -1234.567, 2047.9] {
                let limit = POSITION_MAX * step;
                let expected = v.clamp(-limit, limit);
                let back = decode_position(encode_position(v, bits), bits);
                assert!(
                    (back - expected).abs() <= step * 0.5,
                    "{v} at {bits} bits came back as {back}"
                );
            }
        }
    }

    #[test]
    fn positions_saturate() {
        let back = decode_position(encode_position(1.0e6, 12), 12);
        assert_approx_eq!(back, POSITION_MAX / 4096.0);
        let back = decode_position(encode_position(-1.0e6, 12), 12);
        assert_approx_eq!(back, POSITION_MIN / 4096.0);
    }

    fn same_rotation(a: Quat, b: Quat, tolerance: f32) -> bool {
        a.abs_diff_eq(b, tolerance) || a.abs_diff_eq(-b, tolerance)
    }

    #[test]
    fn rotations_round_trip() {
        let axes = [
            glam::Vec3::X,
            glam::Vec3::Y,
            glam::Vec3::Z,
            glam::vec3(1.0, 1.0, 0.0).normalize(),
            glam::vec3(-0.3, 0.8, 0.5).normalize(),
            glam::vec3(0.6, -0.2, -0.9).normalize(),
        ];
        for axis in axes {
            for step in 0..24 {
                let angle = step as f32 * std::f32::consts::TAU / 24.0;
                let q = Quat::from_axis_angle(axis, angle);
                let back = decode_rotation(encode_rotation(q));
                assert!(
                    same_rotation(q, back, 4.0 * rotation_step()),
                    "{q} came back as {back}"
                );
                assert_approx_eq!(back.length(), 1.0, 1e-5);
            }
        }
    }

    #[test]
    fn rotation_sign_is_canonical() {
        let q = Quat::from_xyzw(0.2, -0.4, 0.1, -0.8).normalize();
        assert_eq!(encode_rotation(q), encode_rotation(-q));
        let back = decode_rotation(encode_rotation(q));
        assert!(back.w > 0.0, "largest component must come back positive");
    }

    #[test]
    fn degenerate_rotations_become_identity() {
        for q in [Quat::from_xyzw(0.0, 0.0, 0.0, 0.0), Quat::from_xyzw(f32::NAN, 0.0, 0.0, 1.0)] {
            assert_eq!(decode_rotation(encode_rotation(q)), Quat::IDENTITY);
        }
    }

    #[test]
    fn unnormalized_rotations_are_normalized() {
        let q = Quat::from_xyzw(0.0, 0.0, 2.0, 2.0);
        let back = decode_rotation(encode_rotation(q));
        assert!(same_rotation(q.normalize(), back, 4.0 * rotation_step()));
    }
}
