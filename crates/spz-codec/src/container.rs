//! The uncompressed container: a 16 byte header followed by one section per
//! attribute.
//!
//! ```text
//! offset size field
//!      0    4 magic "GSPZ"
//!      4    4 version, u32 little endian
//!      8    4 point count, u32 little endian
//!     12    1 SH degree (0..=3)
//!     13    1 position fractional bits
//!     14    1 flags, bit 0 = antialiased
//!     15    1 reserved, zero
//! ```
//!
//! Sections follow in a fixed order, each a tightly packed array with one
//! entry per point: positions (3 x 24 bit), scales (3 x u8), rotations
//! (u32), alphas (u8), colors (3 x u8) and SH coefficients
//! (`coeffs x 3` x i8, coefficient-major, channel innermost). All values are
//! in [`STORAGE_FRAME`](crate::frame::STORAGE_FRAME).

use glam::Vec3;

use crate::error::{Result, SpzError};
use crate::quant::{
    ALPHA, COLOR, SCALE, decode_position, decode_rotation, encode_position, encode_rotation,
    fractional_bits_for, sh_quantizer,
};
use crate::scene::{GaussianCloud, MAX_SH_DEGREE, sh_coeffs_for_degree};

pub const MAGIC: [u8; 4] = *b"GSPZ";
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 16;
pub const FLAG_ANTIALIASED: u8 = 0x1;

const POSITION_BYTES: usize = 9;
const SCALE_BYTES: usize = 3;
const ROTATION_BYTES: usize = 4;
const ALPHA_BYTES: usize = 1;
const COLOR_BYTES: usize = 3;

// A 24 bit code can't have more fraction than that.
const MAX_STORED_FRACTIONAL_BITS: u8 = 23;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub num_points: u32,
    pub sh_degree: u8,
    pub fractional_bits: u8,
    pub antialiased: bool,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..8].copy_from_slice(&VERSION.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.num_points.to_le_bytes());
        bytes[12] = self.sh_degree;
        bytes[13] = self.fractional_bits;
        bytes[14] = if self.antialiased { FLAG_ANTIALIASED } else { 0 };
        bytes
    }

    /// Parses the header at the start of `bytes`. Signature and version are
    /// checked before anything else, so a foreign file is reported as such
    /// even when it is shorter than a header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() >= 4 && bytes[0..4] != MAGIC {
            return Err(SpzError::UnsupportedFormat(format!(
                "bad magic {:02x?}, expected {MAGIC:02x?}",
                &bytes[0..4]
            )));
        }

        if bytes.len() >= 8 {
            let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            if version != VERSION {
                return Err(SpzError::UnsupportedFormat(format!(
                    "container version {version}, only version {VERSION} is supported"
                )));
            }
        }

        if bytes.len() < HEADER_SIZE {
            return Err(SpzError::corrupt(format!(
                "truncated header: {} of {HEADER_SIZE} bytes",
                bytes.len()
            )));
        }

        let header = Self {
            num_points: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            sh_degree: bytes[12],
            fractional_bits: bytes[13],
            antialiased: bytes[14] & FLAG_ANTIALIASED != 0,
        };

        if header.sh_degree > MAX_SH_DEGREE {
            return Err(SpzError::corrupt(format!(
                "SH degree {} in header",
                header.sh_degree
            )));
        }
        if header.fractional_bits > MAX_STORED_FRACTIONAL_BITS {
            return Err(SpzError::corrupt(format!(
                "{} fractional position bits in header",
                header.fractional_bits
            )));
        }

        Ok(header)
    }

    pub fn sh_coeffs(&self) -> usize {
        sh_coeffs_for_degree(self.sh_degree)
    }

    /// Bytes of all sections together, `None` if that overflows.
    pub fn body_len(&self) -> Option<usize> {
        let per_point = POSITION_BYTES
            + SCALE_BYTES
            + ROTATION_BYTES
            + ALPHA_BYTES
            + COLOR_BYTES
            + self.sh_coeffs() * 3;
        (self.num_points as usize).checked_mul(per_point)
    }
}

/// Quantized scene, one byte vector per section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedGaussians {
    pub header: Header,
    pub positions: Vec<u8>,
    pub scales: Vec<u8>,
    pub rotations: Vec<u8>,
    pub alphas: Vec<u8>,
    pub colors: Vec<u8>,
    pub sh: Vec<u8>,
}

fn take<'a>(body: &mut &'a [u8], len: usize) -> &'a [u8] {
    let (section, rest) = body.split_at(len);
    *body = rest;
    section
}

impl PackedGaussians {
    /// Quantizes a cloud that is already in the storage frame.
    pub fn pack(cloud: &GaussianCloud) -> Result<Self> {
        cloud.validate()?;

        let num_points = u32::try_from(cloud.num_points).map_err(|_err| {
            SpzError::invalid(format!("{} points do not fit a container", cloud.num_points))
        })?;

        if let Some(bad) = cloud.positions.iter().position(|v| !v.is_finite()) {
            return Err(SpzError::invalid(format!(
                "position of point {} is not finite",
                bad / 3
            )));
        }

        let fractional_bits = fractional_bits_for(&cloud.positions);

        let positions = cloud
            .positions
            .iter()
            .flat_map(|&v| encode_position(v, fractional_bits))
            .collect();
        let scales = cloud.scales.iter().map(|&v| SCALE.encode(v)).collect();
        let rotations = (0..cloud.num_points)
            .flat_map(|i| encode_rotation(cloud.rotation(i)))
            .collect();
        let alphas = cloud.alphas.iter().map(|&v| ALPHA.encode(v)).collect();
        let colors = cloud.colors.iter().map(|&v| COLOR.encode(v)).collect();

        let coeffs = cloud.sh_coeffs_per_point();
        let sh = cloud
            .sh
            .chunks_exact(3)
            .enumerate()
            .flat_map(|(i, rgb)| {
                let quantizer = sh_quantizer(i % coeffs);
                rgb.iter().map(move |&v| quantizer.encode(v))
            })
            .collect();

        Ok(Self {
            header: Header {
                num_points,
                sh_degree: cloud.sh_degree,
                fractional_bits,
                antialiased: cloud.antialiased,
            },
            positions,
            scales,
            rotations,
            alphas,
            colors,
            sh,
        })
    }

    pub fn unpack(&self) -> GaussianCloud {
        let header = &self.header;
        let num_points = header.num_points as usize;
        let coeffs = header.sh_coeffs();

        let positions = self
            .positions
            .chunks_exact(3)
            .map(|b| decode_position([b[0], b[1], b[2]], header.fractional_bits))
            .collect();
        let scales = self.scales.iter().map(|&b| SCALE.decode(b)).collect();
        let rotations = self
            .rotations
            .chunks_exact(4)
            .flat_map(|b| decode_rotation([b[0], b[1], b[2], b[3]]).to_array())
            .collect();
        let alphas = self.alphas.iter().map(|&b| ALPHA.decode(b)).collect();
        let colors = self.colors.iter().map(|&b| COLOR.decode(b)).collect();
        let sh = self
            .sh
            .chunks_exact(3)
            .enumerate()
            .flat_map(|(i, rgb)| {
                let quantizer = sh_quantizer(i % coeffs);
                rgb.iter().map(move |&b| quantizer.decode(b))
            })
            .collect();

        GaussianCloud {
            num_points,
            sh_degree: header.sh_degree,
            antialiased: header.antialiased,
            positions,
            scales,
            rotations,
            alphas,
            colors,
            sh,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let sections = [
            &self.positions,
            &self.scales,
            &self.rotations,
            &self.alphas,
            &self.colors,
            &self.sh,
        ];
        let len = HEADER_SIZE + sections.iter().map(|s| s.len()).sum::<usize>();

        let mut bytes = Vec::with_capacity(len);
        bytes.extend_from_slice(&self.header.to_bytes());
        for section in sections {
            bytes.extend_from_slice(section);
        }
        bytes
    }

    /// Splits a container into its sections. Bytes after the last section
    /// are ignored, or rejected when `strict` is set.
    pub fn from_bytes(bytes: &[u8], strict: bool) -> Result<Self> {
        let header = Header::parse(bytes)?;
        let body_len = header.body_len().ok_or_else(|| {
            SpzError::corrupt(format!("{} points overflow the address space", header.num_points))
        })?;

        let mut body = &bytes[HEADER_SIZE..];
        if body.len() < body_len {
            return Err(SpzError::corrupt(format!(
                "truncated container: {} points need {body_len} bytes after the header, found {}",
                header.num_points,
                body.len()
            )));
        }

        let trailing = body.len() - body_len;
        if trailing > 0 {
            if strict {
                return Err(SpzError::corrupt(format!(
                    "{trailing} unexpected bytes after the last section"
                )));
            }
            log::debug!("Ignoring {trailing} trailing bytes after the last section");
        }

        let n = header.num_points as usize;
        let sh_len = n * header.sh_coeffs() * 3;
        Ok(Self {
            header,
            positions: take(&mut body, n * POSITION_BYTES).to_vec(),
            scales: take(&mut body, n * SCALE_BYTES).to_vec(),
            rotations: take(&mut body, n * ROTATION_BYTES).to_vec(),
            alphas: take(&mut body, n * ALPHA_BYTES).to_vec(),
            colors: take(&mut body, n * COLOR_BYTES).to_vec(),
            sh: take(&mut body, sh_len).to_vec(),
        })
    }
}

/// Centre of the decoded scene's bounds, handy for sanity logging.
pub(crate) fn bounds_center(cloud: &GaussianCloud) -> Option<Vec3> {
    let mut points = cloud.positions.chunks_exact(3).map(Vec3::from_slice);
    let first = points.next()?;
    let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
    Some((min + max) * 0.5)
}
