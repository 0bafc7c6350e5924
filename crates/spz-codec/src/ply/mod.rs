//! Reading and writing the PLY layout produced by 3DGS trainers.
//!
//! PLY files store positions, log scales, `rot_0..3` quaternions (scalar
//! first), pre-sigmoid `opacity`, `f_dc_*` color and channel-major `f_rest_*`
//! coefficients, all in [`PLY_FRAME`].

mod gaussian;
mod header;

use std::io::{Read, Write};

use glam::Vec3;
use serde_ply::SerializeOptions;

use crate::config::{PackOptions, PlyEncoding, UnpackOptions};
use crate::error::{Result, SpzError};
use crate::frame::{CoordinateFrame, PLY_FRAME, transform};
use crate::scene::{
    GaussianCloud, MAX_SH_DEGREE, rgb_to_sh, sh_coeffs_for_degree, sh_degree_from_coeffs,
};

use gaussian::{PlyInput, PlyOutput, property_names};
use header::{PlyHeader, scan_header};

const REQUIRED: [&str; 11] = [
    "x", "y", "z", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3", "opacity",
];
const DC_NAMES: [&str; 3] = ["f_dc_0", "f_dc_1", "f_dc_2"];
const RGB_NAMES: [[&str; 2]; 3] = [["red", "r"], ["green", "g"], ["blue", "b"]];

/// Rest coefficient columns of a degree 4 file, which get cut down to degree 3.
const DEGREE_4_REST: usize = 72;

/// SH degree implied by the number of `f_rest_*` columns.
fn sh_degree_for(header: &PlyHeader) -> Result<u8> {
    let rest = header.rest_count();
    if rest == DEGREE_4_REST {
        log::warn!("Ply file has SH degree 4, dropping the 4th band");
        return Ok(MAX_SH_DEGREE);
    }

    if rest % 3 == 0
        && let Some(degree) = sh_degree_from_coeffs(rest / 3)
    {
        return Ok(degree);
    }

    Err(SpzError::corrupt(format!(
        "{rest} f_rest properties don't match any SH degree"
    )))
}

fn check_properties(header: &PlyHeader) -> Result<bool> {
    if let Some(missing) = REQUIRED.iter().find(|name| !header.has_property(name)) {
        return Err(SpzError::MissingProperty((*missing).to_owned()));
    }

    if DC_NAMES.iter().all(|name| header.has_property(name)) {
        return Ok(false);
    }

    if RGB_NAMES.iter().all(|names| header.has_any(names)) {
        log::info!("Ply file has no f_dc properties, using its rgb color");
        return Ok(true);
    }

    let missing = DC_NAMES
        .iter()
        .find(|name| !header.has_property(name))
        .copied()
        .unwrap_or(DC_NAMES[0]);
    Err(SpzError::MissingProperty(missing.to_owned()))
}

/// Parses a PLY stream and converts it from [`PLY_FRAME`] to `options.to`.
pub fn read_ply<R: Read>(mut reader: R, options: &UnpackOptions) -> Result<GaussianCloud> {
    let _span = tracing::trace_span!("read_ply").entered();

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let header = scan_header(&bytes)?;

    log::debug!("Reading {:?} ply file", header.format);
    for comment in &header.comments {
        log::debug!("Ply comment: {comment}");
    }

    if header.vertex_count == 0 {
        return Ok(GaussianCloud::empty(0, false));
    }

    let use_rgb = check_properties(&header)?;
    let sh_degree = sh_degree_for(&header)?;
    let file_coeffs = header.rest_count() / 3;
    let coeffs = sh_coeffs_for_degree(sh_degree);

    let ply: PlyInput = serde_ply::from_reader(bytes.as_slice())
        .map_err(|err| SpzError::corrupt(format!("failed to parse ply rows: {err}")))?;

    if ply.vertex.len() != header.vertex_count {
        return Err(SpzError::corrupt(format!(
            "ply header declares {} vertices, found {}",
            header.vertex_count,
            ply.vertex.len()
        )));
    }

    let mut cloud = GaussianCloud::with_points(ply.vertex.len(), sh_degree, false);
    for (i, gauss) in ply.vertex.iter().enumerate() {
        let dc = match (use_rgb, gauss.red, gauss.green, gauss.blue) {
            (true, Some(r), Some(g), Some(b)) => rgb_to_sh(Vec3::new(r, g, b)),
            _ => Vec3::new(gauss.f_dc_0, gauss.f_dc_1, gauss.f_dc_2),
        };

        cloud.positions[i * 3..i * 3 + 3].copy_from_slice(&[gauss.x, gauss.y, gauss.z]);
        cloud.scales[i * 3..i * 3 + 3]
            .copy_from_slice(&[gauss.scale_0, gauss.scale_1, gauss.scale_2]);
        // Ply files are in scalar first order.
        cloud.rotations[i * 4..i * 4 + 4]
            .copy_from_slice(&[gauss.rot_1, gauss.rot_2, gauss.rot_3, gauss.rot_0]);
        cloud.alphas[i] = gauss.opacity;
        dc.write_to_slice(&mut cloud.colors[i * 3..i * 3 + 3]);

        if coeffs > 0 {
            let rest = gauss.rest_coeffs();
            let sh = &mut cloud.sh[i * coeffs * 3..(i + 1) * coeffs * 3];
            for coeff in 0..coeffs {
                for channel in 0..3 {
                    sh[coeff * 3 + channel] = rest[channel * file_coeffs + coeff];
                }
            }
        }
    }

    transform(PLY_FRAME, options.to).apply(&mut cloud);

    log::info!(
        "Read {} splats with SH degree {} from ply",
        cloud.num_points,
        cloud.sh_degree
    );

    Ok(cloud)
}

/// Converts `cloud` from `options.from` to [`PLY_FRAME`] and writes it as PLY.
pub fn write_ply<W: Write>(
    cloud: &GaussianCloud,
    options: &PackOptions,
    encoding: PlyEncoding,
    mut writer: W,
) -> Result<()> {
    let _span = tracing::trace_span!("write_ply").entered();

    cloud.validate()?;

    let to_ply = transform(options.from, PLY_FRAME);
    let converted;
    let cloud = if to_ply.is_identity() {
        cloud
    } else {
        let mut copy = cloud.clone();
        to_ply.apply(&mut copy);
        converted = copy;
        &converted
    };

    let mut comments = vec![format!(
        "Exported by spz-codec {}",
        env!("CARGO_PKG_VERSION")
    )];
    // Without a source frame the rows go out as given, in no known frame.
    if options.from != CoordinateFrame::Unspecified {
        comments.push(format!("Coordinate frame: {PLY_FRAME}"));
    }

    if cloud.num_points == 0 {
        write_empty_header(encoding, &comments, &mut writer)?;
        return Ok(());
    }

    let options = match encoding {
        PlyEncoding::Ascii => SerializeOptions::ascii(),
        PlyEncoding::BinaryLittleEndian => SerializeOptions::binary_le(),
    };
    let bytes = serde_ply::to_bytes(&PlyOutput::new(cloud), options.with_comments(comments))
        .map_err(|err| SpzError::invalid(format!("failed to serialize ply: {err}")))?;
    writer.write_all(&bytes)?;

    log::info!(
        "Wrote {} splats with SH degree {} to ply",
        cloud.num_points,
        cloud.sh_degree
    );
    Ok(())
}

// Rows are what describe the properties to the serializer, so an empty
// scene gets its header written by hand.
fn write_empty_header<W: Write>(
    encoding: PlyEncoding,
    comments: &[String],
    writer: &mut W,
) -> Result<()> {
    let format = match encoding {
        PlyEncoding::Ascii => "ascii",
        PlyEncoding::BinaryLittleEndian => "binary_little_endian",
    };
    writeln!(writer, "ply")?;
    writeln!(writer, "format {format} 1.0")?;
    for comment in comments {
        writeln!(writer, "comment {comment}")?;
    }
    writeln!(writer, "element vertex 0")?;
    for name in property_names(0) {
        writeln!(writer, "property float {name}")?;
    }
    writeln!(writer, "end_header")?;
    Ok(())
}
