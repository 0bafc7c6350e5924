pub mod compress;
pub mod config;
pub mod container;
pub mod error;
pub mod frame;
pub mod ply;
pub mod quant;
pub mod scene;

#[cfg(test)]
mod tests;

use std::path::Path;

pub use config::{PackOptions, PlyEncoding, UnpackOptions};
pub use container::{Header, PackedGaussians};
pub use error::{ErrorKind, Result, SpzError};
pub use frame::{CoordinateFrame, FrameTransform, PLY_FRAME, STORAGE_FRAME, transform};
pub use ply::{read_ply, write_ply};
pub use scene::{GaussianCloud, inverse_sigmoid, rgb_to_sh, sh_to_rgb, sigmoid};

/// Quantizes `cloud` into a gzipped container.
pub fn encode_to_bytes(cloud: &GaussianCloud, options: &PackOptions) -> Result<Vec<u8>> {
    let _span = tracing::trace_span!("encode_to_bytes").entered();

    cloud.validate()?;

    let to_storage = transform(options.from, STORAGE_FRAME);
    let packed = if to_storage.is_identity() {
        PackedGaussians::pack(cloud)?
    } else {
        let mut stored = cloud.clone();
        to_storage.apply(&mut stored);
        PackedGaussians::pack(&stored)?
    };

    let container = packed.to_bytes();
    let bytes = compress::compress(&container)?;

    log::debug!(
        "Encoded {} splats: {} byte container, {} bytes compressed",
        cloud.num_points,
        container.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Decodes gzipped or raw container bytes.
pub fn decode_from_bytes(bytes: &[u8], options: &UnpackOptions) -> Result<GaussianCloud> {
    let _span = tracing::trace_span!("decode_from_bytes").entered();

    let container = compress::decompress(bytes)?;
    let packed = PackedGaussians::from_bytes(&container, options.strict)?;

    let mut cloud = packed.unpack();
    transform(STORAGE_FRAME, options.to).apply(&mut cloud);

    if let Some(center) = container::bounds_center(&cloud) {
        log::debug!(
            "Decoded {} splats, SH degree {}, centred at {center}",
            cloud.num_points,
            cloud.sh_degree
        );
    }
    Ok(cloud)
}

pub fn encode_to_file(
    cloud: &GaussianCloud,
    options: &PackOptions,
    path: impl AsRef<Path>,
) -> Result<()> {
    let bytes = encode_to_bytes(cloud, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn decode_from_file(path: impl AsRef<Path>, options: &UnpackOptions) -> Result<GaussianCloud> {
    let bytes = std::fs::read(path)?;
    decode_from_bytes(&bytes, options)
}

/// Writes `cloud` as a binary little endian PLY file.
pub fn export_to_ply(
    cloud: &GaussianCloud,
    options: &PackOptions,
    path: impl AsRef<Path>,
) -> Result<()> {
    export_to_ply_with(cloud, options, PlyEncoding::BinaryLittleEndian, path)
}

pub fn export_to_ply_with(
    cloud: &GaussianCloud,
    options: &PackOptions,
    encoding: PlyEncoding,
    path: impl AsRef<Path>,
) -> Result<()> {
    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_ply(cloud, options, encoding, &mut writer)?;
    std::io::Write::flush(&mut writer)?;
    Ok(())
}

pub fn import_from_ply(path: impl AsRef<Path>, options: &UnpackOptions) -> Result<GaussianCloud> {
    let file = std::fs::File::open(path)?;
    read_ply(std::io::BufReader::new(file), options)
}
