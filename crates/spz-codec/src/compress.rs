use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Result, SpzError};

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Gzips a container. Output is always compressed.
pub fn compress(container: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(container.len() / 2),
        Compression::default(),
    );
    encoder.write_all(container)?;
    Ok(encoder.finish()?)
}

/// Strips gzip if present, otherwise hands the bytes back as a raw container.
///
/// A gzip stream that fails to inflate or whose CRC does not match is
/// corrupt, never a raw container.
pub fn decompress(bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    if !is_compressed(bytes) {
        return Ok(Cow::Borrowed(bytes));
    }

    let mut container = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes)
        .read_to_end(&mut container)
        .map_err(|err| SpzError::corrupt(format!("gzip stream is damaged: {err}")))?;
    Ok(Cow::Owned(container))
}
