use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use spz_codec::{
    CoordinateFrame, Header, PLY_FRAME, PackOptions, PlyEncoding, UnpackOptions, compress,
    container::VERSION,
};

#[derive(Parser)]
#[command(
    author,
    version,
    arg_required_else_help = true,
    about = "Convert Gaussian splat scenes between PLY and compressed .spz"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compress a 3DGS ply file. `--from` names the frame of the ply, which
    /// is RDF when left unspecified.
    PlyToSpz {
        input: PathBuf,
        output: PathBuf,
        /// Clear the antialiased flag. Scenes are marked as trained with
        /// antialiasing unless this is given.
        #[arg(long = "no-antialiased", action = clap::ArgAction::SetFalse)]
        antialiased: bool,
        #[clap(flatten)]
        pack: PackOptions,
    },
    /// Expand a .spz file into a ply file. `--to` names the frame of the ply,
    /// which is RDF when left unspecified.
    SpzToPly {
        input: PathBuf,
        output: PathBuf,
        /// Write ascii instead of binary little endian.
        #[arg(long)]
        ascii: bool,
        #[clap(flatten)]
        unpack: UnpackOptions,
    },
    /// Print the header of a .spz file.
    Info { input: PathBuf },
}

fn ply_side(frame: CoordinateFrame) -> CoordinateFrame {
    match frame {
        CoordinateFrame::Unspecified => PLY_FRAME,
        frame => frame,
    }
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::PlyToSpz {
                input,
                output,
                antialiased,
                pack,
            } => ply_to_spz(&input, &output, antialiased, pack),
            Command::SpzToPly {
                input,
                output,
                ascii,
                unpack,
            } => {
                let encoding = if ascii {
                    PlyEncoding::Ascii
                } else {
                    PlyEncoding::BinaryLittleEndian
                };
                spz_to_ply(&input, &output, encoding, unpack)
            }
            Command::Info { input } => {
                println!("{}", describe(&input)?);
                Ok(())
            }
        }
    }
}

pub fn ply_to_spz(
    input: &Path,
    output: &Path,
    antialiased: bool,
    pack: PackOptions,
) -> anyhow::Result<()> {
    // Read the ply untouched, the frame conversion happens once when packing.
    let mut cloud = spz_codec::import_from_ply(input, &UnpackOptions::default())
        .with_context(|| format!("Failed to load {}", input.display()))?;
    cloud.antialiased = antialiased;

    let pack = PackOptions::new(ply_side(pack.from));
    spz_codec::encode_to_file(&cloud, &pack, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let check = spz_codec::decode_from_file(output, &UnpackOptions::default().strict())
        .with_context(|| format!("Failed to read back {}", output.display()))?;
    anyhow::ensure!(
        check.num_points == cloud.num_points
            && check.sh_degree == cloud.sh_degree
            && check.antialiased == antialiased,
        "Verification of {} failed: wrote {} splats, read back {}",
        output.display(),
        cloud.num_points,
        check.num_points
    );

    let ply_size = std::fs::metadata(input)?.len();
    let spz_size = std::fs::metadata(output)?.len();
    log::info!(
        "Converted {} splats (SH degree {}, antialiased: {})",
        cloud.num_points,
        cloud.sh_degree,
        antialiased
    );
    log::info!(
        "{ply_size} bytes -> {spz_size} bytes, compression ratio {:.2}",
        ply_size as f64 / spz_size.max(1) as f64
    );
    Ok(())
}

pub fn spz_to_ply(
    input: &Path,
    output: &Path,
    encoding: PlyEncoding,
    unpack: UnpackOptions,
) -> anyhow::Result<()> {
    let ply_frame = ply_side(unpack.to);
    let cloud = spz_codec::decode_from_file(input, &UnpackOptions {
        to: ply_frame,
        ..unpack
    })
    .with_context(|| format!("Failed to load {}", input.display()))?;

    // Only the standard frame is named in the ply header.
    let pack = if ply_frame == PLY_FRAME {
        PackOptions::new(PLY_FRAME)
    } else {
        PackOptions::default()
    };
    spz_codec::export_to_ply_with(&cloud, &pack, encoding, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!(
        "Wrote {} splats in {ply_frame} to {}",
        cloud.num_points,
        output.display()
    );
    Ok(())
}

/// Header summary of a .spz file, compressed or raw.
pub fn describe(input: &Path) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let container = compress::decompress(&bytes)?;
    let header = Header::parse(&container)?;

    Ok(format!(
        "{}\n  file size:       {} bytes ({})\n  container size:  {} bytes\n  version:         {VERSION}\n  points:          {}\n  sh degree:       {}\n  fractional bits: {}\n  antialiased:     {}",
        input.display(),
        bytes.len(),
        if compress::is_compressed(&bytes) {
            "gzip"
        } else {
            "raw"
        },
        container.len(),
        header.num_points,
        header.sh_degree,
        header.fractional_bits,
        header.antialiased,
    ))
}
