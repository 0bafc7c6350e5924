use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::frame::CoordinateFrame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct PackOptions {
    /// Coordinate frame the input scene is expressed in. Unspecified stores
    /// it as is.
    #[arg(long = "from", help_heading = "Pack Options", default_value = "unspecified")]
    pub from: CoordinateFrame,
}

impl PackOptions {
    pub fn new(from: CoordinateFrame) -> Self {
        Self { from }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct UnpackOptions {
    /// Coordinate frame to return the scene in. Unspecified returns the
    /// stored data untouched.
    #[arg(long = "to", help_heading = "Unpack Options", default_value = "unspecified")]
    pub to: CoordinateFrame,
    /// Reject containers with trailing bytes after the last section.
    #[arg(long, help_heading = "Unpack Options")]
    #[serde(default)]
    pub strict: bool,
}

impl UnpackOptions {
    pub fn new(to: CoordinateFrame) -> Self {
        Self { to, strict: false }
    }

    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

#[derive(
    Default, ValueEnum, Clone, Copy, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PlyEncoding {
    Ascii,
    #[default]
    BinaryLittleEndian,
}
