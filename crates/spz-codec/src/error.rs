use thiserror::Error;

/// Everything that can go wrong while packing or unpacking a splat scene.
///
/// Quantization loss is never reported here, it is the expected behaviour of
/// the codec.
#[derive(Debug, Error)]
pub enum SpzError {
    #[error("Invalid coordinate frame: {0}")]
    InvalidCoordinateFrame(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("Missing ply property `{0}`")]
    MissingProperty(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error while reading or writing splat file.")]
    Io(#[from] std::io::Error),
}

/// Fieldless mirror of [`SpzError`], handy for matching in callers and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCoordinateFrame,
    UnsupportedFormat,
    CorruptData,
    MissingProperty,
    InvalidArgument,
    Io,
}

impl SpzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCoordinateFrame(_) => ErrorKind::InvalidCoordinateFrame,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::CorruptData(_) => ErrorKind::CorruptData,
            Self::MissingProperty(_) => ErrorKind::MissingProperty,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        Self::CorruptData(detail.into())
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }
}

pub type Result<T, E = SpzError> = std::result::Result<T, E>;
