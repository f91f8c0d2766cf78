use std::path::PathBuf;

/// Broad category of an [`SfmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file could not be opened, read or written.
    Io,
    /// The bytes do not follow the expected file format.
    Format,
    /// The file parsed but its content contradicts itself or its side files.
    Consistency,
}

/// An error type for reading, writing and manipulating reconstructions.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SfmError {
    /// Failed to open, read or write a file.
    #[error("Failed to manipulate the file {path}. {source}")]
    FileError {
        /// The offending path.
        path: PathBuf,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with the expected signature.
    #[error("Bad signature, expected {expected:?}. Got: {found:?}")]
    BadSignature {
        /// The signature we were looking for.
        expected: &'static str,
        /// The first bytes of the input, lossily decoded.
        found: String,
    },

    /// The bundle file has a version other than 0.3.
    #[error("Unsupported bundle file version {0}")]
    UnsupportedVersion(String),

    /// A patch record starts with a tag other than PATCHS or PATCHPS.
    #[error("Cannot handle patch of type {0}")]
    UnknownPatchTag(String),

    /// A PMVS camera file does not start with CONTOUR.
    #[error("Not a PMVS camera file: {path}. Header: {header:?}")]
    BadCameraHeader {
        /// The camera file.
        path: PathBuf,
        /// The header that was found instead.
        header: String,
    },

    /// A token could not be converted to the expected value.
    #[error("Parse error while reading {what}: {token:?}")]
    ParseError {
        /// What was being parsed.
        what: String,
        /// The offending token.
        token: String,
    },

    /// A similarity transform is not a scaled rotation.
    #[error("Bad transform: {0}")]
    BadTransform(String),

    /// The input ended before all declared records were read.
    #[error("Expected {declared} {what} but the input ends after {parsed}")]
    TruncatedRecords {
        /// Kind of record.
        what: &'static str,
        /// Count declared in the header.
        declared: usize,
        /// Records fully parsed before the input ran out.
        parsed: usize,
    },

    /// The input holds more data than the header declared.
    #[error("Found data after the {declared} declared {what}: {token:?}")]
    TrailingData {
        /// Kind of record.
        what: &'static str,
        /// Count declared in the header.
        declared: usize,
        /// First unexpected token.
        token: String,
    },

    /// A camera index points outside the camera array.
    #[error("Camera index {camera} out of range in {context} (number of cameras is {n_cameras})")]
    CameraIndexOutOfRange {
        /// Where the index was found, e.g. `point 12`.
        context: String,
        /// The offending index.
        camera: i64,
        /// Size of the target camera array.
        n_cameras: usize,
    },

    /// The list file does not have one line per camera.
    #[error("Bad list file {path}: {n_lines} filenames for {n_cameras} cameras")]
    ListFileLength {
        /// The list file.
        path: PathBuf,
        /// Number of filenames found.
        n_lines: usize,
        /// Number of cameras in the reconstruction.
        n_cameras: usize,
    },

    /// The options file uses features this crate does not support.
    #[error("Unsupported options file: {0}")]
    UnsupportedOptions(String),

    /// Camera indices were already rewritten through the options file.
    #[error("Patch camera indices were already remapped")]
    AlreadyRemapped,

    /// Two patch sets live in different camera index spaces.
    #[error("Cannot combine patch sets with different camera indexing ({0:?} vs {1:?})")]
    IndexingMismatch(crate::pmvs::CameraIndexing, crate::pmvs::CameraIndexing),

    /// Reconstructions that should share points do not.
    #[error("Reconstructions do not have the same number of points ({expected} vs {found})")]
    PointCountMismatch {
        /// Points in the first reconstruction.
        expected: usize,
        /// Points in the offending reconstruction.
        found: usize,
    },

    /// An operation needs image filenames but no list file was loaded.
    #[error("No image filenames loaded for a reconstruction with {0} cameras")]
    MissingImageList(usize),
}

impl SfmError {
    /// Wrap an io error with the path that produced it.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SfmError::FileError {
            path: path.into(),
            source,
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SfmError::FileError { .. } => ErrorKind::Io,
            SfmError::BadSignature { .. }
            | SfmError::UnsupportedVersion(_)
            | SfmError::UnknownPatchTag(_)
            | SfmError::BadCameraHeader { .. }
            | SfmError::ParseError { .. }
            | SfmError::BadTransform(_) => ErrorKind::Format,
            SfmError::TruncatedRecords { .. }
            | SfmError::TrailingData { .. }
            | SfmError::CameraIndexOutOfRange { .. }
            | SfmError::ListFileLength { .. }
            | SfmError::UnsupportedOptions(_)
            | SfmError::AlreadyRemapped
            | SfmError::IndexingMismatch(..)
            | SfmError::PointCountMismatch { .. }
            | SfmError::MissingImageList(_) => ErrorKind::Consistency,
        }
    }
}
