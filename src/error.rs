use std::fmt;

use thiserror::Error;

/// Which feature bitset an unsupported bit was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSet {
    Compat,
    Incompat,
    RoCompat,
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSet::Compat => write!(f, "compat"),
            FeatureSet::Incompat => write!(f, "incompat"),
            FeatureSet::RoCompat => write!(f, "ro_compat"),
        }
    }
}

/// Error taxonomy for the decoder, following the teacher's `IoErr`/`GptErr`
/// shape (one `thiserror` enum, `#[from]` for I/O) generalized to the
/// on-disk ext2/3/4 decode surface.
#[derive(Debug, Error)]
pub enum Error {
    #[error("superblock signature is not 0x53EF")]
    InvalidSignature,

    #[error("unsupported {set} feature bit {bit:#x}")]
    UnsupportedFeature { set: FeatureSet, bit: u32 },

    #[error("corrupt {0}")]
    Corrupt(&'static str),

    #[error("path component not found")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("not a regular file")]
    NotRegular,

    #[error("not a symbolic link")]
    NotASymlink,

    #[error("symlink hop limit exceeded")]
    SymlinkLoop,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation aborted")]
    Aborted,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
