use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic: 0x{0:08x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index {0}")]
    InvalidConstantIndex(u16),
    #[error("unsupported constant pool tag {0}")]
    UnsupportedConstant(u8),
    #[error("constant pool entry {index}: expected {expected}")]
    ConstantTypeMismatch { index: u16, expected: &'static str },
    #[error("invalid modified UTF-8 in constant pool")]
    InvalidModifiedUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed descriptor `{descriptor}`: {reason}")]
pub struct DescriptorError {
    pub descriptor: String,
    pub reason: &'static str,
}

impl DescriptorError {
    pub(crate) fn new(descriptor: &str, reason: &'static str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip error reading {}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("member {owner}.{name}{descriptor} not found")]
    MemberNotFound {
        owner: String,
        name: String,
        descriptor: String,
    },
    #[error("class hierarchy cycle detected at {0}")]
    Cycle(String),
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to read deprecation database {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON deprecation database {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}:{line}: {reason}", .path.display())]
    Csv {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
}
