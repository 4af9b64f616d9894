use thiserror::Error;

/// Errors raised while reading and decoding an FTDC stream.
///
/// `Open` and `Framing` are fatal: once the envelope cursor is not
/// trustworthy the remainder of the stream cannot be read.  The per-chunk
/// variants (`Decompression`, `MalformedChunk`, `SchemaMismatch`,
/// `DeltaDecode`) are recoverable: the failing chunk is reported and
/// skipped, the rest of the file stays readable.
#[derive(Debug, Error)]
pub enum FtdcError {
    #[error("cannot open ftdc stream: {0}")]
    Open(String),

    #[error("corrupt envelope: {0}")]
    Framing(String),

    #[error("chunk decompression failed: {0}")]
    Decompression(String),

    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("delta decode failed: {0}")]
    DeltaDecode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FtdcError {
    /// recoverable returns true for failures scoped to a single chunk.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            FtdcError::Decompression(_)
                | FtdcError::MalformedChunk(_)
                | FtdcError::SchemaMismatch(_)
                | FtdcError::DeltaDecode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FtdcError>;
