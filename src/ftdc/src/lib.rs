//! Decoder for MongoDB's FTDC ("Full Time Diagnostic Capture") file format.
//!
//! An FTDC file is a stream of length-prefixed BSON documents.  Metadata
//! records carry a plain document that is passed through untouched.  Data
//! records carry a zlib-compressed payload holding a reference document plus
//! a delta-compressed matrix of numeric metric samples.  Decoding a data
//! record walks the reference document to fix the metric ordering, expands
//! the run-length/varint delta block into one signed delta stream per metric,
//! and cumulative-sums each stream from its reference value to rebuild the
//! absolute sample series.
//!
//! Per-sample timestamps are interpolated across the chunk's `[t_min, t_max]`
//! span; the format stores no per-sample clock.  See [`series::TimeSeries`].

pub mod chunk;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod file;
pub mod series;

pub use envelope::{EnvelopeReader, Record, RecordKind};
pub use error::{FtdcError, Result};
pub use file::FtdcFile;
pub use series::{Metric, Sample, TimeSeries};
