use tracing::debug;

use crate::chunk::flatten::flatten;
use crate::chunk::Chunk;
use crate::codec::delta::decode_matrix;
use crate::error::{FtdcError, Result};

/// A numeric leaf of a chunk's reference document, identified by its dotted
/// path and its position in flattening order.  Ordinals index both the
/// reference values and the delta matrix rows, and are only meaningful
/// within the chunk they were derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub path: String,
    pub ordinal: usize,
}

/// One decoded sample: `values[ordinal]` is the absolute value of the
/// metric with that ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Epoch millis, interpolated (see [`TimeSeries`]).
    pub timestamp: i64,
    pub values: Vec<i64>,
}

/// The fully decoded form of one data chunk.
///
/// Sample timestamps are linearly interpolated across the chunk's
/// `[t_min, t_max]` bounds: the format stores no per-sample clock, so these
/// are approximations, not measured values.  Sample 0 carries the reference
/// document's values exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeries {
    pub metrics: Vec<Metric>,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// metric looks an ordinal up by dotted path.
    pub fn metric(&self, path: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.path == path)
    }

    /// values_for returns one metric's full series in sample order.
    pub fn values_for(&self, path: &str) -> Option<Vec<i64>> {
        let ordinal = self.metric(path)?.ordinal;
        Some(self.samples.iter().map(|s| s.values[ordinal]).collect())
    }
}

/// decode_chunk runs flatten -> delta decode -> assemble for one chunk.
///
/// The flattened leaf count must equal the chunk's declared `num_keys`;
/// a difference is a [`FtdcError::SchemaMismatch`].
pub fn decode_chunk(chunk: &Chunk) -> Result<TimeSeries> {
    let flattened = flatten(chunk.reference_doc());
    if flattened.len() != chunk.num_keys() as usize {
        return Err(FtdcError::SchemaMismatch(format!(
            "flattened metric count: got {}, exp {}",
            flattened.len(),
            chunk.num_keys()
        )));
    }

    let base_values: Vec<i64> = flattened.iter().map(|m| m.value).collect();
    let matrix = decode_matrix(chunk, &base_values)?;

    let metrics = flattened
        .into_iter()
        .enumerate()
        .map(|(ordinal, m)| Metric {
            path: m.path,
            ordinal,
        })
        .collect();

    let series = assemble(chunk, metrics, matrix);
    debug!(
        metrics = series.metrics.len(),
        samples = series.samples.len(),
        "decoded chunk"
    );
    Ok(series)
}

/// assemble combines a decoded matrix with the chunk's time span, producing
/// `num_deltas + 1` samples (index 0 = reference row).
fn assemble(chunk: &Chunk, metrics: Vec<Metric>, matrix: Vec<Vec<i64>>) -> TimeSeries {
    let num_samples = chunk.num_deltas() as usize + 1;
    let mut samples = Vec::with_capacity(num_samples);
    for index in 0..num_samples {
        let values = matrix.iter().map(|row| row[index]).collect();
        samples.push(Sample {
            timestamp: sample_timestamp(chunk, index),
            values,
        });
    }
    TimeSeries { metrics, samples }
}

/// Linear interpolation of sample `index` across `[t_min, t_max]` with
/// `index / num_deltas` as the fraction.  A chunk with no deltas has a
/// single sample pinned at `t_min`.
fn sample_timestamp(chunk: &Chunk, index: usize) -> i64 {
    if chunk.num_deltas() == 0 {
        return chunk.t_min();
    }
    // Widen before subtracting; the bounds are untrusted i64s and their
    // span can exceed i64::MAX.
    let span = chunk.t_max() as i128 - chunk.t_min() as i128;
    let offset = span * index as i128 / chunk.num_deltas() as i128;
    (chunk.t_min() as i128 + offset) as i64
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::chunk::test_util::payload;
    use crate::codec::delta::encode_matrix;

    fn parse_chunk(
        reference_doc: bson::Document,
        t_min: i64,
        t_max: i64,
        num_keys: i32,
        num_deltas: i32,
        block: Vec<u8>,
    ) -> Chunk {
        let buffer = payload(reference_doc, t_min, t_max, num_keys, num_deltas, block);
        Chunk::parse(&buffer).unwrap()
    }

    #[test]
    fn test_decode_chunk_two_deltas() {
        // Reference v=3, deltas [+2, -1] => series [3, 5, 4].
        let block = encode_matrix(&[vec![3, 5, 4]]);
        let chunk = parse_chunk(doc! { "v": 3_i64 }, 1000, 3000, 1, 2, block);

        let series = decode_chunk(&chunk).unwrap();
        assert_eq!(series.values_for("v").unwrap(), vec![3, 5, 4]);
        let timestamps: Vec<i64> = series.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_decode_chunk_skips_non_numeric_leaves() {
        let reference = doc! { "host": "a", "v": 3_i64, "w": 10_i64 };
        let block = encode_matrix(&[vec![3, 4], vec![10, 10]]);
        let chunk = parse_chunk(reference, 0, 1000, 2, 1, block);

        let series = decode_chunk(&chunk).unwrap();
        assert_eq!(series.metric("v").unwrap().ordinal, 0);
        assert_eq!(series.metric("w").unwrap().ordinal, 1);
        assert!(series.metric("host").is_none());
        assert_eq!(series.values_for("w").unwrap(), vec![10, 10]);
    }

    #[test]
    fn test_decode_chunk_schema_mismatch() {
        // Declares two keys, reference document flattens to one.
        let chunk = parse_chunk(doc! { "v": 3_i64 }, 0, 1000, 2, 0, vec![]);
        let err = decode_chunk(&chunk).unwrap_err();
        assert!(matches!(err, FtdcError::SchemaMismatch(_)), "got {:?}", err);
    }

    #[test]
    fn test_extreme_time_bounds_do_not_overflow() {
        // A hostile chunk may declare any int64 bounds; the span itself
        // overflows i64 here.
        let block = encode_matrix(&[vec![0, 1]]);
        let chunk = parse_chunk(doc! { "v": 0_i64 }, i64::MIN, i64::MAX, 1, 1, block);

        let series = decode_chunk(&chunk).unwrap();
        let timestamps: Vec<i64> = series.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![i64::MIN, i64::MAX]);
    }

    #[test]
    fn test_single_sample_chunk_pinned_at_t_min() {
        let chunk = parse_chunk(doc! { "v": 3_i64 }, 750, 9000, 1, 0, vec![]);
        let series = decode_chunk(&chunk).unwrap();
        assert_eq!(series.samples.len(), 1);
        assert_eq!(series.samples[0].timestamp, 750);
        assert_eq!(series.samples[0].values, vec![3]);
    }
}
