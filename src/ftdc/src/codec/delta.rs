//! Delta matrix codec.
//!
//! The delta block of a chunk is metric-major: all `num_deltas` values for
//! metric 0, then metric 1, and so on.  Each value is an unsigned varint
//! carrying the two's-complement image of a signed 64-bit delta.  A decoded
//! zero is followed by a varint repeat count `r`, standing for `r + 1` zero
//! deltas in total; runs never cross a metric boundary.  Absolute values are
//! rebuilt by cumulative wrapping addition from each metric's reference
//! value, so sample 0 of every row is the reference value itself.

use tracing::trace;

use crate::chunk::Chunk;
use crate::codec::varint::{VarInt, MAX_VARINT_LEN64};
use crate::error::{FtdcError, Result};

/// decode_matrix expands a chunk's delta block against the reference values
/// flattened from its reference document.
///
/// Returns `num_keys` rows of `num_deltas + 1` absolute values; column 0 is
/// the reference value with no delta applied.  Over- or under-production
/// relative to the declared geometry, and any trailing bytes left in the
/// block, are a [`FtdcError::DeltaDecode`].
pub fn decode_matrix(chunk: &Chunk, base_values: &[i64]) -> Result<Vec<Vec<i64>>> {
    let num_keys = chunk.num_keys() as usize;
    let num_deltas = chunk.num_deltas() as usize;

    if base_values.len() != num_keys {
        return Err(FtdcError::DeltaDecode(format!(
            "reference value count: got {}, exp {}",
            base_values.len(),
            num_keys
        )));
    }

    let deltas = decode_deltas(chunk.deltas(), num_keys, num_deltas)?;
    trace!(num_keys, num_deltas, "decoded delta block");

    let mut matrix = Vec::with_capacity(num_keys);
    for (row_deltas, base) in deltas.iter().zip(base_values) {
        let mut row = Vec::with_capacity(num_deltas + 1);
        let mut acc = *base;
        row.push(acc);
        for delta in row_deltas {
            acc = acc.wrapping_add(*delta);
            row.push(acc);
        }
        matrix.push(row);
    }
    Ok(matrix)
}

/// decode_deltas expands the raw block into `num_keys` rows of exactly
/// `num_deltas` signed deltas each.
fn decode_deltas(block: &[u8], num_keys: usize, num_deltas: usize) -> Result<Vec<Vec<i64>>> {
    let mut cursor = 0usize;
    let mut rows = Vec::with_capacity(num_keys);

    for ordinal in 0..num_keys {
        let mut row: Vec<i64> = Vec::with_capacity(num_deltas);
        while row.len() < num_deltas {
            let (raw, n) = u64::decode_var(&block[cursor..]).ok_or_else(|| {
                FtdcError::DeltaDecode(format!(
                    "delta stream truncated in metric {} at byte {}",
                    ordinal, cursor
                ))
            })?;
            cursor += n;

            if raw == 0 {
                let (repeat, n) = u64::decode_var(&block[cursor..]).ok_or_else(|| {
                    FtdcError::DeltaDecode(format!(
                        "zero-run count truncated in metric {} at byte {}",
                        ordinal, cursor
                    ))
                })?;
                cursor += n;

                let remaining = (num_deltas - row.len()) as u64;
                let run = repeat.checked_add(1).ok_or_else(|| {
                    FtdcError::DeltaDecode(format!(
                        "zero-run count overflow in metric {}",
                        ordinal
                    ))
                })?;
                if run > remaining {
                    return Err(FtdcError::DeltaDecode(format!(
                        "zero run overruns metric {}: got {}, exp at most {}",
                        ordinal, run, remaining
                    )));
                }
                for _ in 0..run {
                    row.push(0);
                }
            } else {
                row.push(raw as i64);
            }
        }
        rows.push(row);
    }

    if cursor != block.len() {
        return Err(FtdcError::DeltaDecode(format!(
            "trailing bytes after delta block: consumed {}, exp {}",
            cursor,
            block.len()
        )));
    }
    Ok(rows)
}

/// encode_matrix is the inverse of [`decode_matrix`]: each row holds the
/// absolute values of one metric, column 0 being the reference value (which
/// is not encoded).  Used by tests and fixture writers.
pub fn encode_matrix(matrix: &[Vec<i64>]) -> Vec<u8> {
    let mut block = Vec::new();
    let mut tmp = [0u8; MAX_VARINT_LEN64];

    for row in matrix {
        let mut zeros: u64 = 0;
        for window in row.windows(2) {
            let delta = window[1].wrapping_sub(window[0]);
            if delta == 0 {
                zeros += 1;
                continue;
            }
            flush_zeros(&mut block, &mut zeros, &mut tmp);
            let n = (delta as u64).encode_var(&mut tmp);
            block.extend_from_slice(&tmp[..n]);
        }
        // Runs never cross a metric boundary.
        flush_zeros(&mut block, &mut zeros, &mut tmp);
    }
    block
}

fn flush_zeros(block: &mut Vec<u8>, zeros: &mut u64, tmp: &mut [u8; MAX_VARINT_LEN64]) {
    if *zeros == 0 {
        return;
    }
    block.push(0);
    let n = (*zeros - 1).encode_var(&mut tmp[..]);
    block.extend_from_slice(&tmp[..n]);
    *zeros = 0;
}
