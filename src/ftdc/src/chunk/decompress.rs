use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;

use crate::error::{FtdcError, Result};

/// Byte length of the little-endian uncompressed-size prefix.
const LENGTH_PREFIX_SIZE: usize = 4;

/// The prefix is untrusted input; never preallocate more than this.
const PREALLOC_LIMIT: usize = 1 << 24;

/// decompress inflates a data record's payload.
///
/// The blob's first 4 bytes (little-endian) declare the uncompressed length;
/// the remainder is a zlib-wrapped DEFLATE stream.  An inflater failure or a
/// produced length that differs from the declared one is a
/// [`FtdcError::Decompression`].  Pure, no side effects beyond allocation.
pub fn decompress(blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < LENGTH_PREFIX_SIZE {
        return Err(FtdcError::Decompression(format!(
            "compressed blob too short: got {}, exp at least {}",
            blob.len(),
            LENGTH_PREFIX_SIZE
        )));
    }

    let declared = LittleEndian::read_u32(&blob[..LENGTH_PREFIX_SIZE]) as usize;

    let mut out = Vec::with_capacity(declared.min(PREALLOC_LIMIT));
    let mut decoder = ZlibDecoder::new(&blob[LENGTH_PREFIX_SIZE..]);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FtdcError::Decompression(format!("inflate: {}", e)))?;

    if out.len() != declared {
        return Err(FtdcError::Decompression(format!(
            "uncompressed length mismatch: got {}, exp {}",
            out.len(),
            declared
        )));
    }

    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    /// Deflate `raw` and prepend the little-endian uncompressed-length
    /// prefix, producing a well-formed data record payload.
    pub(crate) fn compress(raw: &[u8]) -> Vec<u8> {
        let mut blob = (raw.len() as u32).to_le_bytes().to_vec();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        blob.extend_from_slice(&encoder.finish().unwrap());
        blob
    }
}
