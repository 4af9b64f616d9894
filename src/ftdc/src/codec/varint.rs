//! Unsigned LEB128 variable-length integers: 7 payload bits per byte, high
//! bit set on every byte except the last.  Negative deltas are carried as
//! their two's-complement u64 image, so they occupy the full 10 bytes.

/// Largest encoded size of a u64 varint.
pub const MAX_VARINT_LEN64: usize = 10;

pub trait VarInt: Sized {
    /// required_space returns how many bytes encoding `self` takes.
    fn required_space(self) -> usize;

    /// decode_var reads one varint off the front of `src`, returning the
    /// value and the number of bytes consumed, or None if `src` is empty,
    /// truncated mid-varint, or overlong.
    fn decode_var(src: &[u8]) -> Option<(Self, usize)>;

    /// encode_var writes `self` into `dst` and returns the bytes written.
    /// `dst` must hold at least `required_space()` bytes.
    fn encode_var(self, dst: &mut [u8]) -> usize;
}

impl VarInt for u64 {
    fn required_space(self) -> usize {
        let mut v = self;
        let mut n = 1;
        while v >= 0x80 {
            v >>= 7;
            n += 1;
        }
        n
    }

    fn decode_var(src: &[u8]) -> Option<(Self, usize)> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        for (i, byte) in src.iter().enumerate() {
            if i >= MAX_VARINT_LEN64 {
                return None;
            }
            // The 10th byte may only carry the single remaining bit.
            if shift == 63 && *byte > 1 {
                return None;
            }
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Some((value, i + 1));
            }
            shift += 7;
        }
        None
    }

    fn encode_var(self, dst: &mut [u8]) -> usize {
        let mut v = self;
        let mut i = 0;
        while v >= 0x80 {
            dst[i] = (v as u8) | 0x80;
            v >>= 7;
            i += 1;
        }
        dst[i] = v as u8;
        i + 1
    }
}
