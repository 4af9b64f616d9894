pub mod delta;
pub mod varint;
