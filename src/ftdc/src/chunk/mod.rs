pub mod decompress;
pub mod flatten;

use std::io::Cursor;

use bson::{Bson, Document};
use bytes::Bytes;

use crate::error::{FtdcError, Result};

/// One decompressed data record: a reference document plus the raw
/// delta-compressed matrix covering the chunk's `[t_min, t_max]` span.
///
/// A chunk never mutates after construction; decoding it is a pure function
/// of the compressed blob it came from.  The metric ordering implied by
/// `reference_doc` is fixed per chunk and must not be reused across chunks.
#[derive(Debug, Clone)]
pub struct Chunk {
    t_min: i64,
    t_max: i64,
    reference_doc: Document,
    num_keys: i32,
    num_deltas: i32,
    deltas: Bytes,
}

impl Chunk {
    /// parse interprets an inflated chunk payload.
    pub fn parse(buffer: &[u8]) -> Result<Chunk> {
        let doc = Document::from_reader(&mut Cursor::new(buffer))
            .map_err(|e| FtdcError::MalformedChunk(format!("invalid payload document: {}", e)))?;

        let reference_doc = doc
            .get_document("refDoc")
            .map_err(|e| FtdcError::MalformedChunk(format!("refDoc: {}", e)))?
            .clone();
        let t_min = get_time(&doc, "tMin")?;
        let t_max = get_time(&doc, "tMax")?;
        let num_keys = get_count(&doc, "numKeys")?;
        let num_deltas = get_count(&doc, "numDeltas")?;
        let deltas = doc
            .get_binary_generic("deltas")
            .map_err(|e| FtdcError::MalformedChunk(format!("deltas: {}", e)))?;

        Ok(Chunk {
            t_min,
            t_max,
            reference_doc,
            num_keys,
            num_deltas,
            deltas: Bytes::copy_from_slice(deltas),
        })
    }

    pub fn t_min(&self) -> i64 {
        self.t_min
    }

    pub fn t_max(&self) -> i64 {
        self.t_max
    }

    pub fn reference_doc(&self) -> &Document {
        &self.reference_doc
    }

    pub fn num_keys(&self) -> i32 {
        self.num_keys
    }

    pub fn num_deltas(&self) -> i32 {
        self.num_deltas
    }

    pub fn deltas(&self) -> &[u8] {
        &self.deltas
    }
}

/// Chunk time bounds are written either as int64 epoch millis or as a bson
/// datetime, depending on the producer.
fn get_time(doc: &Document, key: &str) -> Result<i64> {
    match doc.get(key) {
        Some(Bson::Int64(v)) => Ok(*v),
        Some(Bson::DateTime(dt)) => Ok(dt.timestamp_millis()),
        Some(other) => Err(FtdcError::MalformedChunk(format!(
            "{}: got {:?}, exp int64 or datetime",
            key,
            other.element_type()
        ))),
        None => Err(FtdcError::MalformedChunk(format!("{}: missing field", key))),
    }
}

fn get_count(doc: &Document, key: &str) -> Result<i32> {
    let v = doc
        .get_i32(key)
        .map_err(|e| FtdcError::MalformedChunk(format!("{}: {}", key, e)))?;
    if v < 0 {
        return Err(FtdcError::MalformedChunk(format!(
            "{}: got {}, exp non-negative",
            key, v
        )));
    }
    Ok(v)
}

#[cfg(test)]
pub(crate) mod test_util {
    use bson::{doc, Document};

    /// Build a serialized chunk payload document around the given pieces.
    pub(crate) fn payload(
        reference_doc: Document,
        t_min: i64,
        t_max: i64,
        num_keys: i32,
        num_deltas: i32,
        deltas: Vec<u8>,
    ) -> Vec<u8> {
        let doc = doc! {
            "refDoc": reference_doc,
            "tMin": t_min,
            "tMax": t_max,
            "numKeys": num_keys,
            "numDeltas": num_deltas,
            "deltas": bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: deltas,
            },
        };
        bson::to_vec(&doc).unwrap()
    }
}
