use std::io::Cursor;
use std::sync::Arc;

use bson::Document;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::OnceCell;

use crate::error::{FtdcError, Result};
use crate::series::TimeSeries;

/// Smallest representable BSON document: i32 length + terminating NUL.
const MIN_DOCUMENT_LEN: usize = 5;

/// The frame length is untrusted input; never preallocate more than this.
const PREALLOC_LIMIT: usize = 1 << 24;

/// RecordKind classifies an envelope document by its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `type != 1`: a plain document passed through to consumers unmodified.
    Metadata,
    /// `type == 1`: a compressed metric chunk.
    Data,
}

/// One framed document read off an FTDC stream.
///
/// Exactly one of `doc`/`data` is populated, determined by `kind`.  Records
/// are immutable once parsed; the decoded form of a data record is memoized
/// on first request (see [`Record::time_series`]).
#[derive(Debug)]
pub struct Record {
    id: DateTime<Utc>,
    kind: RecordKind,
    doc: Option<Document>,
    data: Option<Bytes>,
    pub(crate) series: OnceCell<std::result::Result<Arc<TimeSeries>, Arc<FtdcError>>>,
}

impl Record {
    pub(crate) fn from_document(doc: Document) -> Result<Record> {
        let id = record_id(&doc)?;
        let typ = doc
            .get_i32("type")
            .map_err(|e| FtdcError::Framing(format!("record type: {}", e)))?;

        if typ == 1 {
            let data = doc
                .get_binary_generic("data")
                .map_err(|e| FtdcError::Framing(format!("record data: {}", e)))?;
            Ok(Record {
                id,
                kind: RecordKind::Data,
                doc: None,
                data: Some(Bytes::copy_from_slice(data)),
                series: OnceCell::new(),
            })
        } else {
            let inner = doc
                .get_document("doc")
                .map_err(|e| FtdcError::Framing(format!("record doc: {}", e)))?;
            Ok(Record {
                id,
                kind: RecordKind::Metadata,
                doc: Some(inner.clone()),
                data: None,
                series: OnceCell::new(),
            })
        }
    }

    pub fn id(&self) -> DateTime<Utc> {
        self.id
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// doc returns the metadata document, None for data records.
    pub fn doc(&self) -> Option<&Document> {
        self.doc.as_ref()
    }

    /// data returns the compressed payload, None for metadata records.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }
}

/// Record ids are written either as a bson datetime or as int64 epoch
/// millis, depending on the producer.
fn record_id(doc: &Document) -> Result<DateTime<Utc>> {
    match doc.get("_id") {
        Some(bson::Bson::DateTime(dt)) => Ok(dt.to_chrono()),
        Some(bson::Bson::Int64(millis)) => Ok(bson::DateTime::from_millis(*millis).to_chrono()),
        Some(other) => Err(FtdcError::Framing(format!(
            "record _id: got {:?}, exp datetime or int64",
            other.element_type()
        ))),
        None => Err(FtdcError::Framing("record _id: missing field".to_string())),
    }
}

/// EnvelopeReader reads sequential framed documents off a byte stream.
///
/// Each call to [`next`](EnvelopeReader::next) consumes exactly one
/// self-framed document: a 4-byte little-endian total length (counting
/// itself) followed by the document body.  No buffering beyond the current
/// document is kept, so a caller may wrap each call in its own timeout;
/// records returned before a cancellation remain valid as an ordered prefix
/// of the stream.
pub struct EnvelopeReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> EnvelopeReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// next reads one record, or None at a clean end-of-stream.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.reader.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FtdcError::Framing(format!(
                    "stream ended inside length prefix: got {} bytes, exp 4",
                    filled
                )));
            }
            filled += n;
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len < MIN_DOCUMENT_LEN {
            return Err(FtdcError::Framing(format!(
                "document length {} below minimum {}",
                len, MIN_DOCUMENT_LEN
            )));
        }

        let mut frame = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        frame.extend_from_slice(&len_buf);
        (&mut self.reader)
            .take((len - len_buf.len()) as u64)
            .read_to_end(&mut frame)
            .await?;
        if frame.len() != len {
            return Err(FtdcError::Framing(format!(
                "stream ended mid-document: got {}, exp {} byte frame",
                frame.len(),
                len
            )));
        }

        let doc = Document::from_reader(&mut Cursor::new(frame.as_slice()))
            .map_err(|e| FtdcError::Framing(format!("invalid bson document: {}", e)))?;

        Record::from_document(doc).map(Some)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn frame(doc: &Document) -> Vec<u8> {
        bson::to_vec(doc).unwrap()
    }

    fn record_doc(millis: i64, typ: i32) -> Document {
        if typ == 1 {
            doc! {
                "_id": bson::DateTime::from_millis(millis),
                "type": typ,
                "data": bson::Binary { subtype: bson::spec::BinarySubtype::Generic, bytes: vec![1, 2, 3] },
            }
        } else {
            doc! {
                "_id": bson::DateTime::from_millis(millis),
                "type": typ,
                "doc": { "host": "a" },
            }
        }
    }

    #[tokio::test]
    async fn test_reads_consecutive_records() {
        let mut stream = frame(&record_doc(1000, 0));
        stream.extend_from_slice(&frame(&record_doc(2000, 1)));

        let mut reader = EnvelopeReader::new(stream.as_slice());

        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first.kind(), RecordKind::Metadata);
        assert_eq!(first.id().timestamp_millis(), 1000);
        assert_eq!(first.doc().unwrap().get_str("host").unwrap(), "a");
        assert!(first.data().is_none());

        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(second.kind(), RecordKind::Data);
        assert_eq!(second.data().unwrap().as_ref(), &[1, 2, 3]);
        assert!(second.doc().is_none());

        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_type_is_metadata() {
        let extra = doc! {
            "_id": bson::DateTime::from_millis(3000),
            "type": 2,
            "doc": { "kernel": "6.1" },
        };
        let stream = frame(&extra);
        let mut reader = EnvelopeReader::new(stream.as_slice());
        let record = reader.next().await.unwrap().unwrap();
        assert_eq!(record.kind(), RecordKind::Metadata);
    }

    #[tokio::test]
    async fn test_truncated_document_is_framing_error() {
        let mut stream = frame(&record_doc(1000, 0));
        let second = frame(&record_doc(2000, 0));
        stream.extend_from_slice(&second[..second.len() / 2]);

        let mut reader = EnvelopeReader::new(stream.as_slice());
        // The intact first record is still yielded before the corruption.
        assert!(reader.next().await.unwrap().is_some());

        let err = reader.next().await.unwrap_err();
        assert!(matches!(err, FtdcError::Framing(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_short_length_prefix_is_framing_error() {
        let stream: Vec<u8> = vec![3, 0, 0, 0, 0];
        let mut reader = EnvelopeReader::new(stream.as_slice());
        let err = reader.next().await.unwrap_err();
        assert!(matches!(err, FtdcError::Framing(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_huge_length_prefix_is_framing_error() {
        // A frame claiming ~4 GiB with almost no bytes behind it must fail
        // cleanly instead of sizing a buffer off the untrusted prefix.
        let stream: Vec<u8> = vec![0xf0, 0xff, 0xff, 0xff, 0, 0, 0];
        let mut reader = EnvelopeReader::new(stream.as_slice());
        let err = reader.next().await.unwrap_err();
        assert!(matches!(err, FtdcError::Framing(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_int64_id_is_accepted() {
        let outer = doc! { "_id": 4500_i64, "type": 0, "doc": { "host": "a" } };
        let stream = frame(&outer);
        let mut reader = EnvelopeReader::new(stream.as_slice());
        let record = reader.next().await.unwrap().unwrap();
        assert_eq!(record.id().timestamp_millis(), 4500);
    }

    #[tokio::test]
    async fn test_missing_id_is_framing_error() {
        let bad = doc! { "type": 0, "doc": {} };
        let stream = frame(&bad);
        let mut reader = EnvelopeReader::new(stream.as_slice());
        let err = reader.next().await.unwrap_err();
        assert!(matches!(err, FtdcError::Framing(_)), "got {:?}", err);
    }
}
