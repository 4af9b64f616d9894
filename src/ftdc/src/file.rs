use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, BufReader};
use tracing::{debug, warn};

use crate::chunk::decompress::decompress;
use crate::chunk::Chunk;
use crate::envelope::{EnvelopeReader, Record, RecordKind};
use crate::error::{FtdcError, Result};
use crate::series::{decode_chunk, TimeSeries};

/// An FTDC capture file: the ordered record sequence plus the observed
/// metrics time span.
///
/// The envelope is scanned eagerly (the stream cursor is shared mutable
/// state, so scanning is sequential); chunk decompression and delta decoding
/// are deferred until a record's series is first requested and memoized per
/// record from then on.  Distinct records decode independently, see
/// [`FtdcFile::decode_all`].
#[derive(Debug)]
pub struct FtdcFile {
    records: Vec<Record>,
    metrics_start: DateTime<Utc>,
    metrics_end: DateTime<Utc>,
}

impl FtdcFile {
    /// open reads a capture file from disk.
    ///
    /// A missing path, a non-file, or an empty file is an
    /// [`FtdcError::Open`]; no other error kind escapes from here before
    /// envelope scanning starts.
    pub async fn open(path: impl AsRef<Path>) -> Result<FtdcFile> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| FtdcError::Open(format!("cannot load {}: {}", path.display(), e)))?;
        if !meta.is_file() {
            return Err(FtdcError::Open(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if meta.len() == 0 {
            return Err(FtdcError::Open(format!("{} is empty", path.display())));
        }

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FtdcError::Open(format!("cannot load {}: {}", path.display(), e)))?;
        Self::read_from(BufReader::new(file)).await
    }

    /// read_from scans an already-open byte stream to end-of-stream.
    ///
    /// Callers that need cancellation at single-record granularity (keeping
    /// the already-parsed prefix) drive [`EnvelopeReader`] directly instead.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: R) -> Result<FtdcFile> {
        let mut envelope = EnvelopeReader::new(reader);
        let mut records = Vec::new();
        while let Some(record) = envelope.next().await? {
            records.push(record);
        }

        // Both record kinds carry an id; the span covers them all.
        let mut ids = records.iter().map(Record::id);
        let first = ids
            .next()
            .ok_or_else(|| FtdcError::Open("stream contains no records".to_string()))?;
        let (metrics_start, metrics_end) = ids.fold((first, first), |(start, end), id| {
            (start.min(id), end.max(id))
        });

        debug!(records = records.len(), "scanned ftdc stream");
        Ok(FtdcFile {
            records,
            metrics_start,
            metrics_end,
        })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn data_records(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(|r| r.kind() == RecordKind::Data)
    }

    pub fn metrics_start(&self) -> DateTime<Utc> {
        self.metrics_start
    }

    pub fn metrics_end(&self) -> DateTime<Utc> {
        self.metrics_end
    }

    /// decode_all decodes every data chunk concurrently, yielding one result
    /// per data record in record order.  Chunk failures are recoverable: a
    /// failing chunk reports its error here and the rest decode normally.
    pub async fn decode_all(&self) -> Vec<std::result::Result<Arc<TimeSeries>, Arc<FtdcError>>> {
        futures::future::join_all(self.data_records().map(Record::time_series)).await
    }
}

impl Record {
    /// time_series decompresses and decodes this data record's chunk.
    ///
    /// The result (success or failure) is computed at most once per record,
    /// also under concurrent callers, and shared thereafter.
    pub async fn time_series(&self) -> std::result::Result<Arc<TimeSeries>, Arc<FtdcError>> {
        self.series
            .get_or_init(|| async {
                match decode_record(self) {
                    Ok(series) => Ok(Arc::new(series)),
                    Err(e) => {
                        warn!(record = %self.id(), error = %e, "skipping undecodable chunk");
                        Err(Arc::new(e))
                    }
                }
            })
            .await
            .clone()
    }
}

fn decode_record(record: &Record) -> Result<TimeSeries> {
    let data = record.data().ok_or_else(|| {
        FtdcError::MalformedChunk("metadata record has no compressed payload".to_string())
    })?;
    let inflated = decompress(data)?;
    let chunk = Chunk::parse(&inflated)?;
    decode_chunk(&chunk)
}
