//! Compressed point-list snapshots for the history stack.
//!
//! Point lists are serialized with bincode; encodings at or above the
//! configured threshold are deflated, smaller ones are kept raw.

use std::io::{Read, Write};

use ct_common::{HistoryConfig, Point};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{HistoryError, HistoryResult};

/// How a snapshot's bytes are stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SnapshotEncoding {
    Raw,
    Deflate,
}

/// One encoded point list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedSnapshot {
    encoding: SnapshotEncoding,
    bytes: Vec<u8>,
    point_count: usize,
    raw_len: usize,
}

impl CompressedSnapshot {
    pub fn encoding(&self) -> SnapshotEncoding {
        self.encoding
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Bytes actually held in memory.
    pub fn stored_len(&self) -> usize {
        self.bytes.len()
    }

    /// Size of the bincode encoding before compression.
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }
}

/// Encoder/decoder configured from [`HistoryConfig`].
#[derive(Copy, Clone, Debug)]
pub struct SnapshotCodec {
    level: u32,
    min_bytes: usize,
}

impl SnapshotCodec {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            level: config.compression_level.min(9),
            min_bytes: config.compression_min_bytes,
        }
    }

    pub fn encode(&self, points: &[Point]) -> HistoryResult<CompressedSnapshot> {
        let raw = bincode::serialize(points)?;
        let raw_len = raw.len();

        if raw_len < self.min_bytes {
            return Ok(CompressedSnapshot {
                encoding: SnapshotEncoding::Raw,
                bytes: raw,
                point_count: points.len(),
                raw_len,
            });
        }

        let mut encoder = DeflateEncoder::new(
            Vec::with_capacity(raw_len / 2),
            Compression::new(self.level),
        );
        encoder.write_all(&raw)?;
        let bytes = encoder.finish()?;
        tracing::trace!(
            points = points.len(),
            raw_len,
            stored = bytes.len(),
            "Snapshot compressed"
        );

        Ok(CompressedSnapshot {
            encoding: SnapshotEncoding::Deflate,
            bytes,
            point_count: points.len(),
            raw_len,
        })
    }

    pub fn decode(&self, snapshot: &CompressedSnapshot) -> HistoryResult<Vec<Point>> {
        let points: Vec<Point> = match snapshot.encoding {
            SnapshotEncoding::Raw => bincode::deserialize(&snapshot.bytes)?,
            SnapshotEncoding::Deflate => {
                let mut raw = Vec::with_capacity(snapshot.raw_len);
                DeflateDecoder::new(snapshot.bytes.as_slice()).read_to_end(&mut raw)?;
                bincode::deserialize(&raw)?
            }
        };

        if points.len() != snapshot.point_count {
            return Err(HistoryError::Corrupt {
                expected: snapshot.point_count,
                actual: points.len(),
            });
        }
        Ok(points)
    }
}
