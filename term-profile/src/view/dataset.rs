//! Immutable dataset profile and its binary file format.
//!
//! # Layout
//!
//! Writing sorts the union of every column's component names, assigns each a dense index,
//! and encodes one `COLUMN` chunk per column (in column-name order) into a scratch region.
//! The header (column offsets, dataset properties, region length, index table) is written
//! first, followed by the chunk region copied from scratch. Offsets in the header are
//! relative to the first byte after the header.
//!
//! Reading decodes the header, then seeks to each chunk. Every structural problem is
//! reported: an undecodable header, a chunk type other than `COLUMN`, a payload shorter
//! than its chunk header declares, or an index missing from the name table.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use prost::Message;
use tracing::{debug, instrument, warn};

use crate::error::{ErrorContext, ProfileError, Result};
use crate::metrics::{ComponentPath, MetricValue};
use crate::view::column::ColumnProfileView;
use crate::wire::{
    read_delimited, write_delimited, ChunkHeader, ChunkMessage, ChunkOffsets, ChunkType,
    DatasetProfileHeader, DatasetProperties, MetricComponentMessage,
};

/// Frozen profile of a whole dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetProfileView {
    columns: BTreeMap<String, ColumnProfileView>,
    dataset_timestamp: DateTime<Utc>,
    creation_timestamp: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
}

impl DatasetProfileView {
    /// Creates a view. Timestamps are truncated to millisecond precision, the resolution
    /// they are stored with.
    pub fn new(
        columns: BTreeMap<String, ColumnProfileView>,
        dataset_timestamp: DateTime<Utc>,
        creation_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            columns,
            dataset_timestamp: dataset_timestamp.trunc_subsecs(3),
            creation_timestamp: creation_timestamp.trunc_subsecs(3),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn dataset_timestamp(&self) -> DateTime<Utc> {
        self.dataset_timestamp
    }

    pub fn creation_timestamp(&self) -> DateTime<Utc> {
        self.creation_timestamp
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn columns(&self) -> &BTreeMap<String, ColumnProfileView> {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnProfileView> {
        self.columns.get(name)
    }

    /// Looks up several columns at once; missing columns map to `None`.
    pub fn get_columns<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, Option<&ColumnProfileView>> {
        names
            .into_iter()
            .map(|name| (name.to_string(), self.columns.get(name)))
            .collect()
    }

    /// Merges two views of the same logical dataset.
    ///
    /// Columns are unioned; shared columns are merged metric by metric. The result keeps
    /// this view's timestamps, and this view's metadata wins on conflicting keys.
    pub fn merge(&self, other: &DatasetProfileView) -> Result<DatasetProfileView> {
        let mut columns = self.columns.clone();
        for (name, theirs) in &other.columns {
            let merged = match columns.get(name) {
                Some(ours) => ours
                    .merge(theirs)
                    .with_context(|| format!("merging column '{name}'"))?,
                None => theirs.clone(),
            };
            columns.insert(name.clone(), merged);
        }

        let mut metadata = other.metadata.clone();
        metadata.extend(self.metadata.clone());

        Ok(DatasetProfileView {
            columns,
            dataset_timestamp: self.dataset_timestamp,
            creation_timestamp: self.creation_timestamp,
            metadata,
        })
    }

    /// Writes the profile to `path`.
    ///
    /// Chunks are staged in an anonymous scratch file and the result is assembled in a
    /// temporary file next to `path`, which is renamed into place once complete.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display(), columns = self.columns.len()))]
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut scratch = tempfile::tempfile()?;
        let header = self.write_chunks(&mut BufWriter::new(&mut scratch))?;
        scratch.seek(SeekFrom::Start(0))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut target = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut out = BufWriter::new(target.as_file_mut());
            write_delimited(&mut out, &header)?;
            let copied = io::copy(&mut scratch, &mut out)?;
            if copied != header.length {
                return Err(ProfileError::Internal(format!(
                    "scratch region holds {copied} bytes, header declares {}",
                    header.length
                )));
            }
            out.flush()?;
        }
        target.as_file().sync_all()?;
        target.persist(path).map_err(|e| ProfileError::Io(e.error))?;

        debug!(bytes = header.length, "Wrote profile");
        Ok(())
    }

    /// Reads a profile written by [`write`](Self::write).
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn read(path: impl AsRef<Path>) -> Result<DatasetProfileView> {
        let file = File::open(path.as_ref())?;
        DatasetProfileReader::open(BufReader::new(file))?.read_all()
    }

    /// Encodes the profile into a buffer in the file format.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut region = Vec::new();
        let header = self.write_chunks(&mut region)?;

        let mut out = Vec::with_capacity(region.len() + header.encoded_len() + 10);
        write_delimited(&mut out, &header)?;
        out.extend_from_slice(&region);
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<DatasetProfileView> {
        DatasetProfileReader::open(Cursor::new(bytes))?.read_all()
    }

    /// Encodes every column as a chunk into `region` and returns the header describing it.
    fn write_chunks<W: Write>(&self, region: &mut W) -> Result<DatasetProfileHeader> {
        let names: BTreeSet<String> = self
            .columns
            .values()
            .flat_map(ColumnProfileView::get_metric_component_paths)
            .map(|path| path.to_string())
            .collect();
        let name_to_index: BTreeMap<&str, i32> = names
            .iter()
            .enumerate()
            .map(|(index, name)| Ok((name.as_str(), index_to_i32(index)?)))
            .collect::<Result<_>>()?;

        let mut column_offsets = BTreeMap::new();
        let mut offset: u64 = 0;
        for (column, view) in &self.columns {
            let mut chunk = ChunkMessage::default();
            for (path, msg) in view.to_components() {
                let name = path.to_string();
                let index = name_to_index.get(name.as_str()).copied().ok_or_else(|| {
                    ProfileError::Internal(format!("component '{name}' missing from name index"))
                })?;
                chunk.metric_components.insert(index, msg);
            }

            let payload = chunk.encode_to_vec();
            let length = u32::try_from(payload.len()).map_err(|_| {
                ProfileError::serialization(format!(
                    "column '{column}' encodes to {} bytes, above the chunk limit",
                    payload.len()
                ))
            })?;
            let chunk_header = ChunkHeader {
                r#type: ChunkType::Column as i32,
                length,
            };

            let header_len = write_delimited(region, &chunk_header)?;
            region.write_all(&payload)?;
            debug!(column = %column, offset, length, "Encoded column chunk");

            column_offsets.insert(
                column.clone(),
                ChunkOffsets {
                    offsets: vec![offset],
                },
            );
            offset += (header_len + payload.len()) as u64;
        }
        region.flush()?;

        let indexed_names = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Ok((index_to_i32(index)?, name)))
            .collect::<Result<_>>()?;

        Ok(DatasetProfileHeader {
            column_offsets,
            properties: Some(DatasetProperties {
                dataset_timestamp: to_millis(self.dataset_timestamp, "dataset_timestamp")?,
                creation_timestamp: to_millis(self.creation_timestamp, "creation_timestamp")?,
                metadata: self.metadata.clone(),
            }),
            length: offset,
            indexed_names,
        })
    }

    /// One row per column: name, value count, null count, and mean when known.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("column", DataType::Utf8, false),
            Field::new("counts/n", DataType::Int64, true),
            Field::new("counts/null", DataType::Int64, true),
            Field::new("distribution/mean", DataType::Float64, true),
            Field::new("ints/min", DataType::Int64, true),
            Field::new("ints/max", DataType::Int64, true),
        ]));

        let summaries: Vec<(&str, BTreeMap<String, MetricValue>)> = self
            .columns
            .iter()
            .map(|(name, view)| (name.as_str(), view.summary()))
            .collect();

        let long = |key: &str| -> ArrayRef {
            Arc::new(Int64Array::from_iter(
                summaries.iter().map(|(_, s)| s.get(key).and_then(MetricValue::as_i64)),
            ))
        };
        let double = |key: &str| -> ArrayRef {
            Arc::new(Float64Array::from_iter(
                summaries.iter().map(|(_, s)| s.get(key).and_then(MetricValue::as_f64)),
            ))
        };

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                summaries.iter().map(|(name, _)| *name),
            )),
            long("counts/n"),
            long("counts/null"),
            double("distribution/mean"),
            long("ints/min"),
            long("ints/max"),
        ];
        Ok(RecordBatch::try_new(schema, columns)?)
    }
}

fn index_to_i32(index: usize) -> Result<i32> {
    i32::try_from(index)
        .map_err(|_| ProfileError::serialization("too many distinct component names"))
}

fn to_millis(ts: DateTime<Utc>, field: &str) -> Result<u64> {
    u64::try_from(ts.timestamp_millis()).map_err(|_| {
        ProfileError::serialization(format!("{field} {ts} is before the Unix epoch"))
    })
}

fn from_millis(ms: u64, field: &str) -> Result<DateTime<Utc>> {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| ProfileError::deserialization(format!("{field} {ms} is out of range")))
}

/// Upper bound on the buffer reserved ahead of reading a chunk payload.
const MAX_PAYLOAD_RESERVE: usize = 1 << 20;

/// Reads a profile file column by column.
///
/// Opening decodes only the header; [`read_column`](Self::read_column) seeks to the chunks
/// of a single column.
#[derive(Debug)]
pub struct DatasetProfileReader<R> {
    reader: R,
    header: DatasetProfileHeader,
    header_end: u64,
}

impl<R: Read + Seek> DatasetProfileReader<R> {
    /// Decodes the header at the current position of `reader`.
    pub fn open(mut reader: R) -> Result<Self> {
        let header = match read_delimited::<DatasetProfileHeader, _>(&mut reader) {
            Ok(Some(header)) => header,
            Ok(None) => {
                return Err(ProfileError::deserialization(
                    "unable to decode the dataset profile header: empty input",
                ))
            }
            Err(ProfileError::Io(e)) => return Err(ProfileError::Io(e)),
            Err(e) => {
                return Err(ProfileError::deserialization(format!(
                    "unable to decode the dataset profile header: {e}"
                )))
            }
        };
        let header_end = reader.stream_position()?;

        if header.indexed_names.is_empty() && !header.column_offsets.is_empty() {
            warn!(
                columns = header.column_offsets.len(),
                "Name index in the header is empty. Possible data corruption"
            );
        }

        Ok(Self {
            reader,
            header,
            header_end,
        })
    }

    /// Column names recorded in the header, sorted.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.header.column_offsets.keys().map(String::as_str)
    }

    pub fn header(&self) -> &DatasetProfileHeader {
        &self.header
    }

    /// Decodes a single column, or `None` when the file has no such column.
    #[instrument(skip(self))]
    pub fn read_column(&mut self, name: &str) -> Result<Option<ColumnProfileView>> {
        let Some(offsets) = self.header.column_offsets.get(name) else {
            return Ok(None);
        };
        let offsets = offsets.offsets.clone();

        let mut components: BTreeMap<ComponentPath, MetricComponentMessage> = BTreeMap::new();
        for offset in offsets {
            for (index, msg) in self.read_chunk(name, offset)? {
                let full_name = self.header.indexed_names.get(&index).ok_or_else(|| {
                    ProfileError::MissingMetricName {
                        column: name.to_string(),
                        index,
                    }
                })?;
                let path = full_name
                    .parse::<ComponentPath>()
                    .with_context(|| format!("column '{name}'"))?;
                components.insert(path, msg);
            }
        }

        ColumnProfileView::from_components(components)
            .with_context(|| format!("column '{name}'"))
            .map(Some)
    }

    /// Reads the chunk of `column` at `offset` in the chunk region.
    fn read_chunk(
        &mut self,
        column: &str,
        offset: u64,
    ) -> Result<BTreeMap<i32, MetricComponentMessage>> {
        if offset >= self.header.length {
            return Err(ProfileError::deserialization(format!(
                "chunk offset {offset} of column '{column}' lies outside the {}-byte chunk region",
                self.header.length
            )));
        }
        let position = self.header_end.checked_add(offset).ok_or_else(|| {
            ProfileError::deserialization(format!(
                "chunk offset {offset} of column '{column}' overflows the file position"
            ))
        })?;
        self.reader.seek(SeekFrom::Start(position))?;

        let chunk_header = read_delimited::<ChunkHeader, _>(&mut self.reader)
            .with_context(|| format!("chunk header of column '{column}' at offset {position}"))?;
        let Some(chunk_header) = chunk_header else {
            return Err(ProfileError::TruncatedChunk {
                column: column.to_string(),
                expected: 1,
                actual: 0,
                offset: position,
            });
        };

        match ChunkType::try_from(chunk_header.r#type) {
            Ok(ChunkType::Column) => {}
            other => {
                return Err(ProfileError::deserialization(format!(
                    "unexpected chunk type {other:?} (tag {}) for column '{column}' at offset {position}",
                    chunk_header.r#type
                )))
            }
        }

        let expected = u64::from(chunk_header.length);
        let reserve = (chunk_header.length as usize).min(MAX_PAYLOAD_RESERVE);
        let mut payload = Vec::with_capacity(reserve);
        (&mut self.reader).take(expected).read_to_end(&mut payload)?;
        if payload.len() as u64 != expected {
            return Err(ProfileError::TruncatedChunk {
                column: column.to_string(),
                expected,
                actual: payload.len() as u64,
                offset: position,
            });
        }

        let chunk = ChunkMessage::decode(payload.as_slice()).map_err(|e| {
            ProfileError::deserialization(format!(
                "invalid chunk for column '{column}' at offset {position}: {e}"
            ))
        })?;
        debug!(
            column,
            offset = position,
            components = chunk.metric_components.len(),
            "Decoded column chunk"
        );
        Ok(chunk.metric_components)
    }

    /// Decodes every column.
    pub fn read_all(mut self) -> Result<DatasetProfileView> {
        let properties = self.header.properties.clone().ok_or_else(|| {
            ProfileError::deserialization("dataset profile header has no properties")
        })?;

        let names: Vec<String> = self.header.column_offsets.keys().cloned().collect();
        let mut columns = BTreeMap::new();
        for name in names {
            if let Some(view) = self.read_column(&name)? {
                columns.insert(name, view);
            }
        }

        let mut view = DatasetProfileView::new(
            columns,
            from_millis(properties.dataset_timestamp, "dataset_timestamp")?,
            from_millis(properties.creation_timestamp, "creation_timestamp")?,
        );
        view.metadata = properties.metadata;
        Ok(view)
    }
}
