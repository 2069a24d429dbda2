// © 2019 3D Robotics. License: Apache-2.0
use std::pin::Pin;
use std::sync::Arc;
use async_stream::try_stream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use crate::error::Error;
use crate::layout;
use crate::source::{self, DataStream, MemorySource, StreamFactory};
use crate::storage::Storage;

/// The archive as a lazy byte stream. Chunk boundaries carry no meaning.
pub type ArchiveStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send + 'static>>;

/// A file to be included in a zip archive.
pub struct FileEntry {
    /// Filename within the archive: UTF-8, forward-slash separators,
    /// no leading slash.
    pub archive_path: String,

    /// How the contents are packaged on the wire.
    pub storage: Storage,

    /// Produces a fresh, unopened source of the file contents. Called
    /// once, when the entry's turn to be streamed arrives.
    pub source: StreamFactory,

    /// Length of the file contents in bytes.
    pub uncompressed_size: u64,

    /// Length of the payload on the wire; must equal
    /// `storage.wire_length(uncompressed_size)`.
    pub compressed_size: u64,

    /// CRC32 checksum of the file contents.
    /// This must be precomputed because it's included in the file header.
    pub crc: u32,

    /// Last modified date. `None` means 1980-01-01 00:00:00, the
    /// earliest MS-DOS time; if you want the archive to be byte-for-byte
    /// reproducible, do not default to the current time.
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// An entry over an in-memory buffer, computing the checksum and
    /// sizes up front.
    pub fn from_bytes(archive_path: impl Into<String>, storage: Storage, data: Bytes) -> FileEntry {
        let crc = crc32fast::hash(&data);
        let len = data.len() as u64;
        FileEntry {
            archive_path: archive_path.into(),
            storage,
            source: Box::new(move || Box::new(MemorySource::new(data.clone())) as Box<dyn DataStream>),
            uncompressed_size: len,
            compressed_size: storage.wire_length(len),
            crc,
            last_modified: None,
        }
    }
}

/// Byte offsets assigned to every record before streaming begins.
pub struct Plan {
    /// Offset of each entry's local file header, in list order.
    pub offsets: Vec<u64>,

    /// Offset of the first central directory header.
    pub cd_offset: u64,

    /// Combined length of the central directory headers.
    pub cd_size: u64,

    /// Length of the whole archive.
    pub total_size: u64,
}

/// Produces a zip64 archive whose byte length is known before the first
/// byte is emitted.
///
/// Entries are streamed strictly in list order with at most one source
/// open at a time, so peak memory is independent of file sizes.
pub struct Encoder {
    files: Vec<FileEntry>,
    plan: Option<Plan>,
}

impl Encoder {
    pub fn new(files: Vec<FileEntry>) -> Encoder {
        Encoder { files, plan: None }
    }

    /// Assign header offsets and compute the total archive size.
    /// Idempotent; must be called before `total_size` or `get_data`.
    pub fn prepare(&mut self) -> Result<&Plan, Error> {
        if self.plan.is_none() {
            self.plan = Some(plan(&self.files)?);
        }
        self.plan.as_ref().ok_or(Error::PlanMissing)
    }

    /// The plan, if `prepare` has run.
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// The planned archive length in bytes.
    pub fn total_size(&self) -> Result<u64, Error> {
        self.plan.as_ref().map(|plan| plan.total_size).ok_or(Error::PlanMissing)
    }

    /// Produce the archive contents as a lazy byte stream.
    ///
    /// The stream emits exactly `total_size` bytes unless it ends in an
    /// error. Nothing is buffered beyond a single chunk; the producer
    /// suspends whenever the current entry's source does. The open
    /// source is closed on every exit path, whether the entry completes
    /// or its stream fails or disagrees with the declared length.
    pub fn get_data(self) -> Result<ArchiveStream, Error> {
        let Encoder { files, plan } = self;
        let plan = plan.ok_or(Error::PlanMissing)?;

        Ok(Box::pin(try_stream! {
            for entry in &files {
                yield layout::local_file_header(entry);

                let mut source = (entry.source)();
                source.open().await.map_err(|e| Error::upstream(&entry.archive_path, e))?;
                let source = Arc::new(Mutex::new(source));

                let mut wire = entry.storage.wrap(source::read_chunks(source.clone()));
                let mut emitted = 0u64;
                let mut failure = None;
                while let Some(chunk) = wire.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            failure = Some(Error::upstream(&entry.archive_path, err));
                            break;
                        }
                    };
                    emitted += chunk.len() as u64;
                    if let Err(err) = size_check(entry, emitted, false) {
                        failure = Some(err);
                        break;
                    }
                    yield chunk;
                }

                // close before any error propagates; a streaming failure
                // outranks a close failure
                drop(wire);
                let closed = source.lock().await.close().await;
                match failure {
                    Some(err) => Err(err),
                    None => closed.map_err(|e| Error::upstream(&entry.archive_path, e)),
                }?;
                size_check(entry, emitted, true)?;
            }

            for (entry, &offset) in files.iter().zip(&plan.offsets) {
                yield layout::central_directory_header(entry, offset);
            }

            yield layout::end_of_central_directory(plan.cd_offset, plan.cd_size, files.len() as u64);
        }))
    }
}

fn plan(files: &[FileEntry]) -> Result<Plan, Error> {
    let mut offsets = Vec::with_capacity(files.len());
    let mut running = 0u64;
    let mut cd_size = 0u64;

    for entry in files {
        if entry.archive_path.len() > 0xFFFF {
            return Err(Error::NameTooLong { archive_path: entry.archive_path.clone() });
        }
        offsets.push(running);
        running += layout::local_header_len(&entry.archive_path) + entry.compressed_size;
        cd_size += layout::central_header_len(&entry.archive_path);
    }

    Ok(Plan {
        offsets,
        cd_offset: running,
        cd_size,
        total_size: running + cd_size + layout::TRAILER_LEN,
    })
}

/// The headers committed to the declared compressed size, so a source
/// that produces any other number of wire bytes is fatal. Overruns fail
/// as soon as the count is exceeded rather than draining the source.
fn size_check(entry: &FileEntry, actual: u64, at_end: bool) -> Result<(), Error> {
    if actual > entry.compressed_size || (at_end && actual != entry.compressed_size) {
        return Err(Error::SizeMismatch {
            archive_path: entry.archive_path.clone(),
            declared: entry.compressed_size,
            actual,
        });
    }
    Ok(())
}
