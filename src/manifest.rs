// © 2019 3D Robotics. License: Apache-2.0
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde_derive::Deserialize;
use crate::encoder::FileEntry;
use crate::source::{DataStream, FileSource};
use crate::storage::Storage;

/// One file of an archive manifest.
///
/// Length and checksum are part of the manifest rather than measured at
/// stream time: the whole point is to know the archive size before
/// opening any file.
#[derive(Deserialize, Clone, Debug)]
pub struct ManifestEntry {
    /// Filename within the archive.
    pub archive_name: String,

    /// Local file holding the contents.
    pub source: PathBuf,

    /// Length of the contents in bytes.
    pub length: u64,

    /// CRC32 checksum of the contents.
    pub crc: u32,

    /// Wire packaging; plain `stored` when omitted.
    #[serde(default)]
    pub storage: Storage,

    /// Entry timestamp; the earliest MS-DOS time when omitted.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

/// A JSON description of an archive to produce.
#[derive(Deserialize, Clone, Debug)]
pub struct Manifest {
    pub filename: String,
    pub entries: Vec<ManifestEntry>,
}

impl ManifestEntry {
    /// Build the archive entry, deriving the wire size from the storage
    /// method.
    pub fn into_file_entry(self) -> FileEntry {
        let path = self.source;
        FileEntry {
            archive_path: self.archive_name,
            storage: self.storage,
            source: Box::new(move || Box::new(FileSource::new(path.clone())) as Box<dyn DataStream>),
            uncompressed_size: self.length,
            compressed_size: self.storage.wire_length(self.length),
            crc: self.crc,
            last_modified: self.last_modified,
        }
    }
}

impl Manifest {
    /// Convert every entry, preserving manifest order.
    pub fn into_entries(self) -> Vec<FileEntry> {
        self.entries.into_iter().map(ManifestEntry::into_file_entry).collect()
    }
}
