// © 2019 3D Robotics. License: Apache-2.0
use bytes::{Bytes, BytesMut, BufMut};
use chrono::{DateTime, Utc, Datelike, Timelike};
use crate::encoder::FileEntry;

// Zip format spec:
// https://pkware.cachefly.net/webdocs/casestudies/APPNOTE.TXT

const ZIP64_VERSION: u16 = 45;

/// UTF-8 filename flag (bit 11). Bit 3 stays cleared: sizes are known
/// before any header is written.
const FLAG_UTF8: u16 = 0x0800;

const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Length of a local file header including name and zip64 extra field.
pub fn local_header_len(archive_path: &str) -> u64 {
    30 + archive_path.len() as u64 + 20
}

/// Length of a central directory header including name and zip64 extra field.
pub fn central_header_len(archive_path: &str) -> u64 {
    46 + archive_path.len() as u64 + 28
}

/// Length of the trailing records: zip64 end of central directory,
/// zip64 locator, and the classic 22-byte end record.
pub const TRAILER_LEN: u64 = 56 + 20 + 22;

fn dos_date(t: DateTime<Utc>) -> u16 {
    let year = t.year().saturating_sub(1980) as u16;
    let month = t.month() as u16;
    let day = t.day() as u16;
    day | month << 5 | year << 9
}

fn dos_time(t: DateTime<Utc>) -> u16 {
    let second = (t.second() / 2) as u16;
    let minute = t.minute() as u16;
    let hour = t.hour() as u16;
    second | minute << 5 | hour << 11
}

/// Timestamp fields as (date, time), defaulting to 1980-01-01 00:00:00,
/// the earliest MS-DOS time, so that unspecified entries stay reproducible.
fn dos_datetime(t: Option<DateTime<Utc>>) -> (u16, u16) {
    match t {
        Some(t) => (dos_date(t), dos_time(t)),
        None => (0x0021, 0),
    }
}

#[test]
fn test_dos_date_time() {
    let t = "2006-10-11T15:40:56Z".parse::<DateTime<Utc>>().unwrap();
    assert_eq!(dos_time(t), 0x7d1c);
    assert_eq!(dos_date(t), 0x354b);

    assert_eq!(dos_datetime(None), (0x0021, 0));
}

/// All size and offset fields that exist in 32-bit form are forced to
/// their sentinel and carried in the zip64 extra block instead, so every
/// record has a fixed length regardless of entry magnitudes.
pub fn local_file_header(file: &FileEntry) -> Bytes {
    let (date, time) = dos_datetime(file.last_modified);
    let mut buf = BytesMut::with_capacity(local_header_len(&file.archive_path) as usize);

    buf.put_u32_le(0x04034b50); // local file header signature
    buf.put_u16_le(ZIP64_VERSION); // version needed to extract
    buf.put_u16_le(FLAG_UTF8); // general purpose bit flag
    buf.put_u16_le(file.storage.method_code()); // compression method
    buf.put_u16_le(time); // last mod file time
    buf.put_u16_le(date); // last mod file date
    buf.put_u32_le(file.crc); // crc-32
    buf.put_u32_le(0xFFFFFFFF); // compressed size, in zip64 extra
    buf.put_u32_le(0xFFFFFFFF); // uncompressed size, in zip64 extra
    buf.put_u16_le(file.archive_path.len() as u16); // file name length
    buf.put_u16_le(20); // extra field length

    buf.put_slice(file.archive_path.as_bytes()); // file name

    buf.put_u16_le(ZIP64_EXTRA_ID); // Zip64 extended information
    buf.put_u16_le(16); // Size of this "extra" block
    buf.put_u64_le(file.uncompressed_size); // Original uncompressed file size
    buf.put_u64_le(file.compressed_size); // Size of compressed data

    buf.freeze()
}

pub fn central_directory_header(file: &FileEntry, offset: u64) -> Bytes {
    let (date, time) = dos_datetime(file.last_modified);
    let mut buf = BytesMut::with_capacity(central_header_len(&file.archive_path) as usize);

    buf.put_u32_le(0x02014b50); // central file header signature
    buf.put_u8(ZIP64_VERSION as u8); // version made by = zip spec 4.5
    buf.put_u8(0); // version made by = FAT
    buf.put_u16_le(ZIP64_VERSION); // version needed to extract
    buf.put_u16_le(FLAG_UTF8); // general purpose bit flag
    buf.put_u16_le(file.storage.method_code()); // compression method
    buf.put_u16_le(time); // last mod file time
    buf.put_u16_le(date); // last mod file date
    buf.put_u32_le(file.crc); // crc-32
    buf.put_u32_le(0xFFFFFFFF); // compressed size, in zip64 extra
    buf.put_u32_le(0xFFFFFFFF); // uncompressed size, in zip64 extra
    buf.put_u16_le(file.archive_path.len() as u16); // file name length
    buf.put_u16_le(28); // extra field length
    buf.put_u16_le(0); // file comment length
    buf.put_u16_le(0); // disk number start
    buf.put_u16_le(0); // internal file attributes
    buf.put_u32_le(0); // external file attributes
    buf.put_u32_le(0xFFFFFFFF); // relative offset of local header, in zip64 extra

    buf.put_slice(file.archive_path.as_bytes()); // file name

    buf.put_u16_le(ZIP64_EXTRA_ID); // Zip64 extended information
    buf.put_u16_le(24); // Size of this "extra" block
    buf.put_u64_le(file.uncompressed_size); // Original uncompressed file size
    buf.put_u64_le(file.compressed_size); // Size of compressed data
    buf.put_u64_le(offset); // Offset of local header record

    buf.freeze()
}

pub fn end_of_central_directory(cd_offset: u64, cd_size: u64, num_entries: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(TRAILER_LEN as usize);

    // Zip64 end of central directory record
    buf.put_u32_le(0x06064b50); // signature
    buf.put_u64_le(56 - 12); // size of zip64 end of central directory record
    buf.put_u16_le(ZIP64_VERSION); // version made by
    buf.put_u16_le(ZIP64_VERSION); // version needed to extract
    buf.put_u32_le(0); // number of this disk
    buf.put_u32_le(0); // number of the disk with the start of the central directory
    buf.put_u64_le(num_entries); // total number of entries in the central directory on this disk
    buf.put_u64_le(num_entries); // total number of entries in the central directory
    buf.put_u64_le(cd_size); // size of the central directory
    buf.put_u64_le(cd_offset); // offset of start of central directory with respect to the starting disk number

    // Zip64 end of central directory locator
    buf.put_u32_le(0x07064b50); // signature
    buf.put_u32_le(0); // number of the disk with the start of the zip64 end of central directory
    buf.put_u64_le(cd_offset + cd_size); // relative offset of the zip64 end of central directory record
    buf.put_u32_le(1); // total number of disks

    // End of central directory (22 bytes), sentinels only
    buf.put_u32_le(0x06054b50); // end of central dir signature
    buf.put_u16_le(0); // number of this disk
    buf.put_u16_le(0); // number of the disk with the start of the central directory
    buf.put_u16_le(0xFFFF); // total number of entries in the central directory on this disk
    buf.put_u16_le(0xFFFF); // total number of entries in the central directory
    buf.put_u32_le(0xFFFFFFFF); // size of the central directory
    buf.put_u32_le(0xFFFFFFFF); // offset of start of central directory with respect to the starting disk number
    buf.put_u16_le(0); // .ZIP file comment length

    buf.freeze()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::Storage;

    fn entry(name: &str) -> FileEntry {
        FileEntry::from_bytes(name, Storage::Stored, Bytes::from_static(b"xx"))
    }

    #[test]
    fn test_header_lengths_match_builders() {
        let file = entry("dir/name.bin");
        assert_eq!(local_file_header(&file).len() as u64, local_header_len("dir/name.bin"));
        assert_eq!(central_directory_header(&file, 0).len() as u64, central_header_len("dir/name.bin"));
        assert_eq!(local_header_len("dir/name.bin"), 30 + 12 + 20);
        assert_eq!(central_header_len("dir/name.bin"), 46 + 12 + 28);
    }

    #[test]
    fn test_trailer_record_positions() {
        let buf = end_of_central_directory(1000, 158, 2);
        assert_eq!(buf.len() as u64, TRAILER_LEN);
        assert_eq!(&buf[0..4], &[0x50, 0x4B, 0x06, 0x06]);
        assert_eq!(&buf[56..60], &[0x50, 0x4B, 0x06, 0x07]);
        assert_eq!(&buf[76..80], &[0x50, 0x4B, 0x05, 0x06]);

        // locator points at the zip64 record, placed right after the
        // central directory
        let eocd64_offset = u64::from_le_bytes([
            buf[64], buf[65], buf[66], buf[67], buf[68], buf[69], buf[70], buf[71],
        ]);
        assert_eq!(eocd64_offset, 1000 + 158);
    }
}
