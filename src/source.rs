// © 2019 3D Robotics. License: Apache-2.0
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use async_stream::try_stream;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

pub use crate::error::BoxError;

pub type BoxBytesStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send + 'static>>;

/// How many payload bytes to request from a source per read.
const READ_SIZE: usize = 64 * 1024;

/// An abstract asynchronous byte source, read once from front to back.
///
/// Construction is separate from `open` so that a long entry list does
/// not pin an open handle per entry: the encoder opens each source only
/// when its turn to be streamed arrives, and closes it before moving on.
/// Implementations must also release their resources when dropped
/// without `close`, which happens if the consumer abandons the archive
/// stream mid-entry.
#[async_trait]
pub trait DataStream: Send {
    /// Acquire the underlying resource. Called at most once per source.
    async fn open(&mut self) -> Result<(), BoxError>;

    /// Read up to `max` bytes. An empty result means end of stream.
    async fn read(&mut self, max: usize) -> Result<Bytes, BoxError>;

    /// Release the underlying resource.
    async fn close(&mut self) -> Result<(), BoxError>;
}

/// Produces a fresh, unopened [`DataStream`] per use.
pub type StreamFactory = Box<dyn Fn() -> Box<dyn DataStream> + Send + Sync>;

/// Shared handle to a source. A chunk stream reads through it while its
/// owner keeps the ability to close it on every exit path, including
/// failures the stream itself cannot see.
pub type SharedSource = Arc<Mutex<Box<dyn DataStream>>>;

/// Adapt an opened source into a chunk stream.
///
/// The stream ends at the source's end of stream or its first failed
/// read. Closing stays with the handle's owner.
pub fn read_chunks(source: SharedSource) -> BoxBytesStream {
    Box::pin(try_stream! {
        loop {
            let chunk = source.lock().await.read(READ_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            yield chunk;
        }
    })
}

/// An in-memory source. `Bytes` clones are cheap, so a factory can hand
/// out the same buffer any number of times.
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: Bytes) -> MemorySource {
        MemorySource { data }
    }
}

#[async_trait]
impl DataStream for MemorySource {
    async fn open(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn read(&mut self, max: usize) -> Result<Bytes, BoxError> {
        let n = max.min(self.data.len());
        Ok(self.data.split_to(n))
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A source reading a file from the local filesystem. The file handle
/// is acquired on `open`, not construction.
pub struct FileSource {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> FileSource {
        FileSource { path: path.into(), file: None }
    }
}

#[async_trait]
impl DataStream for FileSource {
    async fn open(&mut self) -> Result<(), BoxError> {
        self.file = Some(tokio::fs::File::open(&self.path).await?);
        Ok(())
    }

    async fn read(&mut self, max: usize) -> Result<Bytes, BoxError> {
        let file = self.file.as_mut().ok_or("file source was not opened")?;
        let mut buf = BytesMut::with_capacity(max);
        file.read_buf(&mut buf).await?;
        Ok(buf.freeze())
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        self.file.take();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_memory_source_respects_max() {
        let mut source = MemorySource::new(Bytes::from_static(b"01234"));
        source.open().await.unwrap();
        assert_eq!(source.read(2).await.unwrap(), &b"01"[..]);
        assert_eq!(source.read(2).await.unwrap(), &b"23"[..]);
        assert_eq!(source.read(2).await.unwrap(), &b"4"[..]);
        assert_eq!(source.read(2).await.unwrap(), &b""[..]);
        source.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_chunks_leaves_closing_to_the_caller() {
        let mut source = Box::new(MemorySource::new(Bytes::from_static(b"hello"))) as Box<dyn DataStream>;
        source.open().await.unwrap();
        let source = Arc::new(Mutex::new(source));

        let mut stream = read_chunks(source.clone());
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        drop(stream);

        // the handle is still usable once the stream is exhausted
        source.lock().await.close().await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_file_source_round_trip() {
        let path = std::env::temp_dir().join("livezip-file-source-test.bin");
        std::fs::write(&path, b"file contents").unwrap();

        let mut source = FileSource::new(&path);
        source.open().await.unwrap();
        let mut out = Vec::new();
        loop {
            let chunk = source.read(4).await.unwrap();
            if chunk.is_empty() { break; }
            out.extend_from_slice(&chunk);
        }
        source.close().await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(out, b"file contents");
    }

    #[tokio::test]
    async fn test_unopened_file_source_read_fails() {
        let mut source = FileSource::new("/nonexistent");
        assert!(source.read(16).await.is_err());
    }
}
