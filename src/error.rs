use std::{error::Error as StdError, fmt::{self, Display}};

pub type BoxError = Box<dyn StdError + 'static + Sync + Send>;

/// Errors produced while planning or streaming an archive.
#[derive(Debug)]
pub enum Error {
    /// `total_size` or `get_data` was called before `prepare`.
    PlanMissing,

    /// An archive path's UTF-8 form does not fit in the 16-bit name
    /// length field.
    NameTooLong { archive_path: String },

    /// The bytes emitted for an entry differ from its declared
    /// compressed size. The archive is unrecoverable because its
    /// headers already committed to the declared length.
    SizeMismatch { archive_path: String, declared: u64, actual: u64 },

    /// An entry's data stream failed to open, read, or close.
    Upstream { archive_path: String, source: BoxError },
}

impl Error {
    pub(crate) fn upstream(archive_path: &str, source: BoxError) -> Error {
        Error::Upstream { archive_path: archive_path.to_owned(), source }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PlanMissing => {
                write!(f, "archive was not prepared before use")
            }
            Error::NameTooLong { archive_path } => {
                write!(f, "archive path {:?} exceeds 65535 bytes", archive_path)
            }
            Error::SizeMismatch { archive_path, declared, actual } => {
                write!(f, "entry {:?} produced {} bytes on the wire, but {} were declared",
                    archive_path, actual, declared)
            }
            Error::Upstream { archive_path, .. } => {
                write!(f, "data stream failed for entry {:?}", archive_path)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Upstream { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Helper for displaying errors with their sources
pub struct Report<'a>(pub &'a (dyn StdError + 'static));

impl Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut error = self.0;

        write!(f, "{}", error)?;

        while let Some(source) = error.source() {
            write!(f, "\n  : {}", source)?;
            error = source;
        }

        Ok(())
    }
}

#[test]
fn test_report_includes_sources() {
    let cause = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
    let err = Error::upstream("a.txt", Box::new(cause));
    let rendered = Report(&err).to_string();
    assert!(rendered.contains("a.txt"));
    assert!(rendered.contains("connection reset"));
}
