//! Error types for edgemetrics

use std::fmt;
use std::path::PathBuf;

/// Result type alias for edgemetrics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for edgemetrics
#[derive(Debug)]
pub enum Error {
    /// IO errors (open/read/write/seek/decompress)
    Io(std::io::Error),
    /// Configuration errors: missing or misordered files, bad arguments
    Config(String),
    /// A record or field could not be parsed
    Parse { context: String, detail: String },
    /// A series input violated the sorted / unique-date contract
    InputContract(String),
    /// Only absolute seeks are supported on the archive stream
    UnsupportedSeek,
    /// Data was written but the checkpoint could not be persisted
    Checkpoint { path: PathBuf, source: std::io::Error },
}

impl Error {
    /// Build a parse error naming what was being parsed.
    pub fn parse(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Parse {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Checkpoint { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Parse { context, detail } => {
                write!(f, "Parse error in {}: {}", context, detail)
            }
            Error::InputContract(msg) => write!(f, "Input contract violated: {}", msg),
            Error::UnsupportedSeek => {
                write!(f, "Archive stream only supports seeking to absolute offsets")
            }
            Error::Checkpoint { path, source } => write!(
                f,
                "Checkpoint write to {} failed after data was committed: {}",
                path.display(),
                source
            ),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        // Errors that crossed a `Read`/`Seek` boundary come back as themselves.
        if !e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(e);
        }
        let kind = e.kind();
        match e.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(err)) => *err,
            Some(Err(other)) => Error::Io(std::io::Error::new(kind, other.to_string())),
            None => Error::Io(std::io::Error::from(kind)),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => inner,
            Error::UnsupportedSeek => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, Error::UnsupportedSeek)
            }
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_context() {
        let err = Error::parse("days/2021.06.01", "missing method field");
        assert_eq!(
            err.to_string(),
            "Parse error in days/2021.06.01: missing method field"
        );
    }

    #[test]
    fn test_io_roundtrip_keeps_kind() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        let back: std::io::Error = err.into();
        assert_eq!(back.kind(), std::io::ErrorKind::NotFound);

        let seek: std::io::Error = Error::UnsupportedSeek.into();
        assert_eq!(seek.kind(), std::io::ErrorKind::Unsupported);
        assert!(matches!(Error::from(seek), Error::UnsupportedSeek));

        let config: std::io::Error = Error::Config("bad index".into()).into();
        assert!(matches!(Error::from(config), Error::Config(msg) if msg == "bad index"));
    }

    #[test]
    fn test_foreign_wrapped_error_keeps_message() {
        let wrapped = std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt deflate stream");
        match Error::from(wrapped) {
            Error::Io(inner) => {
                assert_eq!(inner.kind(), std::io::ErrorKind::InvalidData);
                assert_eq!(inner.to_string(), "corrupt deflate stream");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
