use std::fmt;
use std::io;
use std::path::PathBuf;

/// Fatal errors raised while extracting, resolving or aggregating a dump.
///
/// Anything represented here aborts the step that raised it; problems local
/// to one article or one link are reported and skipped instead.
#[derive(Debug)]
pub enum WikiError {
    Io(io::Error),
    /// The dump stream is not well-formed XML.
    Xml { position: usize, message: String },
    /// A page closed without any `<id>` element.
    MissingId { title: String },
    /// A numeric field could not be parsed.
    InvalidNumber { field: &'static str, value: String },
    /// A page carries a redirect target but its text is not a redirect.
    RedirectMismatch { title: String },
    /// A value destined for a TSV file contains a tab or newline.
    Separator { field: &'static str, value: String },
    /// A TSV line with an unexpected number of columns.
    MalformedLine {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
    /// The worker pool shut down in an inconsistent state.
    Integrity(String),
}

impl std::error::Error for WikiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WikiError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for WikiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WikiError::Io(err) => write!(f, "I/O error: {}", err),
            WikiError::Xml { position, message } => {
                write!(f, "malformed dump at byte {}: {}", position, message)
            }
            WikiError::MissingId { title } => write!(f, "page {:?} has no id", title),
            WikiError::InvalidNumber { field, value } => {
                write!(f, "invalid {} value: {:?}", field, value)
            }
            WikiError::RedirectMismatch { title } => write!(
                f,
                "page {:?} has a redirect target but its text is not a redirect",
                title
            ),
            WikiError::Separator { field, value } => {
                write!(f, "{} contains a tab or newline: {:?}", field, value)
            }
            WikiError::MalformedLine {
                path,
                line,
                expected,
                found,
            } => write!(
                f,
                "{}:{}: expected {} columns, found {}",
                path.display(),
                line,
                expected,
                found
            ),
            WikiError::Integrity(msg) => write!(f, "integrity violation: {}", msg),
        }
    }
}

impl From<io::Error> for WikiError {
    fn from(error: io::Error) -> Self {
        WikiError::Io(error)
    }
}

/// Parse a numeric field, naming the field on failure.
pub fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, WikiError> {
    value.parse::<T>().map_err(|_| WikiError::InvalidNumber {
        field,
        value: value.to_owned(),
    })
}
