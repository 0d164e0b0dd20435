use std::{fmt, io, num::ParseFloatError, str::Utf8Error};
use quick_xml::escape::EscapeError;
use quick_xml::events::attributes::AttrError;

#[derive(Debug)]
pub enum Error {
    /// Input is not well-formed XML. Fatal; no partial output is consistent.
    MalformedInput(String),
    /// A node, way, relation or tag lacks an attribute it cannot be used without.
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// A creation timestamp did not match `%Y-%m-%dT%H:%M:%SZ`.
    TimestampParse(String),
    Io(io::Error),
    Xml(quick_xml::Error),
    Attr(AttrError),
    Escape(EscapeError),
    Utf8(Utf8Error),
    Json(serde_json::Error),
    FloatParse(ParseFloatError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInput(message) => write!(f, "malformed input: {}", message),
            Error::MissingAttribute { element, attribute } => {
                write!(f, "<{}> is missing required attribute '{}'", element, attribute)
            },
            Error::TimestampParse(value) => {
                write!(f, "timestamp '{}' does not match %Y-%m-%dT%H:%M:%SZ", value)
            },
            Error::Io(err) => write!(f, "{}", err),
            Error::Xml(err) => write!(f, "{}", err),
            Error::Attr(err) => write!(f, "{}", err),
            Error::Escape(err) => write!(f, "{}", err),
            Error::Utf8(err) => write!(f, "{}", err),
            Error::Json(err) => write!(f, "{}", err),
            Error::FloatParse(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Error::Xml(value)
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error::Attr(value)
    }
}

impl From<EscapeError> for Error {
    fn from(value: EscapeError) -> Self {
        Error::Escape(value)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::Utf8(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(value)
    }
}

impl From<ParseFloatError> for Error {
    fn from(value: ParseFloatError) -> Self {
        Error::FloatParse(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::MalformedInput(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::MalformedInput(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
