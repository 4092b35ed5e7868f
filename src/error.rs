use std::fmt::{self, Display};
use std::io;

use nom;

use crate::schema::{Module, Namespace, RecordKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    UnknownModule(String),

    AmbiguousNamespace(Module),

    MissingNamespace {
        module: Module,
        namespace: Namespace,
    },

    SchemaVersionMismatch {
        module: Module,
        expected: u64,
        found: u64,
    },

    ModeOutOfRange {
        field: &'static str,
        value: i64,
    },

    CounterLengthMismatch {
        module: Module,
        namespace: Namespace,
        names: usize,
        values: usize,
    },

    // The buffer is shorter than the record layout.
    ShortBuffer {
        module: Module,
        kind: RecordKind,
        expected: usize,
        actual: usize,
    },

    TrailingBytes {
        module: Module,
        kind: RecordKind,
        expected: usize,
        actual: usize,
    },

    UnrecognizedLayout {
        module: Module,
        size: usize,
    },

    InvalidNodeName(String),

    NodeNameTooLong(usize),

    CounterNameCollision(String),

    ModuleNotPresent(Module),

    InvalidSchema(String),

    Io(io::Error),

    Nom(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        // Keep only the error kind, the remaining input can be kilobytes long.
        let msg = match err {
            nom::Err::Incomplete(needed) => format!("incomplete input: {:?}", needed),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                format!("{:?} with {} bytes left", e.code, e.input.len())
            }
        };
        Error::Nom(msg)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}

impl Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownModule(name) => write!(formatter, "unknown module {:?}", name),
            Error::AmbiguousNamespace(module) => write!(
                formatter,
                "module {} has several floating point counter families, one must be named",
                module
            ),
            Error::MissingNamespace { module, namespace } => {
                write!(formatter, "module {} has no {} counters", module, namespace)
            }
            Error::SchemaVersionMismatch {
                module,
                expected,
                found,
            } => write!(
                formatter,
                "{} header magic {:#x} does not match expected {:#x}",
                module, found, expected
            ),
            Error::ModeOutOfRange { field, value } => {
                write!(formatter, "{} value {} is out of range", field, value)
            }
            Error::CounterLengthMismatch {
                module,
                namespace,
                names,
                values,
            } => write!(
                formatter,
                "{} {} counters: {} names but {} values",
                module, namespace, names, values
            ),
            Error::ShortBuffer {
                module,
                kind,
                expected,
                actual,
            } => write!(
                formatter,
                "{} {} record needs {} bytes, got {}",
                module, kind, expected, actual
            ),
            Error::TrailingBytes {
                module,
                kind,
                expected,
                actual,
            } => write!(
                formatter,
                "{} {} record is {} bytes, got {}",
                module, kind, expected, actual
            ),
            Error::UnrecognizedLayout { module, size } => write!(
                formatter,
                "{} bytes is neither a {} header nor a {} performance record",
                size, module, module
            ),
            Error::InvalidNodeName(msg) => write!(formatter, "invalid node name: {}", msg),
            Error::NodeNameTooLong(len) => {
                write!(formatter, "node name of {} bytes does not fit the record", len)
            }
            Error::CounterNameCollision(name) => {
                write!(formatter, "counter {} appears in more than one family", name)
            }
            Error::ModuleNotPresent(module) => {
                write!(formatter, "log does not contain {} data", module)
            }
            Error::InvalidSchema(msg) => write!(formatter, "invalid schema: {}", msg),
            Error::Io(err) => write!(formatter, "{}", err),
            Error::Nom(msg) => write!(formatter, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}
