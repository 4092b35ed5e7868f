pub mod backend;
pub mod config;
pub mod encode;
pub mod error;
pub mod reader;
pub mod record;
pub mod schema;
pub mod serialize;

pub use config::{ByteOrder, Config, MagicCheck};
pub use encode::{encode_header, encode_perf_record};
pub use error::{Error, Result};
pub use reader::{RawLog, RecordSource, RecordStream};
pub use record::{HeaderRecord, PerfRecord, Record};
pub use schema::{counter_names, FloatFamily, Module, Namespace};
pub use serialize::{decode_header, decode_perf_record, decode_record, Decoder};
