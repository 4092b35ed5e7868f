use log::{debug, warn};

use nom;
use nom::{
    bytes::complete::{take, take_till},
    combinator::map,
    multi::count,
    number::complete as number,
    number::Endianness,
    IResult,
};

use crate::config::{Config, MagicCheck};
use crate::error::{Error, Result};
use crate::record::{
    ApcxiHeader, ApcxiPerf, ApmpiHeader, ApmpiPerf, ApssHeader, ApssPerf, ApxcHeader, ApxcPerf,
    BaseRecord, ClusterMode, Counters, HeaderRecord, MemoryMode, Mode, PerfRecord, Rank, Record,
    RecordID, Topology,
};
use crate::schema::{
    self, declared_len, FloatFamily, Module, ModuleSchema, Namespace, RecordKind,
    APMPI_NODE_NAME_LEN,
};

///
/// Binary parsers for scalar fields
///

fn parse_u64(input: &[u8], endian: Endianness) -> IResult<&[u8], u64> {
    number::u64(endian)(input)
}
fn parse_i64(input: &[u8], endian: Endianness) -> IResult<&[u8], i64> {
    number::i64(endian)(input)
}
fn parse_u32(input: &[u8], endian: Endianness) -> IResult<&[u8], u32> {
    number::u32(endian)(input)
}
fn parse_f64(input: &[u8], endian: Endianness) -> IResult<&[u8], f64> {
    number::f64(endian)(input)
}
fn parse_bytes(input: &[u8], len: usize) -> IResult<&[u8], &[u8]> {
    take(len)(input)
}
fn parse_padding(input: &[u8], len: usize) -> IResult<&[u8], ()> {
    map(|i| parse_bytes(i, len), |_| ())(input)
}

fn parse_record_id(input: &[u8], endian: Endianness) -> IResult<&[u8], RecordID> {
    map(|i| parse_u64(i, endian), RecordID)(input)
}
fn parse_rank(input: &[u8], endian: Endianness) -> IResult<&[u8], Rank> {
    map(|i| parse_i64(i, endian), Rank)(input)
}

fn parse_base_record(input: &[u8], endian: Endianness) -> IResult<&[u8], BaseRecord> {
    let (input, id) = parse_record_id(input, endian)?;
    let (input, rank) = parse_rank(input, endian)?;
    Ok((input, BaseRecord { id, rank }))
}

fn parse_topology(input: &[u8], endian: Endianness) -> IResult<&[u8], Topology> {
    let (input, group) = parse_i64(input, endian)?;
    let (input, chassis) = parse_i64(input, endian)?;
    let (input, blade) = parse_i64(input, endian)?;
    let (input, node) = parse_i64(input, endian)?;
    Ok((
        input,
        Topology {
            group,
            chassis,
            blade,
            node,
        },
    ))
}

fn parse_u64_array(input: &[u8], endian: Endianness, n: usize) -> IResult<&[u8], Vec<u64>> {
    count(|i| parse_u64(i, endian), n)(input)
}
fn parse_f64_array(input: &[u8], endian: Endianness, n: usize) -> IResult<&[u8], Vec<f64>> {
    count(|i| parse_f64(i, endian), n)(input)
}

pub fn is_nul(chr: u8) -> bool {
    chr == b'\0'
}

fn parse_till_nul(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_till(is_nul)(input)
}

fn parse_node_name(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, field) = parse_bytes(input, APMPI_NODE_NAME_LEN)?;
    let (_, name) = parse_till_nul(field)?;
    Ok((input, name))
}

fn node_name(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_owned()).map_err(|e| Error::InvalidNodeName(e.to_string()))
}

///
/// Layout checks
///

fn check_len(buffer: &[u8], schema: &ModuleSchema, kind: RecordKind) -> Result<()> {
    let expected = schema.record_size(kind);
    let actual = buffer.len();
    let module = schema.module();
    if actual < expected {
        Err(Error::ShortBuffer {
            module,
            kind,
            expected,
            actual,
        })
    } else if actual > expected {
        Err(Error::TrailingBytes {
            module,
            kind,
            expected,
            actual,
        })
    } else {
        Ok(())
    }
}

fn array_len(module: Module, namespace: Namespace) -> Result<usize> {
    declared_len(module, namespace).ok_or(Error::MissingNamespace { module, namespace })
}

fn int_counters<'a>(
    input: &'a [u8],
    endian: Endianness,
    schema: &'static ModuleSchema,
) -> Result<(&'a [u8], Counters<u64>)> {
    let module = schema.module();
    let n = array_len(module, Namespace::Integer)?;
    let (input, values) = parse_u64_array(input, endian, n)?;
    let names = schema.counter_names(Namespace::Integer)?;
    Ok((
        input,
        Counters::new(module, Namespace::Integer, names, values)?,
    ))
}

fn float_counters<'a>(
    input: &'a [u8],
    endian: Endianness,
    schema: &'static ModuleSchema,
    family: FloatFamily,
) -> Result<(&'a [u8], Counters<f64>)> {
    let module = schema.module();
    let namespace = Namespace::Float(Some(family));
    let n = array_len(module, namespace)?;
    let (input, values) = parse_f64_array(input, endian, n)?;
    let names = schema.counter_names(namespace)?;
    Ok((input, Counters::new(module, namespace, names, values)?))
}

/// Decodes raw module records under one configuration.
#[derive(Debug, Copy, Clone, Default)]
pub struct Decoder {
    config: Config,
}

impl Decoder {
    pub fn new(config: Config) -> Self {
        Decoder { config }
    }

    fn endian(&self) -> Endianness {
        self.config.byte_order.endianness()
    }

    fn check_magic(&self, schema: &ModuleSchema, found: u64) -> Result<()> {
        let expected = schema.magic();
        if found == expected {
            return Ok(());
        }
        match self.config.magic_check {
            MagicCheck::Strict => Err(Error::SchemaVersionMismatch {
                module: schema.module(),
                expected,
                found,
            }),
            MagicCheck::Warn => {
                warn!(
                    "{} header magic {:#x} does not match {:#x}, decoding anyway",
                    schema.module(),
                    found,
                    expected
                );
                Ok(())
            }
        }
    }

    pub fn decode_header(&self, buffer: &[u8], module: Module) -> Result<HeaderRecord> {
        self.decode_header_with(buffer, schema::schema(module)?)
    }

    pub fn decode_perf_record(&self, buffer: &[u8], module: Module) -> Result<PerfRecord> {
        self.decode_perf_with(buffer, schema::schema(module)?)
    }

    /// Decodes either kind of record, telling them apart by size.
    pub fn decode_record(&self, buffer: &[u8], module: Module) -> Result<Record> {
        let schema = schema::schema(module)?;
        let size = buffer.len();
        if size == schema.record_size(RecordKind::Header) {
            Ok(Record::Header(self.decode_header_with(buffer, schema)?))
        } else if size == schema.record_size(RecordKind::Performance) {
            Ok(Record::Perf(self.decode_perf_with(buffer, schema)?))
        } else {
            Err(Error::UnrecognizedLayout { module, size })
        }
    }

    pub(crate) fn decode_header_with(
        &self,
        buffer: &[u8],
        schema: &'static ModuleSchema,
    ) -> Result<HeaderRecord> {
        check_len(buffer, schema, RecordKind::Header)?;
        let e = self.endian();
        let (input, base) = parse_base_record(buffer, e)?;
        let (input, magic) = parse_u64(input, e)?;
        self.check_magic(schema, magic)?;

        let header = match schema.module() {
            Module::Apcxi => {
                let (input, nblades) = parse_i64(input, e)?;
                let (input, nchassis) = parse_i64(input, e)?;
                let (input, nslots) = parse_i64(input, e)?;
                let (input, ngroups) = parse_i64(input, e)?;
                let (_, appid) = parse_u64(input, e)?;
                HeaderRecord::Apcxi(ApcxiHeader {
                    base,
                    magic,
                    nblades,
                    nchassis,
                    nslots,
                    ngroups,
                    appid,
                })
            }
            Module::Apmpi => {
                let (input, sync_flag) = parse_u32(input, e)?;
                let (input, _) = parse_padding(input, 4)?;
                let (input, variance_total_mpitime) = parse_f64(input, e)?;
                let (_, variance_total_mpisynctime) = parse_f64(input, e)?;
                HeaderRecord::Apmpi(ApmpiHeader {
                    base,
                    magic,
                    sync_flag,
                    variance_total_mpitime,
                    variance_total_mpisynctime,
                })
            }
            Module::Apss => {
                let (input, nblades) = parse_i64(input, e)?;
                let (input, nchassis) = parse_i64(input, e)?;
                let (input, ngroups) = parse_i64(input, e)?;
                let (_, appid) = parse_u64(input, e)?;
                HeaderRecord::Apss(ApssHeader {
                    base,
                    magic,
                    nblades,
                    nchassis,
                    ngroups,
                    appid,
                })
            }
            Module::Apxc => {
                let (input, nblades) = parse_i64(input, e)?;
                let (input, nchassis) = parse_i64(input, e)?;
                let (input, ngroups) = parse_i64(input, e)?;
                let (input, memory_mode) = parse_i64(input, e)?;
                let (input, cluster_mode) = parse_i64(input, e)?;
                let (_, appid) = parse_u64(input, e)?;
                HeaderRecord::Apxc(ApxcHeader {
                    base,
                    magic,
                    nblades,
                    nchassis,
                    ngroups,
                    memory_mode: Mode::<MemoryMode>::decode("memory_mode", memory_mode)?,
                    cluster_mode: Mode::<ClusterMode>::decode("cluster_mode", cluster_mode)?,
                    appid,
                })
            }
        };
        debug!(
            "decoded {} header: id {} rank {}",
            schema.module(),
            base.id,
            base.rank
        );
        Ok(header)
    }

    pub(crate) fn decode_perf_with(
        &self,
        buffer: &[u8],
        schema: &'static ModuleSchema,
    ) -> Result<PerfRecord> {
        check_len(buffer, schema, RecordKind::Performance)?;
        let e = self.endian();
        let (input, base) = parse_base_record(buffer, e)?;

        let record = match schema.module() {
            Module::Apcxi => {
                let (input, group) = parse_i64(input, e)?;
                let (input, chassis) = parse_i64(input, e)?;
                let (input, slot) = parse_i64(input, e)?;
                let (input, blade) = parse_i64(input, e)?;
                let (input, node) = parse_i64(input, e)?;
                let (_, counters) = int_counters(input, e, schema)?;
                PerfRecord::Apcxi(ApcxiPerf {
                    base,
                    group,
                    chassis,
                    slot,
                    blade,
                    node,
                    counters,
                })
            }
            Module::Apmpi => {
                let (input, counters) = int_counters(input, e, schema)?;
                let (input, total_time) =
                    float_counters(input, e, schema, FloatFamily::TotalTime)?;
                let (input, sync_time) = float_counters(input, e, schema, FloatFamily::SyncTime)?;
                let (input, global_time) =
                    float_counters(input, e, schema, FloatFamily::GlobalTime)?;
                let (_, raw_name) = parse_node_name(input)?;
                PerfRecord::Apmpi(ApmpiPerf {
                    base,
                    counters,
                    total_time,
                    sync_time,
                    global_time,
                    node_name: node_name(raw_name)?,
                })
            }
            Module::Apss => {
                let (input, topology) = parse_topology(input, e)?;
                let (_, counters) = int_counters(input, e, schema)?;
                PerfRecord::Apss(ApssPerf {
                    base,
                    topology,
                    counters,
                })
            }
            Module::Apxc => {
                let (input, topology) = parse_topology(input, e)?;
                let (_, counters) = int_counters(input, e, schema)?;
                PerfRecord::Apxc(ApxcPerf {
                    base,
                    topology,
                    counters,
                })
            }
        };
        debug!(
            "decoded {} record: id {} rank {}",
            schema.module(),
            base.id,
            base.rank
        );
        Ok(record)
    }
}

pub fn decode_header(buffer: &[u8], module: Module) -> Result<HeaderRecord> {
    Decoder::default().decode_header(buffer, module)
}

pub fn decode_perf_record(buffer: &[u8], module: Module) -> Result<PerfRecord> {
    Decoder::default().decode_perf_record(buffer, module)
}

pub fn decode_record(buffer: &[u8], module: Module) -> Result<Record> {
    Decoder::default().decode_record(buffer, module)
}
