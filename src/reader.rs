use std::fs::File;
use std::io::{BufReader, Read};
use std::iter::FusedIterator;
use std::path::Path;

use flate2::read::GzDecoder;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{self, Module, RecordKind};
use crate::serialize::Decoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Hands out the raw records of a log, one buffer at a time.
pub trait RecordSource {
    fn modules(&self) -> Vec<Module>;

    /// Returns `Ok(None)` once the module has no more records.
    fn next_raw_record(&mut self, module: Module) -> Result<Option<Vec<u8>>>;
}

/// An open raw module region: the header record of one module followed by
/// its performance records, as a single byte stream.
#[derive(Debug)]
pub struct RawLog {
    label: String,
    module: Module,
    data: Vec<u8>,
    offset: usize,
    header_size: usize,
    perf_size: usize,
    records: usize,
}

impl RawLog {
    pub fn open<P: AsRef<Path>>(path: P, module: Module) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        Self::read(path.display().to_string(), file, module)
    }

    pub fn from_reader<R: Read>(reader: R, module: Module) -> Result<Self> {
        Self::read("<reader>".to_owned(), reader, module)
    }

    pub fn from_bytes(data: Vec<u8>, module: Module) -> Result<Self> {
        Self::new("<bytes>".to_owned(), data, module)
    }

    fn read<R: Read>(label: String, mut reader: R, module: Module) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::new(label, data, module)
    }

    fn new(label: String, data: Vec<u8>, module: Module) -> Result<Self> {
        let data = if data.starts_with(&GZIP_MAGIC) {
            let mut gz = GzDecoder::new(&data[..]);
            let mut s = Vec::new();
            gz.read_to_end(&mut s)?;
            debug!("{}: inflated {} to {} bytes", label, data.len(), s.len());
            s
        } else {
            data
        };
        let schema = schema::schema(module)?;
        info!("opened {} region {} ({} bytes)", module, label, data.len());
        Ok(RawLog {
            label,
            module,
            data,
            offset: 0,
            header_size: schema.record_size(RecordKind::Header),
            perf_size: schema.record_size(RecordKind::Performance),
            records: 0,
        })
    }

    pub fn module(&self) -> Module {
        self.module
    }

    pub fn records(&self) -> usize {
        self.records
    }
}

impl RecordSource for RawLog {
    fn modules(&self) -> Vec<Module> {
        vec![self.module]
    }

    fn next_raw_record(&mut self, module: Module) -> Result<Option<Vec<u8>>> {
        if module != self.module {
            return Err(Error::ModuleNotPresent(module));
        }
        let remaining = self.data.len() - self.offset;
        if remaining == 0 {
            return Ok(None);
        }
        let (kind, size) = if self.records == 0 {
            (RecordKind::Header, self.header_size)
        } else {
            (RecordKind::Performance, self.perf_size)
        };
        if remaining < size {
            self.offset = self.data.len();
            return Err(Error::ShortBuffer {
                module,
                kind,
                expected: size,
                actual: remaining,
            });
        }
        let chunk = self.data[self.offset..self.offset + size].to_vec();
        self.offset += size;
        self.records += 1;
        Ok(Some(chunk))
    }
}

impl Drop for RawLog {
    fn drop(&mut self) {
        info!(
            "closed {} region {} after {} records",
            self.module, self.label, self.records
        );
    }
}

/// Decodes the records of one module: the header first, then every
/// performance record. Stops for good at the end of the records or at the
/// first error.
pub struct RecordStream<'a, S: RecordSource + ?Sized> {
    source: &'a mut S,
    module: Module,
    decoder: Decoder,
    seen_header: bool,
    done: bool,
}

impl<'a, S: RecordSource + ?Sized> RecordStream<'a, S> {
    pub fn new(source: &'a mut S, module: Module) -> Self {
        Self::with_decoder(source, module, Decoder::default())
    }

    pub fn with_decoder(source: &'a mut S, module: Module, decoder: Decoder) -> Self {
        RecordStream {
            source,
            module,
            decoder,
            seen_header: false,
            done: false,
        }
    }

    fn decode(&mut self, buffer: &[u8]) -> Result<Record> {
        if self.seen_header {
            Ok(Record::Perf(
                self.decoder.decode_perf_record(buffer, self.module)?,
            ))
        } else {
            self.seen_header = true;
            Ok(Record::Header(
                self.decoder.decode_header(buffer, self.module)?,
            ))
        }
    }
}

impl<S: RecordSource + ?Sized> Iterator for RecordStream<'_, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.source.next_raw_record(self.module) {
            Ok(None) => {
                self.done = true;
                return None;
            }
            Ok(Some(buffer)) => self.decode(&buffer),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

impl<S: RecordSource + ?Sized> FusedIterator for RecordStream<'_, S> {}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;
    use crate::config::ByteOrder;
    use crate::encode::{encode_header, encode_perf_record};
    use crate::record::{
        ApssHeader, ApssPerf, BaseRecord, Counters, HeaderRecord, PerfRecord, Rank, RecordID,
        Topology,
    };
    use crate::schema::{counter_names, Namespace, APSS_MAGIC};

    fn header() -> HeaderRecord {
        HeaderRecord::Apss(ApssHeader {
            base: BaseRecord {
                id: RecordID(1),
                rank: Rank::ALL,
            },
            magic: APSS_MAGIC,
            nblades: 2,
            nchassis: 1,
            ngroups: 1,
            appid: 3,
        })
    }

    fn perf(node: i64) -> PerfRecord {
        let names = counter_names(Module::Apss, Namespace::Integer).unwrap();
        PerfRecord::Apss(ApssPerf {
            base: BaseRecord {
                id: RecordID(100 + node as u64),
                rank: Rank(node),
            },
            topology: Topology {
                group: 0,
                chassis: 0,
                blade: 1,
                node,
            },
            counters: Counters::new(Module::Apss, Namespace::Integer, names, vec![node as u64; 10])
                .unwrap(),
        })
    }

    fn region(nodes: i64) -> Vec<u8> {
        let mut buf = encode_header(&header(), ByteOrder::Native).unwrap();
        for node in 0..nodes {
            buf.extend(encode_perf_record(&perf(node), ByteOrder::Native).unwrap());
        }
        buf
    }

    #[test]
    fn test_stream_order() {
        let mut log = RawLog::from_bytes(region(3), Module::Apss).unwrap();
        let records: Vec<_> = RecordStream::new(&mut log, Module::Apss)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], Record::Header(header()));
        for node in 0..3 {
            assert_eq!(records[node + 1], Record::Perf(perf(node as i64)));
        }
        assert_eq!(log.records(), 4);
    }

    #[test]
    fn test_end_of_records() {
        let mut log = RawLog::from_bytes(region(0), Module::Apss).unwrap();
        assert!(log.next_raw_record(Module::Apss).unwrap().is_some());
        assert!(log.next_raw_record(Module::Apss).unwrap().is_none());
        assert!(log.next_raw_record(Module::Apss).unwrap().is_none());
    }

    #[test]
    fn test_fused_after_error() {
        let mut buf = region(1);
        buf.extend_from_slice(&[0u8; 20]);
        let mut log = RawLog::from_bytes(buf, Module::Apss).unwrap();
        let mut stream = RecordStream::new(&mut log, Module::Apss);
        assert!(matches!(stream.next(), Some(Ok(Record::Header(_)))));
        assert!(matches!(stream.next(), Some(Ok(Record::Perf(_)))));
        assert!(matches!(
            stream.next(),
            Some(Err(Error::ShortBuffer {
                kind: RecordKind::Performance,
                actual: 20,
                ..
            }))
        ));
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_gzip_region() {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&region(2)).unwrap();
        let compressed = gz.finish().unwrap();

        let mut plain = RawLog::from_bytes(region(2), Module::Apss).unwrap();
        let mut inflated = RawLog::from_reader(&compressed[..], Module::Apss).unwrap();
        let a: Vec<_> = RecordStream::new(&mut plain, Module::Apss).collect();
        let b: Vec<_> = RecordStream::new(&mut inflated, Module::Apss).collect();
        assert_eq!(a.len(), 3);
        assert_eq!(
            a.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
            b.into_iter().map(Result::unwrap).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_module_not_present() {
        let mut log = RawLog::from_bytes(region(1), Module::Apss).unwrap();
        assert_eq!(log.modules(), vec![Module::Apss]);
        let mut stream = RecordStream::new(&mut log, Module::Apxc);
        assert!(matches!(
            stream.next(),
            Some(Err(Error::ModuleNotPresent(Module::Apxc)))
        ));
        assert!(stream.next().is_none());
    }

    struct Buffers(Vec<Vec<u8>>);

    impl RecordSource for Buffers {
        fn modules(&self) -> Vec<Module> {
            vec![Module::Apss]
        }

        fn next_raw_record(&mut self, _module: Module) -> Result<Option<Vec<u8>>> {
            if self.0.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.0.remove(0)))
            }
        }
    }

    #[test]
    fn test_external_source() {
        let mut source = Buffers(vec![
            encode_header(&header(), ByteOrder::Native).unwrap(),
            encode_perf_record(&perf(7), ByteOrder::Native).unwrap(),
        ]);
        let source: &mut dyn RecordSource = &mut source;
        let records: Vec<_> = RecordStream::new(source, Module::Apss)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records[1], Record::Perf(perf(7)));
    }

    #[test]
    fn test_header_decoded_first() {
        // a performance record where the header belongs fails its length check
        let mut source = Buffers(vec![
            encode_perf_record(&perf(0), ByteOrder::Native).unwrap(),
        ]);
        let mut stream = RecordStream::new(&mut source, Module::Apss);
        assert!(matches!(
            stream.next(),
            Some(Err(Error::TrailingBytes {
                kind: RecordKind::Header,
                ..
            }))
        ));
        assert!(stream.next().is_none());
    }
}
