//! Writes records back into the fixed layouts read by [`crate::serialize`].

use crate::config::ByteOrder;
use crate::error::{Error, Result};
use crate::record::{BaseRecord, Counters, HeaderRecord, PerfRecord, Topology};
use crate::schema::{
    self, FloatFamily, ModuleSchema, Namespace, RecordKind, APMPI_NODE_NAME_LEN,
};

struct Writer {
    schema: &'static ModuleSchema,
    kind: RecordKind,
    order: ByteOrder,
    buf: Vec<u8>,
}

impl Writer {
    fn new(schema: &'static ModuleSchema, kind: RecordKind, order: ByteOrder) -> Self {
        Writer {
            schema,
            kind,
            order,
            buf: Vec::with_capacity(schema.record_size(kind)),
        }
    }

    /// Counter sets must come from this module's namespace and fill its slots.
    fn check_counters<T: Copy>(&self, counters: &Counters<T>, namespace: Namespace) -> Result<()> {
        let module = self.schema.module();
        let names = self.schema.counter_names(namespace)?.len();
        if counters.module() != module || counters.namespace() != namespace || counters.len() != names
        {
            return Err(Error::CounterLengthMismatch {
                module,
                namespace,
                names,
                values: counters.len(),
            });
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>> {
        let module = self.schema.module();
        let expected = self.schema.record_size(self.kind);
        let actual = self.buf.len();
        if actual < expected {
            return Err(Error::ShortBuffer {
                module,
                kind: self.kind,
                expected,
                actual,
            });
        }
        if actual > expected {
            return Err(Error::TrailingBytes {
                module,
                kind: self.kind,
                expected,
                actual,
            });
        }
        Ok(self.buf)
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&self.order.u64_bytes(value));
    }

    fn i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&self.order.i64_bytes(value));
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&self.order.u32_bytes(value));
    }

    fn f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&self.order.f64_bytes(value));
    }

    fn zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }

    fn base(&mut self, base: &BaseRecord) {
        self.u64(base.id.0);
        self.i64(base.rank.0);
    }

    fn topology(&mut self, topology: &Topology) {
        self.i64(topology.group);
        self.i64(topology.chassis);
        self.i64(topology.blade);
        self.i64(topology.node);
    }

    fn int_counters(&mut self, counters: &Counters<u64>) -> Result<()> {
        self.check_counters(counters, Namespace::Integer)?;
        for value in counters.values() {
            self.u64(*value);
        }
        Ok(())
    }

    fn float_counters(&mut self, counters: &Counters<f64>, family: FloatFamily) -> Result<()> {
        self.check_counters(counters, Namespace::Float(Some(family)))?;
        for value in counters.values() {
            self.f64(*value);
        }
        Ok(())
    }

    fn node_name(&mut self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() > APMPI_NODE_NAME_LEN {
            return Err(Error::NodeNameTooLong(bytes.len()));
        }
        self.buf.extend_from_slice(bytes);
        self.zeros(APMPI_NODE_NAME_LEN - bytes.len());
        Ok(())
    }
}

pub fn encode_header(record: &HeaderRecord, order: ByteOrder) -> Result<Vec<u8>> {
    let schema = schema::schema(record.module())?;
    let mut w = Writer::new(schema, RecordKind::Header, order);
    w.base(record.base());
    w.u64(record.magic());
    match record {
        HeaderRecord::Apcxi(h) => {
            w.i64(h.nblades);
            w.i64(h.nchassis);
            w.i64(h.nslots);
            w.i64(h.ngroups);
            w.u64(h.appid);
        }
        HeaderRecord::Apmpi(h) => {
            w.u32(h.sync_flag);
            w.zeros(4);
            w.f64(h.variance_total_mpitime);
            w.f64(h.variance_total_mpisynctime);
        }
        HeaderRecord::Apss(h) => {
            w.i64(h.nblades);
            w.i64(h.nchassis);
            w.i64(h.ngroups);
            w.u64(h.appid);
        }
        HeaderRecord::Apxc(h) => {
            w.i64(h.nblades);
            w.i64(h.nchassis);
            w.i64(h.ngroups);
            w.i64(h.memory_mode.encode());
            w.i64(h.cluster_mode.encode());
            w.u64(h.appid);
        }
    }
    w.finish()
}

pub fn encode_perf_record(record: &PerfRecord, order: ByteOrder) -> Result<Vec<u8>> {
    let schema = schema::schema(record.module())?;
    let mut w = Writer::new(schema, RecordKind::Performance, order);
    w.base(record.base());
    match record {
        PerfRecord::Apcxi(p) => {
            w.i64(p.group);
            w.i64(p.chassis);
            w.i64(p.slot);
            w.i64(p.blade);
            w.i64(p.node);
            w.int_counters(&p.counters)?;
        }
        PerfRecord::Apmpi(p) => {
            w.int_counters(&p.counters)?;
            w.float_counters(&p.total_time, FloatFamily::TotalTime)?;
            w.float_counters(&p.sync_time, FloatFamily::SyncTime)?;
            w.float_counters(&p.global_time, FloatFamily::GlobalTime)?;
            w.node_name(&p.node_name)?;
        }
        PerfRecord::Apss(p) => {
            w.topology(&p.topology);
            w.int_counters(&p.counters)?;
        }
        PerfRecord::Apxc(p) => {
            w.topology(&p.topology);
            w.int_counters(&p.counters)?;
        }
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MagicCheck};
    use crate::record::{
        ApcxiHeader, ApcxiPerf, ApmpiHeader, ApmpiPerf, ApssHeader, ApssPerf, ApxcHeader, ApxcPerf,
        ClusterMode, MemoryMode, Mode, Rank, RecordID,
    };
    use crate::schema::{
        counter_names, Module, APCXI_MAGIC, APMPI_MAGIC, APSS_MAGIC, APXC_MAGIC,
    };
    use crate::serialize::{decode_header, decode_perf_record, Decoder};

    fn base(rank: i64) -> BaseRecord {
        BaseRecord {
            id: RecordID(0xdead_beef),
            rank: Rank(rank),
        }
    }

    fn ints(module: Module) -> Counters<u64> {
        let names = counter_names(module, Namespace::Integer).unwrap();
        let values = (0..names.len() as u64).map(|i| i * 3 + 1).collect();
        Counters::new(module, Namespace::Integer, names, values).unwrap()
    }

    fn floats(family: FloatFamily) -> Counters<f64> {
        let namespace = Namespace::Float(Some(family));
        let names = counter_names(Module::Apmpi, namespace).unwrap();
        let values = (0..names.len()).map(|i| i as f64 / 8.0).collect();
        Counters::new(Module::Apmpi, namespace, names, values).unwrap()
    }

    fn apmpi_perf(node_name: &str) -> PerfRecord {
        PerfRecord::Apmpi(ApmpiPerf {
            base: base(12),
            counters: ints(Module::Apmpi),
            total_time: floats(FloatFamily::TotalTime),
            sync_time: floats(FloatFamily::SyncTime),
            global_time: floats(FloatFamily::GlobalTime),
            node_name: node_name.to_owned(),
        })
    }

    #[test]
    fn test_apcxi_round_trip() {
        let perf = PerfRecord::Apcxi(ApcxiPerf {
            base: base(0),
            group: 1,
            chassis: 2,
            slot: 3,
            blade: 4,
            node: 5,
            counters: ints(Module::Apcxi),
        });
        let buf = encode_perf_record(&perf, ByteOrder::Native).unwrap();
        assert_eq!(perf, decode_perf_record(&buf, Module::Apcxi).unwrap());

        let header = HeaderRecord::Apcxi(ApcxiHeader {
            base: base(-1),
            magic: APCXI_MAGIC,
            nblades: 4,
            nchassis: 2,
            nslots: 8,
            ngroups: 1,
            appid: 77,
        });
        let buf = encode_header(&header, ByteOrder::Native).unwrap();
        assert_eq!(header, decode_header(&buf, Module::Apcxi).unwrap());
    }

    #[test]
    fn test_apmpi_round_trip() {
        let perf = apmpi_perf("nid000123");
        let buf = encode_perf_record(&perf, ByteOrder::Native).unwrap();
        assert_eq!(buf.len(), 5232);
        assert_eq!(perf, decode_perf_record(&buf, Module::Apmpi).unwrap());

        let header = HeaderRecord::Apmpi(ApmpiHeader {
            base: base(-1),
            magic: APMPI_MAGIC,
            sync_flag: 1,
            variance_total_mpitime: 0.125,
            variance_total_mpisynctime: 2.5,
        });
        let buf = encode_header(&header, ByteOrder::Native).unwrap();
        assert_eq!(&buf[28..32], &[0; 4]);
        assert_eq!(header, decode_header(&buf, Module::Apmpi).unwrap());
    }

    #[test]
    fn test_apss_round_trip() {
        let perf = PerfRecord::Apss(ApssPerf {
            base: base(3),
            topology: Topology {
                group: 1,
                chassis: 2,
                blade: 3,
                node: 4,
            },
            counters: ints(Module::Apss),
        });
        let buf = encode_perf_record(&perf, ByteOrder::Native).unwrap();
        assert_eq!(buf.len(), 128);
        assert_eq!(perf, decode_perf_record(&buf, Module::Apss).unwrap());

        let header = HeaderRecord::Apss(ApssHeader {
            base: base(-1),
            magic: APSS_MAGIC,
            nblades: 6,
            nchassis: 3,
            ngroups: 2,
            appid: 4242,
        });
        let buf = encode_header(&header, ByteOrder::Native).unwrap();
        assert_eq!(buf.len(), 56);
        assert_eq!(header, decode_header(&buf, Module::Apss).unwrap());
    }

    #[test]
    fn test_apxc_round_trip() {
        let perf = PerfRecord::Apxc(ApxcPerf {
            base: base(9),
            topology: Topology {
                group: 0,
                chassis: 1,
                blade: 2,
                node: 3,
            },
            counters: ints(Module::Apxc),
        });
        let buf = encode_perf_record(&perf, ByteOrder::Native).unwrap();
        assert_eq!(perf, decode_perf_record(&buf, Module::Apxc).unwrap());

        let header = HeaderRecord::Apxc(ApxcHeader {
            base: base(-1),
            magic: APXC_MAGIC,
            nblades: 16,
            nchassis: 8,
            ngroups: 2,
            memory_mode: Mode::new(MemoryMode::Split, false),
            cluster_mode: Mode::new(ClusterMode::Snc4, true),
            appid: 5,
        });
        let buf = encode_header(&header, ByteOrder::Native).unwrap();
        assert_eq!(header, decode_header(&buf, Module::Apxc).unwrap());
    }

    #[test]
    fn test_big_endian_round_trip() {
        let perf = apmpi_perf("node01");
        let buf = encode_perf_record(&perf, ByteOrder::Big).unwrap();
        let decoder = Decoder::new(Config::new(ByteOrder::Big, MagicCheck::Strict));
        assert_eq!(perf, decoder.decode_perf_record(&buf, Module::Apmpi).unwrap());
    }

    #[test]
    fn test_foreign_counters() {
        let perf = PerfRecord::Apss(ApssPerf {
            base: base(3),
            topology: Topology::default(),
            counters: ints(Module::Apxc),
        });
        assert!(matches!(
            encode_perf_record(&perf, ByteOrder::Native),
            Err(Error::CounterLengthMismatch {
                module: Module::Apss,
                namespace: Namespace::Integer,
                names: 10,
                values: 392,
            })
        ));
    }

    #[test]
    fn test_swapped_float_family() {
        let PerfRecord::Apmpi(mut perf) = apmpi_perf("nid0") else {
            unreachable!()
        };
        std::mem::swap(&mut perf.sync_time, &mut perf.total_time);
        assert!(matches!(
            encode_perf_record(&PerfRecord::Apmpi(perf), ByteOrder::Native),
            Err(Error::CounterLengthMismatch {
                module: Module::Apmpi,
                names: 222,
                values: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_node_name_too_long() {
        let perf = apmpi_perf(&"n".repeat(APMPI_NODE_NAME_LEN + 1));
        assert!(matches!(
            encode_perf_record(&perf, ByteOrder::Native),
            Err(Error::NodeNameTooLong(129))
        ));
    }
}
