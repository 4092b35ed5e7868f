use std::collections::BTreeMap;
use std::fmt;

use derive_more::{Display, From};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Error, Result};
use crate::schema::{Module, Namespace, RecordKind};

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, serde::Serialize,
)]
#[serde(transparent)]
pub struct RecordID(pub u64);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, serde::Serialize,
)]
#[serde(transparent)]
pub struct Rank(pub i64);

impl Rank {
    /// Records that aggregate every rank of the job.
    pub const ALL: Rank = Rank(-1);

    pub fn is_all(self) -> bool {
        self == Rank::ALL
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BaseRecord {
    pub id: RecordID,
    pub rank: Rank,
}

/// Position of a node in the machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct Topology {
    pub group: i64,
    pub chassis: i64,
    pub blade: i64,
    pub node: i64,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, serde::Serialize,
)]
#[repr(u32)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    Unknown = 0,
    Flat = 1,
    Equal = 2,
    Split = 3,
    Cache = 4,
}

impl MemoryMode {
    pub fn name(self) -> &'static str {
        match self {
            MemoryMode::Unknown => "unknown",
            MemoryMode::Flat => "flat",
            MemoryMode::Equal => "equal",
            MemoryMode::Split => "split",
            MemoryMode::Cache => "cache",
        }
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, serde::Serialize,
)]
#[repr(u32)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    Unknown = 0,
    All2all = 1,
    Quad = 2,
    Hemi = 3,
    Snc4 = 4,
    Snc2 = 5,
}

impl ClusterMode {
    pub fn name(self) -> &'static str {
        match self {
            ClusterMode::Unknown => "unknown",
            ClusterMode::All2all => "all2all",
            ClusterMode::Quad => "quad",
            ClusterMode::Hemi => "hemi",
            ClusterMode::Snc4 => "snc4",
            ClusterMode::Snc2 => "snc2",
        }
    }
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set by the writer when the nodes of the job disagreed on the mode.
pub const MODE_INCONSISTENT_BIT: i64 = 1 << 31;

/// A processor mode as reported in the APXC header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Mode<T> {
    pub value: T,
    pub consistent: bool,
}

impl<T> Mode<T>
where
    T: TryFromPrimitive<Primitive = u32> + Into<u32> + Copy,
{
    pub fn new(value: T, consistent: bool) -> Self {
        Mode { value, consistent }
    }

    pub fn decode(field: &'static str, raw: i64) -> Result<Self> {
        let masked = raw & !MODE_INCONSISTENT_BIT;
        let value = u32::try_from(masked)
            .ok()
            .and_then(|index| T::try_from_primitive(index).ok())
            .ok_or(Error::ModeOutOfRange {
                field,
                value: masked,
            })?;
        Ok(Mode {
            value,
            consistent: raw & MODE_INCONSISTENT_BIT == 0,
        })
    }

    pub fn encode(self) -> i64 {
        let index: u32 = self.value.into();
        let flag = if self.consistent {
            0
        } else {
            MODE_INCONSISTENT_BIT
        };
        i64::from(index) | flag
    }
}

/// One counter array of a record, zipped with the names of its namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Counters<T> {
    module: Module,
    namespace: Namespace,
    names: &'static [String],
    values: Vec<T>,
}

impl<T: Copy> Counters<T> {
    pub fn new(
        module: Module,
        namespace: Namespace,
        names: &'static [String],
        values: Vec<T>,
    ) -> Result<Self> {
        if names.len() != values.len() {
            return Err(Error::CounterLengthMismatch {
                module,
                namespace,
                names: names.len(),
                values: values.len(),
            });
        }
        Ok(Counters {
            module,
            namespace,
            names,
            values,
        })
    }

    pub fn module(&self) -> Module {
        self.module
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn names(&self) -> &'static [String] {
        self.names
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|index| self.values[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, T)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

impl<T: Serialize + Copy> Serialize for Counters<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum CounterValue {
    Int(u64),
    Float(f64),
}

impl fmt::Display for CounterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterValue::Int(value) => write!(f, "{}", value),
            CounterValue::Float(value) => write!(f, "{:.6}", value),
        }
    }
}

pub type CounterMap = BTreeMap<&'static str, CounterValue>;

fn merge_into<T: Copy>(
    map: &mut CounterMap,
    counters: &Counters<T>,
    wrap: fn(T) -> CounterValue,
) -> Result<()> {
    for (name, value) in counters.iter() {
        if map.insert(name, wrap(value)).is_some() {
            return Err(Error::CounterNameCollision(name.to_owned()));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApcxiHeader {
    pub base: BaseRecord,
    pub magic: u64,
    pub nblades: i64,
    pub nchassis: i64,
    pub nslots: i64,
    pub ngroups: i64,
    pub appid: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApmpiHeader {
    pub base: BaseRecord,
    pub magic: u64,
    pub sync_flag: u32,
    pub variance_total_mpitime: f64,
    pub variance_total_mpisynctime: f64,
}

impl ApmpiHeader {
    /// Whether the job was profiled with synchronization timing, which is
    /// what makes the sync-time counters meaningful.
    pub fn has_sync(&self) -> bool {
        self.sync_flag != 0
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApssHeader {
    pub base: BaseRecord,
    pub magic: u64,
    pub nblades: i64,
    pub nchassis: i64,
    pub ngroups: i64,
    pub appid: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApxcHeader {
    pub base: BaseRecord,
    pub magic: u64,
    pub nblades: i64,
    pub nchassis: i64,
    pub ngroups: i64,
    pub memory_mode: Mode<MemoryMode>,
    pub cluster_mode: Mode<ClusterMode>,
    pub appid: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApcxiPerf {
    pub base: BaseRecord,
    pub group: i64,
    pub chassis: i64,
    pub slot: i64,
    pub blade: i64,
    pub node: i64,
    pub counters: Counters<u64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApmpiPerf {
    pub base: BaseRecord,
    pub counters: Counters<u64>,
    pub total_time: Counters<f64>,
    pub sync_time: Counters<f64>,
    pub global_time: Counters<f64>,
    pub node_name: String,
}

impl ApmpiPerf {
    /// All four counter sets in one map.
    pub fn all_counters(&self) -> Result<CounterMap> {
        let mut map = CounterMap::new();
        merge_into(&mut map, &self.counters, CounterValue::Int)?;
        merge_into(&mut map, &self.total_time, CounterValue::Float)?;
        merge_into(&mut map, &self.sync_time, CounterValue::Float)?;
        merge_into(&mut map, &self.global_time, CounterValue::Float)?;
        Ok(map)
    }

    pub fn total_comm_time(&self) -> f64 {
        self.global_time.get("MPI_TOTAL_COMM_TIME").unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApssPerf {
    pub base: BaseRecord,
    #[serde(flatten)]
    pub topology: Topology,
    pub counters: Counters<u64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ApxcPerf {
    pub base: BaseRecord,
    #[serde(flatten)]
    pub topology: Topology,
    pub counters: Counters<u64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "module", rename_all = "UPPERCASE")]
pub enum HeaderRecord {
    Apcxi(ApcxiHeader),
    Apmpi(ApmpiHeader),
    Apss(ApssHeader),
    Apxc(ApxcHeader),
}

impl HeaderRecord {
    pub fn module(&self) -> Module {
        match self {
            HeaderRecord::Apcxi(_) => Module::Apcxi,
            HeaderRecord::Apmpi(_) => Module::Apmpi,
            HeaderRecord::Apss(_) => Module::Apss,
            HeaderRecord::Apxc(_) => Module::Apxc,
        }
    }

    pub fn base(&self) -> &BaseRecord {
        match self {
            HeaderRecord::Apcxi(h) => &h.base,
            HeaderRecord::Apmpi(h) => &h.base,
            HeaderRecord::Apss(h) => &h.base,
            HeaderRecord::Apxc(h) => &h.base,
        }
    }

    pub fn magic(&self) -> u64 {
        match self {
            HeaderRecord::Apcxi(h) => h.magic,
            HeaderRecord::Apmpi(h) => h.magic,
            HeaderRecord::Apss(h) => h.magic,
            HeaderRecord::Apxc(h) => h.magic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "module", rename_all = "UPPERCASE")]
pub enum PerfRecord {
    Apcxi(ApcxiPerf),
    Apmpi(ApmpiPerf),
    Apss(ApssPerf),
    Apxc(ApxcPerf),
}

impl PerfRecord {
    pub fn module(&self) -> Module {
        match self {
            PerfRecord::Apcxi(_) => Module::Apcxi,
            PerfRecord::Apmpi(_) => Module::Apmpi,
            PerfRecord::Apss(_) => Module::Apss,
            PerfRecord::Apxc(_) => Module::Apxc,
        }
    }

    pub fn base(&self) -> &BaseRecord {
        match self {
            PerfRecord::Apcxi(p) => &p.base,
            PerfRecord::Apmpi(p) => &p.base,
            PerfRecord::Apss(p) => &p.base,
            PerfRecord::Apxc(p) => &p.base,
        }
    }

    /// The integer counters every module carries.
    pub fn counters(&self) -> &Counters<u64> {
        match self {
            PerfRecord::Apcxi(p) => &p.counters,
            PerfRecord::Apmpi(p) => &p.counters,
            PerfRecord::Apss(p) => &p.counters,
            PerfRecord::Apxc(p) => &p.counters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum Record {
    Header(HeaderRecord),
    Perf(PerfRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Header(_) => RecordKind::Header,
            Record::Perf(_) => RecordKind::Performance,
        }
    }

    pub fn module(&self) -> Module {
        match self {
            Record::Header(h) => h.module(),
            Record::Perf(p) => p.module(),
        }
    }

    pub fn base(&self) -> &BaseRecord {
        match self {
            Record::Header(h) => h.base(),
            Record::Perf(p) => p.base(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{counter_names, FloatFamily};

    fn leak_names(names: &[&str]) -> &'static [String] {
        Box::leak(names.iter().map(|n| n.to_string()).collect::<Vec<_>>().into_boxed_slice())
    }

    fn base() -> BaseRecord {
        BaseRecord {
            id: RecordID(7),
            rank: Rank(3),
        }
    }

    #[test]
    fn test_rank_all() {
        assert!(Rank(-1).is_all());
        assert!(!Rank(0).is_all());
        assert_eq!(Rank::ALL.to_string(), "-1");
    }

    #[test]
    fn test_mode_decode() {
        let mode = Mode::<MemoryMode>::decode("memory_mode", (1 << 31) | 2).unwrap();
        assert_eq!(mode, Mode::new(MemoryMode::Equal, false));

        let mode = Mode::<MemoryMode>::decode("memory_mode", 4).unwrap();
        assert_eq!(mode, Mode::new(MemoryMode::Cache, true));

        let mode = Mode::<ClusterMode>::decode("cluster_mode", 5).unwrap();
        assert_eq!(mode.value, ClusterMode::Snc2);
    }

    #[test]
    fn test_mode_out_of_range() {
        assert!(matches!(
            Mode::<MemoryMode>::decode("memory_mode", 7),
            Err(Error::ModeOutOfRange {
                field: "memory_mode",
                value: 7
            })
        ));
        assert!(matches!(
            Mode::<MemoryMode>::decode("memory_mode", 5),
            Err(Error::ModeOutOfRange { .. })
        ));
        assert!(matches!(
            Mode::<ClusterMode>::decode("cluster_mode", -1),
            Err(Error::ModeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_mode_encode() {
        assert_eq!(Mode::new(ClusterMode::Quad, true).encode(), 2);
        assert_eq!(Mode::new(MemoryMode::Flat, false).encode(), (1 << 31) | 1);
    }

    #[test]
    fn test_counters_length_mismatch() {
        let names = counter_names(Module::Apss, Namespace::Integer).unwrap();
        assert!(matches!(
            Counters::new(Module::Apss, Namespace::Integer, names, vec![0u64; 9]),
            Err(Error::CounterLengthMismatch {
                names: 10,
                values: 9,
                ..
            })
        ));
    }

    #[test]
    fn test_counters_get() {
        let names = counter_names(Module::Apss, Namespace::Integer).unwrap();
        let counters =
            Counters::new(Module::Apss, Namespace::Integer, names, (0..10).collect()).unwrap();
        assert_eq!(counters.get("APSS_HNI_RX_PAUSED_0"), Some(6));
        assert_eq!(counters.get("APSS_BOGUS"), None);
        assert_eq!(counters.iter().count(), 10);
    }

    #[test]
    fn test_counters_serialize() {
        let names = leak_names(&["A", "B"]);
        let counters = Counters::new(Module::Apss, Namespace::Integer, names, vec![1u64, 2]).unwrap();
        assert_eq!(serde_json::to_string(&counters).unwrap(), r#"{"A":1,"B":2}"#);
    }

    fn apmpi_perf(int_names: &'static [String], time_names: &'static [String]) -> ApmpiPerf {
        let float = |family, names: &'static [String], value| {
            Counters::new(
                Module::Apmpi,
                Namespace::Float(Some(family)),
                names,
                vec![value; names.len()],
            )
            .unwrap()
        };
        ApmpiPerf {
            base: base(),
            counters: Counters::new(
                Module::Apmpi,
                Namespace::Integer,
                int_names,
                vec![1; int_names.len()],
            )
            .unwrap(),
            total_time: float(FloatFamily::TotalTime, time_names, 0.5),
            sync_time: float(FloatFamily::SyncTime, leak_names(&["S_TOTAL_SYNC_TIME"]), 0.25),
            global_time: float(FloatFamily::GlobalTime, leak_names(&["MPI_TOTAL_COMM_TIME"]), 2.0),
            node_name: "node01".to_owned(),
        }
    }

    #[test]
    fn test_all_counters() {
        let perf = apmpi_perf(leak_names(&["X_CALL_COUNT"]), leak_names(&["X_TOTAL_TIME"]));
        let map = perf.all_counters().unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map["X_CALL_COUNT"], CounterValue::Int(1));
        assert_eq!(map["X_TOTAL_TIME"], CounterValue::Float(0.5));
        assert_eq!(perf.total_comm_time(), 2.0);
    }

    #[test]
    fn test_all_counters_collision() {
        let perf = apmpi_perf(leak_names(&["X_TOTAL_TIME"]), leak_names(&["X_TOTAL_TIME"]));
        assert!(matches!(
            perf.all_counters(),
            Err(Error::CounterNameCollision(name)) if name == "X_TOTAL_TIME"
        ));
    }

    #[test]
    fn test_record_accessors() {
        let header = HeaderRecord::Apmpi(ApmpiHeader {
            base: BaseRecord {
                id: RecordID(1),
                rank: Rank::ALL,
            },
            magic: 0,
            sync_flag: 1,
            variance_total_mpitime: 0.0,
            variance_total_mpisynctime: 0.0,
        });
        let record = Record::Header(header);
        assert_eq!(record.module(), Module::Apmpi);
        assert_eq!(record.kind(), RecordKind::Header);
        assert!(record.base().rank.is_all());
    }
}
