use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Module {
    #[serde(rename = "APCXI")]
    Apcxi,
    #[serde(rename = "APMPI")]
    Apmpi,
    #[serde(rename = "APSS")]
    Apss,
    #[serde(rename = "APXC")]
    Apxc,
}

impl Module {
    pub const ALL: [Module; 4] = [Module::Apcxi, Module::Apmpi, Module::Apss, Module::Apxc];

    pub fn name(self) -> &'static str {
        match self {
            Module::Apcxi => "APCXI",
            Module::Apmpi => "APMPI",
            Module::Apss => "APSS",
            Module::Apxc => "APXC",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Module {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Module::ALL
            .into_iter()
            .find(|module| module.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownModule(s.to_owned()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    Header,
    Performance,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Header => write!(f, "header"),
            RecordKind::Performance => write!(f, "performance"),
        }
    }
}

/// The floating point counter families of APMPI performance records, in
/// record order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FloatFamily {
    TotalTime,
    SyncTime,
    GlobalTime,
}

impl FloatFamily {
    pub const ALL: [FloatFamily; 3] = [
        FloatFamily::TotalTime,
        FloatFamily::SyncTime,
        FloatFamily::GlobalTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FloatFamily::TotalTime => "mpiop_totaltime",
            FloatFamily::SyncTime => "mpiop_synctime",
            FloatFamily::GlobalTime => "mpi_global",
        }
    }
}

impl fmt::Display for FloatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    Integer,
    Float(Option<FloatFamily>),
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Integer => write!(f, "integer"),
            Namespace::Float(None) => write!(f, "floating point"),
            Namespace::Float(Some(family)) => write!(f, "{} floating point", family),
        }
    }
}

pub const APCXI_VER: u32 = 1;
pub const APMPI_VER: u32 = 1;
pub const APSS_VER: u32 = 1;
pub const APXC_VER: u32 = 1;

/// "AUTOPERF" packed big-end first into a 64-bit integer.
pub const AUTOPERF_MAGIC: u64 = u64::from_be_bytes(*b"AUTOPERF");
pub const APCXI_MAGIC: u64 = AUTOPERF_MAGIC;
pub const APSS_MAGIC: u64 = AUTOPERF_MAGIC;
pub const APXC_MAGIC: u64 = AUTOPERF_MAGIC;
/// "APMPI" packed the same way.
pub const APMPI_MAGIC: u64 = 0x41_50_4d_50_49;

pub const APCXI_NUM_INDICES: usize = 50;
pub const APMPI_NUM_INDICES: usize = 396;
pub const APMPI_F_MPIOP_TOTALTIME_NUM_INDICES: usize = 222;
pub const APMPI_F_MPIOP_SYNCTIME_NUM_INDICES: usize = 16;
pub const APMPI_F_MPI_GLOBAL_NUM_INDICES: usize = 2;
pub const APSS_NUM_INDICES: usize = 10;
pub const APXC_NUM_INDICES: usize = 392;

pub const APMPI_NODE_NAME_LEN: usize = 128;

pub const BASE_RECORD_SIZE: usize = 16;

// Layouts, all fields 8 bytes except the APMPI sync flag, which is padded to
// the following double.
pub const APCXI_HEADER_SIZE: usize = BASE_RECORD_SIZE + 6 * 8;
pub const APCXI_PERF_SIZE: usize = BASE_RECORD_SIZE + 5 * 8 + APCXI_NUM_INDICES * 8;
pub const APMPI_HEADER_SIZE: usize = BASE_RECORD_SIZE + 8 + 4 + 4 + 2 * 8;
pub const APMPI_PERF_SIZE: usize = BASE_RECORD_SIZE
    + APMPI_NUM_INDICES * 8
    + APMPI_F_MPIOP_TOTALTIME_NUM_INDICES * 8
    + APMPI_F_MPIOP_SYNCTIME_NUM_INDICES * 8
    + APMPI_F_MPI_GLOBAL_NUM_INDICES * 8
    + APMPI_NODE_NAME_LEN;
pub const APSS_HEADER_SIZE: usize = BASE_RECORD_SIZE + 5 * 8;
pub const APSS_PERF_SIZE: usize = BASE_RECORD_SIZE + 4 * 8 + APSS_NUM_INDICES * 8;
pub const APXC_HEADER_SIZE: usize = BASE_RECORD_SIZE + 7 * 8;
pub const APXC_PERF_SIZE: usize = BASE_RECORD_SIZE + 4 * 8 + APXC_NUM_INDICES * 8;

/// Number of slots the record layout reserves for a counter namespace.
pub fn declared_len(module: Module, namespace: Namespace) -> Option<usize> {
    match (module, namespace) {
        (Module::Apcxi, Namespace::Integer) => Some(APCXI_NUM_INDICES),
        (Module::Apmpi, Namespace::Integer) => Some(APMPI_NUM_INDICES),
        (Module::Apmpi, Namespace::Float(Some(FloatFamily::TotalTime))) => {
            Some(APMPI_F_MPIOP_TOTALTIME_NUM_INDICES)
        }
        (Module::Apmpi, Namespace::Float(Some(FloatFamily::SyncTime))) => {
            Some(APMPI_F_MPIOP_SYNCTIME_NUM_INDICES)
        }
        (Module::Apmpi, Namespace::Float(Some(FloatFamily::GlobalTime))) => {
            Some(APMPI_F_MPI_GLOBAL_NUM_INDICES)
        }
        (Module::Apss, Namespace::Integer) => Some(APSS_NUM_INDICES),
        (Module::Apxc, Namespace::Integer) => Some(APXC_NUM_INDICES),
        _ => None,
    }
}

// Cassini NIC counters, also the source of the Slingshot (APSS) subset.
#[rustfmt::skip]
const CXI_COUNTERS: [&str; APCXI_NUM_INDICES] = [
    "CQ_CQ_OXE_NUM_STALLS",
    "CQ_CQ_OXE_NUM_FLITS",
    "CQ_CYCLES_BLOCKED_0", "CQ_CYCLES_BLOCKED_1", "CQ_CYCLES_BLOCKED_2", "CQ_CYCLES_BLOCKED_3",
    "HNI_RX_PAUSED_0", "HNI_RX_PAUSED_1", "HNI_RX_PAUSED_2", "HNI_RX_PAUSED_3",
    "HNI_RX_PAUSED_4", "HNI_RX_PAUSED_5", "HNI_RX_PAUSED_6", "HNI_RX_PAUSED_7",
    "HNI_TX_PAUSED_0", "HNI_TX_PAUSED_1", "HNI_TX_PAUSED_2", "HNI_TX_PAUSED_3",
    "HNI_TX_PAUSED_4", "HNI_TX_PAUSED_5", "HNI_TX_PAUSED_6", "HNI_TX_PAUSED_7",
    "HNI_PKTS_SENT_BY_TC_0", "HNI_PKTS_SENT_BY_TC_1", "HNI_PKTS_SENT_BY_TC_2", "HNI_PKTS_SENT_BY_TC_3",
    "HNI_PKTS_SENT_BY_TC_4", "HNI_PKTS_SENT_BY_TC_5", "HNI_PKTS_SENT_BY_TC_6", "HNI_PKTS_SENT_BY_TC_7",
    "HNI_PKTS_RECV_BY_TC_0", "HNI_PKTS_RECV_BY_TC_1", "HNI_PKTS_RECV_BY_TC_2", "HNI_PKTS_RECV_BY_TC_3",
    "HNI_PKTS_RECV_BY_TC_4", "HNI_PKTS_RECV_BY_TC_5", "HNI_PKTS_RECV_BY_TC_6", "HNI_PKTS_RECV_BY_TC_7",
    "HNI_TX_OK_27",
    "HNI_TX_OK_35",
    "HNI_TX_OK_36_TO_63",
    "HNI_TX_OK_64",
    "HNI_TX_OK_65_TO_127",
    "HNI_TX_OK_128_TO_255",
    "HNI_TX_OK_256_TO_511",
    "HNI_TX_OK_512_TO_1023",
    "HNI_TX_OK_1024_TO_2047",
    "HNI_TX_OK_2048_TO_4095",
    "HNI_TX_OK_4096_TO_8191",
    "HNI_TX_OK_8192_TO_MAX",
];

fn apcxi_counter_names() -> Vec<String> {
    CXI_COUNTERS.iter().map(|c| format!("APCXI_{}", c)).collect()
}

fn apss_counter_names() -> Vec<String> {
    CXI_COUNTERS[..APSS_NUM_INDICES]
        .iter()
        .map(|c| format!("APSS_{}", c))
        .collect()
}

// Aries router: 5x8 router-router tiles, 2x4 processor (NIC) tiles.
const AR_RTR_ROWS: usize = 5;
const AR_RTR_COLS: usize = 8;
const AR_RTR_PT_ROWS: usize = 2;
const AR_RTR_PT_COLS: usize = 4;

fn apxc_counter_names() -> Vec<String> {
    let mut names = Vec::with_capacity(APXC_NUM_INDICES);
    for row in 0..AR_RTR_ROWS {
        for col in 0..AR_RTR_COLS {
            for vc in 0..8 {
                names.push(format!(
                    "APXC_AR_RTR_{}_{}_INQ_PRF_INCOMING_FLIT_VC{}",
                    row, col, vc
                ));
            }
            names.push(format!("APXC_AR_RTR_{}_{}_INQ_PRF_ROWBUS_STALL_CNT", row, col));
        }
    }
    for row in 0..AR_RTR_PT_ROWS {
        for col in 0..AR_RTR_PT_COLS {
            let tile = format!("APXC_AR_RTR_PT_{}_{}", row, col);
            names.push(format!("{}_INQ_PRF_INCOMING_FLIT_VC0", tile));
            names.push(format!("{}_INQ_PRF_INCOMING_FLIT_VC4", tile));
            names.push(format!("{}_INQ_PRF_REQ_ROWBUS_STALL_CNT", tile));
            names.push(format!("{}_INQ_PRF_RSP_ROWBUS_STALL_CNT", tile));
        }
    }
    names
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum OpCounters {
    // call count, total bytes and the message size histogram
    Data,
    CallOnly,
}

#[derive(Debug, Copy, Clone)]
struct MpiOp {
    name: &'static str,
    counters: OpCounters,
    sync: bool,
}

const fn data(name: &'static str) -> MpiOp {
    MpiOp {
        name,
        counters: OpCounters::Data,
        sync: false,
    }
}

const fn call(name: &'static str) -> MpiOp {
    MpiOp {
        name,
        counters: OpCounters::CallOnly,
        sync: false,
    }
}

const fn synced(op: MpiOp) -> MpiOp {
    MpiOp { sync: true, ..op }
}

#[rustfmt::skip]
const APMPI_OPS: [MpiOp; 74] = [
    // blocking point-to-point
    data("MPI_SEND"), data("MPI_SSEND"), data("MPI_RSEND"), data("MPI_BSEND"),
    data("MPI_SEND_INIT"), data("MPI_SSEND_INIT"), data("MPI_RSEND_INIT"), data("MPI_BSEND_INIT"),
    data("MPI_RECV"), data("MPI_RECV_INIT"), data("MPI_SENDRECV"), data("MPI_SENDRECV_REPLACE"),
    // non-blocking point-to-point
    data("MPI_ISEND"), data("MPI_ISSEND"), data("MPI_IRSEND"), data("MPI_IBSEND"), data("MPI_IRECV"),
    // point-to-point completion and probing
    call("MPI_PROBE"), call("MPI_IPROBE"),
    call("MPI_TEST"), call("MPI_TESTANY"), call("MPI_TESTALL"), call("MPI_TESTSOME"),
    call("MPI_WAIT"), call("MPI_WAITANY"), call("MPI_WAITALL"), call("MPI_WAITSOME"),
    call("MPI_START"), call("MPI_STARTALL"),
    // collective synchronization
    synced(call("MPI_BARRIER")),
    // blocking collectives
    synced(data("MPI_BCAST")), synced(data("MPI_GATHER")), synced(data("MPI_GATHERV")),
    synced(data("MPI_SCATTER")), synced(data("MPI_SCATTERV")), synced(data("MPI_SCAN")),
    synced(data("MPI_EXSCAN")), synced(data("MPI_ALLGATHER")), synced(data("MPI_ALLGATHERV")),
    synced(data("MPI_REDUCE")), synced(data("MPI_ALLREDUCE")), synced(data("MPI_REDUCE_SCATTER")),
    synced(data("MPI_ALLTOALL")), synced(data("MPI_ALLTOALLV")), synced(data("MPI_ALLTOALLW")),
    // one-sided communication
    data("MPI_PUT"), data("MPI_GET"), data("MPI_ACCUMULATE"), data("MPI_GET_ACCUMULATE"),
    data("MPI_FETCH_AND_OP"), data("MPI_COMPARE_AND_SWAP"),
    data("MPI_RPUT"), data("MPI_RGET"), data("MPI_RACCUMULATE"), data("MPI_RGET_ACCUMULATE"),
    // neighborhood collectives
    data("MPI_NEIGHBOR_ALLGATHER"), data("MPI_NEIGHBOR_ALLGATHERV"),
    data("MPI_NEIGHBOR_ALLTOALL"), data("MPI_NEIGHBOR_ALLTOALLV"),
    // one-sided synchronization
    call("MPI_WIN_FENCE"), call("MPI_WIN_START"), call("MPI_WIN_COMPLETE"), call("MPI_WIN_POST"),
    call("MPI_WIN_WAIT"), call("MPI_WIN_TEST"), call("MPI_WIN_LOCK"), call("MPI_WIN_UNLOCK"),
    call("MPI_WIN_LOCK_ALL"), call("MPI_WIN_UNLOCK_ALL"), call("MPI_WIN_FLUSH"),
    call("MPI_WIN_FLUSH_ALL"), call("MPI_WIN_FLUSH_LOCAL"), call("MPI_WIN_FLUSH_LOCAL_ALL"),
    call("MPI_WIN_SYNC"),
];

pub const APMPI_MSG_SIZE_BUCKETS: [&str; 6] = [
    "MSG_SIZE_AGG_0_256",
    "MSG_SIZE_AGG_256_1K",
    "MSG_SIZE_AGG_1K_8K",
    "MSG_SIZE_AGG_8K_256K",
    "MSG_SIZE_AGG_256K_1M",
    "MSG_SIZE_AGG_1M_PLUS",
];

fn apmpi_counter_names() -> Vec<String> {
    let mut names = Vec::with_capacity(APMPI_NUM_INDICES);
    for op in &APMPI_OPS {
        names.push(format!("{}_CALL_COUNT", op.name));
        if op.counters == OpCounters::Data {
            names.push(format!("{}_TOTAL_BYTES", op.name));
            for bucket in APMPI_MSG_SIZE_BUCKETS {
                names.push(format!("{}_{}", op.name, bucket));
            }
        }
    }
    names
}

fn apmpi_float_counter_names(family: FloatFamily) -> Vec<String> {
    match family {
        FloatFamily::TotalTime => APMPI_OPS
            .iter()
            .flat_map(|op| {
                ["TOTAL_TIME", "MIN_TIME", "MAX_TIME"]
                    .into_iter()
                    .map(move |suffix| format!("{}_{}", op.name, suffix))
            })
            .collect(),
        FloatFamily::SyncTime => APMPI_OPS
            .iter()
            .filter(|op| op.sync)
            .map(|op| format!("{}_TOTAL_SYNC_TIME", op.name))
            .collect(),
        FloatFamily::GlobalTime => vec![
            "MPI_TOTAL_COMM_TIME".to_owned(),
            "MPI_TOTAL_COMM_SYNC_TIME".to_owned(),
        ],
    }
}

#[derive(Debug, Clone)]
pub struct ModuleSchema {
    module: Module,
    version: u32,
    magic: u64,
    header_size: usize,
    perf_size: usize,
    counters: Vec<String>,
    float_counters: Vec<(FloatFamily, Vec<String>)>,
}

impl ModuleSchema {
    pub(crate) fn new(
        module: Module,
        version: u32,
        magic: u64,
        header_size: usize,
        perf_size: usize,
        counters: Vec<String>,
        float_counters: Vec<(FloatFamily, Vec<String>)>,
    ) -> Self {
        ModuleSchema {
            module,
            version,
            magic,
            header_size,
            perf_size,
            counters,
            float_counters,
        }
    }

    fn for_module(module: Module) -> Self {
        match module {
            Module::Apcxi => ModuleSchema::new(
                module,
                APCXI_VER,
                APCXI_MAGIC,
                APCXI_HEADER_SIZE,
                APCXI_PERF_SIZE,
                apcxi_counter_names(),
                Vec::new(),
            ),
            Module::Apmpi => ModuleSchema::new(
                module,
                APMPI_VER,
                APMPI_MAGIC,
                APMPI_HEADER_SIZE,
                APMPI_PERF_SIZE,
                apmpi_counter_names(),
                FloatFamily::ALL
                    .into_iter()
                    .map(|family| (family, apmpi_float_counter_names(family)))
                    .collect(),
            ),
            Module::Apss => ModuleSchema::new(
                module,
                APSS_VER,
                APSS_MAGIC,
                APSS_HEADER_SIZE,
                APSS_PERF_SIZE,
                apss_counter_names(),
                Vec::new(),
            ),
            Module::Apxc => ModuleSchema::new(
                module,
                APXC_VER,
                APXC_MAGIC,
                APXC_HEADER_SIZE,
                APXC_PERF_SIZE,
                apxc_counter_names(),
                Vec::new(),
            ),
        }
    }

    pub fn module(&self) -> Module {
        self.module
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn magic(&self) -> u64 {
        self.magic
    }

    pub fn record_size(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Header => self.header_size,
            RecordKind::Performance => self.perf_size,
        }
    }

    pub fn counter_names(&self, namespace: Namespace) -> Result<&[String]> {
        match namespace {
            Namespace::Integer => Ok(&self.counters),
            Namespace::Float(None) => match self.float_counters.as_slice() {
                [] => Err(Error::MissingNamespace {
                    module: self.module,
                    namespace,
                }),
                [(_, names)] => Ok(names),
                _ => Err(Error::AmbiguousNamespace(self.module)),
            },
            Namespace::Float(Some(family)) => self
                .float_counters
                .iter()
                .find(|(f, _)| *f == family)
                .map(|(_, names)| names.as_slice())
                .ok_or(Error::MissingNamespace {
                    module: self.module,
                    namespace,
                }),
        }
    }

    fn namespaces(&self) -> impl Iterator<Item = (Namespace, &[String])> {
        std::iter::once((Namespace::Integer, self.counters.as_slice())).chain(
            self.float_counters
                .iter()
                .map(|(family, names)| (Namespace::Float(Some(*family)), names.as_slice())),
        )
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = BTreeSet::new();
        for (namespace, names) in self.namespaces() {
            let declared = declared_len(self.module, namespace).ok_or_else(|| {
                format!("{} has no {} counter array", self.module, namespace)
            })?;
            if names.len() != declared {
                return Err(format!(
                    "{} {} counters: {} names for {} slots",
                    self.module,
                    namespace,
                    names.len(),
                    declared
                ));
            }
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(format!("{} counter {} is named twice", self.module, name));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Registry {
    schemas: Vec<ModuleSchema>,
}

impl Registry {
    fn build() -> std::result::Result<Registry, String> {
        let schemas: Vec<_> = Module::ALL
            .into_iter()
            .map(ModuleSchema::for_module)
            .collect();
        for schema in &schemas {
            schema.validate()?;
            log::debug!(
                "registered {} schema: {} byte header, {} byte records",
                schema.module,
                schema.header_size,
                schema.perf_size
            );
        }
        Ok(Registry { schemas })
    }

    pub fn schema(&self, module: Module) -> &ModuleSchema {
        &self.schemas[module.index()]
    }
}

static REGISTRY: LazyLock<std::result::Result<Registry, String>> = LazyLock::new(Registry::build);

pub fn registry() -> Result<&'static Registry> {
    REGISTRY
        .as_ref()
        .map_err(|msg| Error::InvalidSchema(msg.clone()))
}

pub fn schema(module: Module) -> Result<&'static ModuleSchema> {
    Ok(registry()?.schema(module))
}

/// Ordered counter names of one namespace of a module.
pub fn counter_names(module: Module, namespace: Namespace) -> Result<&'static [String]> {
    schema(module)?.counter_names(namespace)
}
