use std::fmt::Display;
use std::io::{self, Write};

use crate::record::{BaseRecord, HeaderRecord, PerfRecord, Record};
use crate::schema::Module;

const APCXI_DESCRIPTION: &[&str] = &[
    "global summary stats for the APCXI module:",
    "  APCXI_GROUPS: total number of groups",
    "  APCXI_CHASSIS: total number of chassis",
    "  APCXI_SLOTS: total number of slots",
    "  APCXI_BLADES: total number of blades",
    "  APCXI_APPLICATION_ID: application id of the job",
    "per-node statistics for the APCXI module:",
    "  APCXI_GROUP: group this node is on",
    "  APCXI_CHASSIS: chassis this node is on",
    "  APCXI_SLOT: slot in the chassis this node is on",
    "  APCXI_BLADE: blade this node is on",
    "  APCXI_NODE: node number on the blade",
    "  APCXI_CQ_*: Cassini command queue stall and blocking counters",
    "  APCXI_HNI_*_PAUSED_[0-7]: pause frames per traffic class",
    "  APCXI_HNI_PKTS_*_BY_TC_[0-7]: packets sent and received per traffic class",
    "  APCXI_HNI_TX_OK_*: histogram of transmitted frame sizes",
];

const APMPI_DESCRIPTION: &[&str] = &[
    "global summary stats showing the variance across all MPI processes:",
    "  MPI_TOTAL_COMM_TIME_VARIANCE: variance in total communication time across all the processes.",
    "  MPI_TOTAL_COMM_SYNC_TIME_VARIANCE: variance in total sync time across all the processes, if enabled.",
    "per-process detailed stats on the usage of various MPI routines:",
    "  MPI_PROCESSOR_NAME: name of the processor used by the MPI process.",
    "  MPI_*_CALL_COUNT: total call count for an MPI op.",
    "  MPI_*_TOTAL_BYTES: total bytes (i.e., cumulative across all calls) moved with an MPI op.",
    "  MPI_*_MSG_SIZE_AGG_*: histogram of total bytes moved for all the calls of an MPI op.",
    "  MPI_*_TOTAL_TIME: total time (i.e, cumulative across all calls) of an MPI op.",
    "  MPI_*_MIN_TIME: minimum time across all calls of an MPI op.",
    "  MPI_*_MAX_TIME: maximum time across all calls of an MPI op.",
    "  MPI_*_TOTAL_SYNC_TIME: total sync time (cumulative across all calls of an op) of an MPI op, if enabled.",
    "  MPI_TOTAL_COMM_TIME: total communication (MPI) time of a process across all the MPI ops.",
    "  MPI_TOTAL_COMM_SYNC_TIME: total sync time of a process across all the MPI ops, if enabled.",
];

const APSS_DESCRIPTION: &[&str] = &[
    "global summary stats for the APSS module:",
    "  APSS_GROUPS: total number of groups",
    "  APSS_CHASSIS: total number of chassis",
    "  APSS_BLADES: total number of blades",
    "  APSS_APPLICATION_ID: application id of the job",
    "per-node statistics for the APSS module:",
    "  APSS_GROUP: group this node is on",
    "  APSS_CHASSIS: chassis this node is on",
    "  APSS_BLADE: blade this node is on",
    "  APSS_NODE: node number on the blade",
    "  APSS_CQ_*: Slingshot NIC command queue stall and blocking counters",
    "  APSS_HNI_RX_PAUSED_[0-3]: received pause frames per traffic class",
];

const APXC_DESCRIPTION: &[&str] = &[
    "global summary stats for the APXC module:",
    "  APXC_GROUPS: total number of groups",
    "  APXC_CHASSIS: total number of chassis",
    "  APXC_BLADES: total number of blades",
    "  APXC_MEMORY_MODE: Intel Xeon memory mode",
    "  APXC_CLUSTER_MODE: Intel Xeon NUMA configuration",
    "  APXC_MEMORY_MODE_CONSISTENT: Intel Xeon memory mode consistent across all nodes",
    "  APXC_CLUSTER_MODE_CONSISTENT: Intel Xeon cluster mode consistent across all nodes",
    "per-router statistics for the APXC module:",
    "  APXC_GROUP: group this router is on",
    "  APXC_CHASSIS: chassis this router is on",
    "  APXC_BLADE: blade this router is on",
    "  APXC_NODE: node connected to this router",
    "  APXC_AR_RTR_* port counters for the 40 router-router ports",
    "  APXC_AR_RTR_x_y_INQ_PRF_INCOMING_FLIT_VC[0-7]: flits on VCs of x y tile",
    "  APXC_AR_RTR_x_y_INQ_PRF_ROWBUS_STALL_CNT: stalls on x y tile",
    "  APXC_AR_RTR_PT_* port counters for the 8 router-nic ports",
    "  APXC_AR_RTR_PT_x_y_INQ_PRF_INCOMING_FLIT_VC[0,4]: flits on VCs of x y tile",
    "  APXC_AR_RTR_PT_x_y_INQ_PRF_REQ_ROWBUS_STALL_CNT: stalls on x y tile",
];

pub fn print_description<W: Write>(out: &mut W, module: Module) -> io::Result<()> {
    let lines = match module {
        Module::Apcxi => APCXI_DESCRIPTION,
        Module::Apmpi => APMPI_DESCRIPTION,
        Module::Apss => APSS_DESCRIPTION,
        Module::Apxc => APXC_DESCRIPTION,
    };
    writeln!(out)?;
    writeln!(out, "# description of {} counters:", module)?;
    for line in lines {
        writeln!(out, "#   {}", line)?;
    }
    Ok(())
}

/// One printed counter: its name and formatted value.
pub type Field = (&'static str, String);

/// Writes one darshan-parser line. The file name, mount point and file
/// system columns are always empty for these modules.
pub fn write_line<W: Write>(
    out: &mut W,
    prefix: &str,
    module: Module,
    base: &BaseRecord,
    name: &str,
    value: &str,
) -> io::Result<()> {
    writeln!(
        out,
        "{}{}\t{}\t{}\t{}\t{}\t\t\t",
        prefix, module, base.rank, base.id, name, value
    )
}

fn field<V: Display>(name: &'static str, value: V) -> Field {
    (name, value.to_string())
}

fn float(name: &'static str, value: f64) -> Field {
    (name, format!("{:.6}", value))
}

/// Prints records one counter per line. The header must come first: it
/// decides whether APMPI sync-time counters are printed.
#[derive(Debug, Default)]
pub struct TextPrinter {
    sync_flag: bool,
}

impl TextPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print<W: Write>(&mut self, out: &mut W, record: &Record) -> io::Result<()> {
        let module = record.module();
        let base = record.base();
        for (name, value) in self.fields(record) {
            write_line(out, "", module, base, name, &value)?;
        }
        Ok(())
    }

    /// Every counter the printer shows for `record`, in print order.
    pub fn fields(&mut self, record: &Record) -> Vec<Field> {
        match record {
            Record::Header(header) => self.header_fields(header),
            Record::Perf(perf) => self.perf_fields(perf),
        }
    }

    fn header_fields(&mut self, header: &HeaderRecord) -> Vec<Field> {
        match header {
            HeaderRecord::Apcxi(h) => vec![
                field("APCXI_GROUPS", h.ngroups),
                field("APCXI_CHASSIS", h.nchassis),
                field("APCXI_SLOTS", h.nslots),
                field("APCXI_BLADES", h.nblades),
                field("APCXI_APPLICATION_ID", h.appid),
            ],
            HeaderRecord::Apmpi(h) => {
                self.sync_flag = h.has_sync();
                let mut fields = vec![float(
                    "MPI_TOTAL_COMM_TIME_VARIANCE",
                    h.variance_total_mpitime,
                )];
                if self.sync_flag {
                    fields.push(float(
                        "MPI_TOTAL_COMM_SYNC_TIME_VARIANCE",
                        h.variance_total_mpisynctime,
                    ));
                }
                fields
            }
            HeaderRecord::Apss(h) => vec![
                field("APSS_GROUPS", h.ngroups),
                field("APSS_CHASSIS", h.nchassis),
                field("APSS_BLADES", h.nblades),
                field("APSS_APPLICATION_ID", h.appid),
            ],
            HeaderRecord::Apxc(h) => vec![
                field("APXC_GROUPS", h.ngroups),
                field("APXC_CHASSIS", h.nchassis),
                field("APXC_BLADES", h.nblades),
                field("APXC_MEMORY_MODE", h.memory_mode.value),
                field(
                    "APXC_MEMORY_MODE_CONSISTENT",
                    u8::from(h.memory_mode.consistent),
                ),
                field("APXC_CLUSTER_MODE", h.cluster_mode.value),
                field(
                    "APXC_CLUSTER_MODE_CONSISTENT",
                    u8::from(h.cluster_mode.consistent),
                ),
                field("APXC_APPLICATION_ID", h.appid),
            ],
        }
    }

    fn perf_fields(&self, perf: &PerfRecord) -> Vec<Field> {
        let mut fields = match perf {
            PerfRecord::Apcxi(p) => vec![
                field("APCXI_GROUP", p.group),
                field("APCXI_CHASSIS", p.chassis),
                field("APCXI_SLOT", p.slot),
                field("APCXI_BLADE", p.blade),
                field("APCXI_NODE", p.node),
            ],
            PerfRecord::Apmpi(p) => vec![field("MPI_PROCESSOR_NAME", &p.node_name)],
            PerfRecord::Apss(p) => vec![
                field("APSS_GROUP", p.topology.group),
                field("APSS_CHASSIS", p.topology.chassis),
                field("APSS_BLADE", p.topology.blade),
                field("APSS_NODE", p.topology.node),
            ],
            PerfRecord::Apxc(p) => vec![
                field("APXC_GROUP", p.topology.group),
                field("APXC_CHASSIS", p.topology.chassis),
                field("APXC_BLADE", p.topology.blade),
                field("APXC_NODE", p.topology.node),
            ],
        };
        fields.extend(perf.counters().iter().map(|(name, value)| field(name, value)));
        if let PerfRecord::Apmpi(p) = perf {
            fields.extend(p.total_time.iter().map(|(name, value)| float(name, value)));
            if self.sync_flag {
                fields.extend(p.sync_time.iter().map(|(name, value)| float(name, value)));
            }
            // the sync total is only meaningful with sync timing enabled
            let globals = if self.sync_flag { 2 } else { 1 };
            fields.extend(
                p.global_time
                    .iter()
                    .take(globals)
                    .map(|(name, value)| float(name, value)),
            );
        }
        fields
    }
}
