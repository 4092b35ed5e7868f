use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::record::{ApmpiHeader, ApmpiPerf, CounterValue, HeaderRecord, PerfRecord, Record};
use crate::schema::Module;

/// One row of the per-operation table. Rows for a rank's total MPI time only
/// fill in the first four columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallStat {
    #[serde(rename = "Rank")]
    pub rank: i64,
    #[serde(rename = "Node_ID")]
    pub node_id: String,
    #[serde(rename = "Call")]
    pub call: String,
    #[serde(rename = "Total_Time")]
    pub total_time: f64,
    #[serde(rename = "Count")]
    pub count: Option<u64>,
    #[serde(rename = "Total_Bytes")]
    pub total_bytes: Option<u64>,
    #[serde(rename = "[0-256B]")]
    pub size_0_256: Option<u64>,
    #[serde(rename = "[256-1KB]")]
    pub size_256_1k: Option<u64>,
    #[serde(rename = "[1K-8KB]")]
    pub size_1k_8k: Option<u64>,
    #[serde(rename = "[8K-256KB]")]
    pub size_8k_256k: Option<u64>,
    #[serde(rename = "256K-1MB")]
    pub size_256k_1m: Option<u64>,
    #[serde(rename = "[>1MB]")]
    pub size_1m_plus: Option<u64>,
    #[serde(rename = "Min_Time")]
    pub min_time: Option<f64>,
    #[serde(rename = "Max_Time")]
    pub max_time: Option<f64>,
    /// `None` when sync timing is off, which drops the column from the table.
    #[serde(rename = "Total_SYNC_Time", skip_serializing_if = "Option::is_none")]
    pub total_sync_time: Option<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankStat {
    #[serde(rename = "Rank")]
    pub rank: i64,
    #[serde(rename = "Node_ID")]
    pub node_id: String,
    #[serde(rename = "Call")]
    pub call: String,
    #[serde(rename = "Total_Time")]
    pub total_time: f64,
}

impl From<&RankStat> for CallStat {
    fn from(rank: &RankStat) -> Self {
        CallStat {
            rank: rank.rank,
            node_id: rank.node_id.clone(),
            call: rank.call.clone(),
            total_time: rank.total_time,
            count: None,
            total_bytes: None,
            size_0_256: None,
            size_256_1k: None,
            size_1k_8k: None,
            size_8k_256k: None,
            size_256k_1m: None,
            size_1m_plus: None,
            min_time: None,
            max_time: None,
            total_sync_time: None,
        }
    }
}

pub const TOTAL_MPI_TIME: &str = "Total_MPI_time";

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub sync_flag: bool,
    pub variance_total_mpitime: f64,
    pub variance_total_mpisynctime: f64,
    pub calls: Vec<CallStat>,
    pub ranks: Vec<RankStat>,
}

fn as_int(value: Option<&CounterValue>) -> Option<u64> {
    match value {
        Some(CounterValue::Int(v)) => Some(*v),
        _ => None,
    }
}

fn as_float(value: Option<&CounterValue>) -> Option<f64> {
    match value {
        Some(CounterValue::Float(v)) => Some(*v),
        _ => None,
    }
}

fn call_stats(perf: &ApmpiPerf, sync_flag: bool) -> Result<Vec<CallStat>> {
    let counters = perf.all_counters()?;
    let mut stats = Vec::new();
    // record order, not the order of the merged map
    for (name, count) in perf.counters.iter() {
        let Some(op) = name.strip_suffix("_CALL_COUNT") else {
            continue;
        };
        if count == 0 {
            continue;
        }
        let int = |suffix: &str| as_int(counters.get(format!("{}_{}", op, suffix).as_str()));
        let float = |suffix: &str| as_float(counters.get(format!("{}_{}", op, suffix).as_str()));
        stats.push(CallStat {
            rank: perf.base.rank.0,
            node_id: perf.node_name.clone(),
            call: op.to_owned(),
            total_time: float("TOTAL_TIME").unwrap_or(0.0),
            count: Some(count),
            total_bytes: int("TOTAL_BYTES"),
            size_0_256: int("MSG_SIZE_AGG_0_256"),
            size_256_1k: int("MSG_SIZE_AGG_256_1K"),
            size_1k_8k: int("MSG_SIZE_AGG_1K_8K"),
            size_8k_256k: int("MSG_SIZE_AGG_8K_256K"),
            size_256k_1m: int("MSG_SIZE_AGG_256K_1M"),
            size_1m_plus: int("MSG_SIZE_AGG_1M_PLUS"),
            min_time: float("MIN_TIME"),
            max_time: float("MAX_TIME"),
            total_sync_time: sync_flag.then(|| float("TOTAL_SYNC_TIME")),
        });
    }
    Ok(stats)
}

impl Analysis {
    pub fn new<'a, I>(header: &ApmpiHeader, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a ApmpiPerf>,
    {
        let sync_flag = header.has_sync();
        let mut calls = Vec::new();
        let mut ranks = Vec::new();
        for perf in records {
            calls.extend(call_stats(perf, sync_flag)?);
            ranks.push(RankStat {
                rank: perf.base.rank.0,
                node_id: perf.node_name.clone(),
                call: TOTAL_MPI_TIME.to_owned(),
                total_time: perf.total_comm_time(),
            });
        }
        Ok(Analysis {
            sync_flag,
            variance_total_mpitime: header.variance_total_mpitime,
            variance_total_mpisynctime: header.variance_total_mpisynctime,
            calls,
            ranks,
        })
    }

    /// Analyzes a decoded APMPI stream, header first.
    pub fn from_records(records: &[Record]) -> Result<Self> {
        let Some(Record::Header(HeaderRecord::Apmpi(header))) = records.first() else {
            return Err(Error::ModuleNotPresent(Module::Apmpi));
        };
        let mut perfs = Vec::with_capacity(records.len() - 1);
        for record in &records[1..] {
            match record {
                Record::Perf(PerfRecord::Apmpi(perf)) => perfs.push(perf),
                _ => return Err(Error::ModuleNotPresent(Module::Apmpi)),
            }
        }
        Self::new(header, perfs)
    }

    pub fn mean_total_time(&self) -> Option<f64> {
        if self.ranks.is_empty() {
            return None;
        }
        let sum: f64 = self.ranks.iter().map(|r| r.total_time).sum();
        Some(sum / self.ranks.len() as f64)
    }

    // First rank wins ties.
    fn pick_rank(&self, better: impl Fn(&RankStat, &RankStat) -> bool) -> Option<i64> {
        let mut best: Option<&RankStat> = None;
        for rank in &self.ranks {
            if best.is_none_or(|b| better(rank, b)) {
                best = Some(rank);
            }
        }
        best.map(|r| r.rank)
    }

    /// Rank with the largest total MPI time.
    pub fn max_rank(&self) -> Option<i64> {
        self.pick_rank(|a, b| a.total_time > b.total_time)
    }

    pub fn min_rank(&self) -> Option<i64> {
        self.pick_rank(|a, b| a.total_time < b.total_time)
    }

    /// Rank whose total MPI time is closest to the mean over all ranks.
    pub fn mean_rank(&self) -> Option<i64> {
        let mean = self.mean_total_time()?;
        self.pick_rank(|a, b| (a.total_time - mean).abs() < (b.total_time - mean).abs())
    }

    /// Operation rows and rank totals together, by rank and then by
    /// decreasing time.
    pub fn combined(&self) -> Vec<CallStat> {
        let mut rows: Vec<CallStat> = self.calls.clone();
        rows.extend(self.ranks.iter().map(|rank| CallStat {
            total_sync_time: self.sync_flag.then_some(None),
            ..CallStat::from(rank)
        }));
        rows.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| b.total_time.partial_cmp(&a.total_time).unwrap_or(Ordering::Equal))
        });
        rows
    }

    pub fn rank_rows(&self, rank: i64) -> Vec<CallStat> {
        self.combined()
            .into_iter()
            .filter(|row| row.rank == rank)
            .collect()
    }
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| v.to_string())
}

fn print_rows(rows: &[CallStat], sync_flag: bool) {
    print!(
        "  {:>6} {:<16} {:<28} {:>14} {:>10} {:>14}",
        "Rank", "Node_ID", "Call", "Total_Time", "Count", "Total_Bytes"
    );
    print!(
        " {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "[0-256B]", "[256-1KB]", "[1K-8KB]", "[8K-256KB]", "256K-1MB", "[>1MB]"
    );
    print!(" {:>12} {:>12}", "Min_Time", "Max_Time");
    if sync_flag {
        print!(" {:>15}", "Total_SYNC_Time");
    }
    println!();
    for row in rows {
        print!(
            "  {:>6} {:<16} {:<28} {:>14.6} {:>10} {:>14}",
            row.rank,
            row.node_id,
            row.call,
            row.total_time,
            fmt_opt(row.count),
            fmt_opt(row.total_bytes)
        );
        print!(
            " {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            fmt_opt(row.size_0_256),
            fmt_opt(row.size_256_1k),
            fmt_opt(row.size_1k_8k),
            fmt_opt(row.size_8k_256k),
            fmt_opt(row.size_256k_1m),
            fmt_opt(row.size_1m_plus)
        );
        print!(
            " {:>12} {:>12}",
            fmt_opt(row.min_time.map(|t| format!("{:.6}", t))),
            fmt_opt(row.max_time.map(|t| format!("{:.6}", t)))
        );
        if sync_flag {
            print!(
                " {:>15}",
                fmt_opt(row.total_sync_time.flatten().map(|t| format!("{:.6}", t)))
            );
        }
        println!();
    }
}

fn print_rank(analysis: &Analysis, title: &str, rank: Option<i64>) {
    println!();
    println!("  -------------------------");
    println!("  MPI stats for rank with {} MPI time", title);
    println!("  -------------------------");
    match rank {
        Some(rank) => print_rows(&analysis.rank_rows(rank), analysis.sync_flag),
        None => println!("  (no performance records)"),
    }
}

pub fn print_statistics(analysis: &Analysis) {
    println!("sync_flag= {}", u32::from(analysis.sync_flag));
    println!(
        "APMPI Variance in total mpi time: {}",
        analysis.variance_total_mpitime
    );
    if analysis.sync_flag {
        println!(
            "APMPI Variance in total mpi sync time: {}",
            analysis.variance_total_mpisynctime
        );
    }
    print_rank(analysis, "maximum", analysis.max_rank());
    print_rank(analysis, "minimum", analysis.min_rank());
    print_rank(analysis, "mean", analysis.mean_rank());
}
