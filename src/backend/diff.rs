use std::collections::HashMap;
use std::io::{self, Write};

use crate::backend::parser::{write_line, Field, TextPrinter};
use crate::record::{Rank, Record, RecordID};
use crate::schema::RecordKind;

type Key = (RecordKind, Rank, RecordID);

// Headers pair up regardless of id, performance records by rank and id.
fn key(record: &Record) -> Key {
    match record {
        Record::Header(_) => (RecordKind::Header, Rank::ALL, RecordID(0)),
        Record::Perf(perf) => (RecordKind::Performance, perf.base().rank, perf.base().id),
    }
}

struct Side<'a> {
    prefix: &'static str,
    printer: TextPrinter,
    records: &'a [Record],
}

impl<'a> Side<'a> {
    fn new(prefix: &'static str, records: &'a [Record]) -> Self {
        Side {
            prefix,
            printer: TextPrinter::new(),
            records,
        }
    }

    fn write<W: Write>(&self, out: &mut W, record: &Record, field: &Field) -> io::Result<()> {
        let (name, value) = field;
        write_line(out, self.prefix, record.module(), record.base(), name, value)
    }

    fn write_all<W: Write>(&mut self, out: &mut W, record: &Record) -> io::Result<usize> {
        let fields = self.printer.fields(record);
        for field in &fields {
            self.write(out, record, field)?;
        }
        Ok(fields.len())
    }
}

fn diff_pair<W: Write>(
    out: &mut W,
    left: &mut Side,
    right: &mut Side,
    (a, b): (&Record, &Record),
) -> io::Result<usize> {
    let left_fields = left.printer.fields(a);
    let right_fields = right.printer.fields(b);
    let right_values: HashMap<&str, &str> = right_fields
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();

    let mut changes = 0;
    for field in &left_fields {
        match right_values.get(field.0) {
            Some(value) if *value == field.1 => {}
            Some(value) => {
                left.write(out, a, field)?;
                right.write(out, b, &(field.0, value.to_string()))?;
                changes += 1;
            }
            None => {
                left.write(out, a, field)?;
                changes += 1;
            }
        }
    }
    for field in &right_fields {
        if !left_fields.iter().any(|(name, _)| *name == field.0) {
            right.write(out, b, field)?;
            changes += 1;
        }
    }
    Ok(changes)
}

/// Prints the counters that differ between two decoded streams of the same
/// module, `- ` for the left value and `+ ` for the right one. A record found
/// on only one side is printed in full. Returns the number of counters that
/// differ.
pub fn print_diff<W: Write>(out: &mut W, left: &[Record], right: &[Record]) -> io::Result<usize> {
    let mut left = Side::new("- ", left);
    let mut right = Side::new("+ ", right);

    let mut unmatched: HashMap<Key, &Record> =
        right.records.iter().map(|record| (key(record), record)).collect();
    let mut changes = 0;
    for a in left.records {
        match unmatched.remove(&key(a)) {
            Some(b) => changes += diff_pair(out, &mut left, &mut right, (a, b))?,
            None => changes += left.write_all(out, a)?,
        }
    }
    // keep the right stream's order for records missing on the left
    for b in right.records {
        if unmatched.remove(&key(b)).is_some() {
            changes += right.write_all(out, b)?;
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::analyze::tests::{header, rank};
    use crate::record::{
        ApssHeader, ApssPerf, ApxcHeader, BaseRecord, ClusterMode, Counters, HeaderRecord,
        MemoryMode, Mode, PerfRecord, Topology,
    };
    use crate::schema::{counter_names, Module, Namespace, APSS_MAGIC, APXC_MAGIC};

    fn render(left: &[Record], right: &[Record]) -> (usize, Vec<String>) {
        let mut out = Vec::new();
        let changes = print_diff(&mut out, left, right).unwrap();
        let text = String::from_utf8(out).unwrap();
        (changes, text.lines().map(str::to_owned).collect())
    }

    fn apxc_header(memory_mode: MemoryMode, nblades: i64) -> Record {
        Record::Header(HeaderRecord::Apxc(ApxcHeader {
            base: BaseRecord {
                id: RecordID(7),
                rank: Rank::ALL,
            },
            magic: APXC_MAGIC,
            nblades,
            nchassis: 2,
            ngroups: 1,
            memory_mode: Mode::new(memory_mode, true),
            cluster_mode: Mode::new(ClusterMode::Quad, true),
            appid: 99,
        }))
    }

    fn apss_header() -> Record {
        Record::Header(HeaderRecord::Apss(ApssHeader {
            base: BaseRecord {
                id: RecordID(7),
                rank: Rank::ALL,
            },
            magic: APSS_MAGIC,
            nblades: 4,
            nchassis: 2,
            ngroups: 1,
            appid: 99,
        }))
    }

    fn apss_perf(rank: i64, first: u64) -> Record {
        let names = counter_names(Module::Apss, Namespace::Integer).unwrap();
        let mut values = vec![5; names.len()];
        values[0] = first;
        Record::Perf(PerfRecord::Apss(ApssPerf {
            base: BaseRecord {
                id: RecordID(300 + rank as u64),
                rank: Rank(rank),
            },
            topology: Topology {
                group: 0,
                chassis: 1,
                blade: 2,
                node: 3,
            },
            counters: Counters::new(Module::Apss, Namespace::Integer, names, values).unwrap(),
        }))
    }

    #[test]
    fn test_apxc_header_changes() {
        let (changes, lines) = render(
            &[apxc_header(MemoryMode::Flat, 3)],
            &[apxc_header(MemoryMode::Cache, 4)],
        );
        assert_eq!(changes, 2);
        assert_eq!(
            lines,
            [
                "- APXC\t-1\t7\tAPXC_BLADES\t3\t\t\t",
                "+ APXC\t-1\t7\tAPXC_BLADES\t4\t\t\t",
                "- APXC\t-1\t7\tAPXC_MEMORY_MODE\tflat\t\t\t",
                "+ APXC\t-1\t7\tAPXC_MEMORY_MODE\tcache\t\t\t",
            ]
        );
    }

    #[test]
    fn test_apxc_consistency_change() {
        let Record::Header(HeaderRecord::Apxc(mut changed)) = apxc_header(MemoryMode::Flat, 3)
        else {
            unreachable!()
        };
        changed.cluster_mode = Mode::new(ClusterMode::Quad, false);
        let (changes, lines) = render(
            &[apxc_header(MemoryMode::Flat, 3)],
            &[Record::Header(HeaderRecord::Apxc(changed))],
        );
        assert_eq!(changes, 1);
        assert_eq!(lines[0], "- APXC\t-1\t7\tAPXC_CLUSTER_MODE_CONSISTENT\t1\t\t\t");
        assert_eq!(lines[1], "+ APXC\t-1\t7\tAPXC_CLUSTER_MODE_CONSISTENT\t0\t\t\t");
    }

    #[test]
    fn test_apss_counter_change() {
        let left = [apss_header(), apss_perf(0, 5), apss_perf(1, 5)];
        let right = [apss_header(), apss_perf(0, 5), apss_perf(1, 8)];
        let (changes, lines) = render(&left, &right);
        assert_eq!(changes, 1);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("- APSS\t1\t301\tAPSS_CQ_"));
        assert!(lines[0].ends_with("\t5\t\t\t"));
        assert!(lines[1].starts_with("+ APSS\t1\t301\tAPSS_CQ_"));
        assert!(lines[1].ends_with("\t8\t\t\t"));
    }

    #[test]
    fn test_one_sided_records() {
        let left = [apss_header(), apss_perf(0, 5)];
        let right = [apss_header(), apss_perf(2, 5)];
        let (changes, lines) = render(&left, &right);
        // topology plus counters of each unpaired record
        assert_eq!(changes, 2 * (4 + 10));
        assert!(lines[0].starts_with("- APSS\t0\t300\tAPSS_GROUP\t"));
        assert!(lines[14].starts_with("+ APSS\t2\t302\tAPSS_GROUP\t"));
    }

    #[test]
    fn test_identical_streams() {
        let records = [
            Record::Header(HeaderRecord::Apmpi(header(1))),
            Record::Perf(PerfRecord::Apmpi(rank(0, 2.0))),
        ];
        assert_eq!(render(&records, &records), (0, Vec::new()));
    }

    #[test]
    fn test_sync_counters_on_one_side() {
        let left = [
            Record::Header(HeaderRecord::Apmpi(header(0))),
            Record::Perf(PerfRecord::Apmpi(rank(0, 2.0))),
        ];
        let right = [
            Record::Header(HeaderRecord::Apmpi(header(1))),
            Record::Perf(PerfRecord::Apmpi(rank(0, 2.0))),
        ];
        let (changes, lines) = render(&left, &right);
        // sync variance, 16 sync times and the sync total
        assert_eq!(changes, 1 + 16 + 1);
        assert!(lines.iter().all(|line| line.starts_with("+ ")));
        assert!(lines[0].contains("\tMPI_TOTAL_COMM_SYNC_TIME_VARIANCE\t"));
    }
}
