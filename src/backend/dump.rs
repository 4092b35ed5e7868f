use std::io::Write;

use crate::record::Record;

pub fn dump_record<W: Write>(out: &mut W, record: &Record) -> serde_json::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    writeln!(out).map_err(serde_json::Error::io)?;
    Ok(())
}

pub fn dump_records<W: Write>(out: &mut W, records: &[Record]) -> serde_json::Result<()> {
    for record in records {
        dump_record(out, record)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::analyze::tests::{header, rank};
    use crate::record::{HeaderRecord, PerfRecord};

    #[test]
    fn test_dump_lines() {
        let records = vec![
            Record::Header(HeaderRecord::Apmpi(header(1))),
            Record::Perf(PerfRecord::Apmpi(rank(2, 3.5))),
        ];
        let mut out = Vec::new();
        dump_records(&mut out, &records).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let header: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(header["kind"], "header");
        assert_eq!(header["record"]["module"], "APMPI");
        assert_eq!(header["record"]["sync_flag"], 1);
        assert_eq!(header["record"]["base"]["rank"], -1);

        let perf: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(perf["kind"], "perf");
        assert_eq!(perf["record"]["node_name"], "nid00002");
        assert_eq!(perf["record"]["counters"]["MPI_SEND_CALL_COUNT"], 2);
        assert_eq!(perf["record"]["global_time"]["MPI_TOTAL_COMM_TIME"], 3.5);
    }
}
