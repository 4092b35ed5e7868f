use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use rayon::prelude::*;

use darshan_autoperf::backend::analyze::{self, Analysis};
use darshan_autoperf::backend::{diff, dump, export, parser};
use darshan_autoperf::{ByteOrder, Config, Decoder, MagicCheck, Module, RawLog, Record, RecordStream};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(
        required_unless_present = "describe",
        help = "raw AutoPerf module regions (optionally gzip compressed)"
    )]
    filenames: Vec<OsString>,

    #[arg(short, long, help = "module of the records: APCXI, APMPI, APSS or APXC")]
    module: Module,

    #[arg(short, long, help = "print records as JSON lines")]
    dump: bool,

    #[arg(short, long, help = "print APMPI statistics")]
    statistics: bool,

    #[arg(long, help = "write APMPI statistics as CSV tables")]
    csv: bool,

    #[arg(long, help = "print counter descriptions")]
    describe: bool,

    #[arg(long, help = "print the counters that differ between two inputs")]
    diff: bool,

    #[arg(
        short,
        long,
        default_value = "apmpi_output",
        help = "output directory pathname"
    )]
    output: OsString,

    #[arg(short, long, help = "overwrite output directory if it exists")]
    force: bool,

    #[arg(
        long = "byte-order",
        value_enum,
        default_value_t = ByteOrder::Native,
        help = "byte order the log was written in"
    )]
    byte_order: ByteOrder,

    #[arg(
        long = "lenient-magic",
        help = "warn instead of failing when a header magic number does not match"
    )]
    lenient_magic: bool,

    #[arg(short, long, help = "print more diagnostic information")]
    verbose: bool,
}

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn read_records(filename: &OsString, module: Module, decoder: Decoder) -> io::Result<Vec<Record>> {
    let mut log = RawLog::open(filename, module)?;
    let records = RecordStream::with_decoder(&mut log, module, decoder)
        .collect::<darshan_autoperf::Result<Vec<_>>>()?;
    Ok(records)
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if [cli.dump, cli.statistics, cli.csv, cli.describe, cli.diff]
        .iter()
        .filter(|x| **x)
        .count()
        > 1
    {
        return Err(invalid_input(
            "ap-decode takes at most one of --dump, --statistics, --csv, --describe, or --diff"
                .to_owned(),
        ));
    }

    if (cli.statistics || cli.csv) && cli.module != Module::Apmpi {
        return Err(invalid_input(format!(
            "statistics are only available for APMPI, not {}",
            cli.module
        )));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.describe {
        parser::print_description(&mut out, cli.module)?;
        return Ok(());
    }

    let magic_check = if cli.lenient_magic {
        MagicCheck::Warn
    } else {
        MagicCheck::Strict
    };
    let decoder = Decoder::new(Config::new(cli.byte_order, magic_check));

    if cli.diff {
        let [left, right] = cli.filenames.as_slice() else {
            return Err(invalid_input(format!(
                "--diff compares exactly two inputs, got {}",
                cli.filenames.len()
            )));
        };
        let left = read_records(left, cli.module, decoder)?;
        let right = read_records(right, cli.module, decoder)?;
        let changes = diff::print_diff(&mut out, &left, &right)?;
        info!("{} counters differ", changes);
        return Ok(());
    }

    let results: Vec<_> = cli
        .filenames
        .par_iter()
        .map(|filename| (filename, read_records(filename, cli.module, decoder)))
        .collect();

    let mut failed = 0;
    for (index, (filename, result)) in results.iter().enumerate() {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                error!("{:?}: {}", filename, e);
                failed += 1;
                continue;
            }
        };
        info!("read {} records from {:?}", records.len(), filename);
        if cli.dump {
            dump::dump_records(&mut out, records)?;
        } else if cli.statistics {
            analyze::print_statistics(&Analysis::from_records(records)?);
        } else if cli.csv {
            let mut path = PathBuf::from(&cli.output);
            if cli.filenames.len() > 1 {
                let mut name = cli.output.clone();
                name.push(format!(".{}", index));
                path = PathBuf::from(name);
            }
            export::emit_csv(&Analysis::from_records(records)?, path, cli.force)?;
        } else {
            println!("# *******************************************************");
            println!("# {} module data", cli.module);
            println!("# *******************************************************");
            parser::print_description(&mut out, cli.module)?;
            let mut printer = parser::TextPrinter::new();
            for record in records {
                printer.print(&mut out, record)?;
            }
        }
    }

    if failed > 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} of {} inputs could not be decoded", failed, results.len()),
        ));
    }
    Ok(())
}
