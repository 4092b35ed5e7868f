use std::fs::{create_dir, remove_dir_all};
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::backend::analyze::Analysis;

pub const CALLS_CSV: &str = "apmpi.csv";
pub const RANKS_CSV: &str = "apmpi_rank.csv";

const MAX_SUFFIX: usize = 100;

/// Creates `path`, or the first free `path.N` beside it. With `force` an
/// existing directory at `path` is replaced.
fn create_output_dir<P: AsRef<Path>>(path: P, force: bool) -> io::Result<PathBuf> {
    let path = path.as_ref();
    if force {
        if path.exists() {
            info!("removing previous contents of {:?}", path);
            remove_dir_all(path)?;
        }
        create_dir(path)?;
        return Ok(path.to_owned());
    }

    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{:?} cannot be used as an output directory", path),
        )
    })?;
    let suffixed = (1..=MAX_SUFFIX).map(|i| {
        let mut name = name.to_owned();
        name.push(format!(".{}", i));
        path.with_file_name(name)
    });
    let mut taken = None;
    for candidate in std::iter::once(path.to_owned()).chain(suffixed) {
        match create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => taken = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(taken.unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists)))
}

pub fn write_table<W: io::Write, T: Serialize>(writer: W, rows: &[T]) -> io::Result<()> {
    let mut f = csv::WriterBuilder::new().from_writer(writer);
    for row in rows {
        f.serialize(row)?;
    }
    f.flush()?;
    Ok(())
}

/// Writes the per-operation and per-rank tables into a fresh directory and
/// returns its path.
pub fn emit_csv<P: AsRef<Path>>(analysis: &Analysis, path: P, force: bool) -> io::Result<PathBuf> {
    let path = create_output_dir(path, force)?;
    println!("Generating APMPI tables in directory {:?}", &path);

    let calls = std::fs::File::create(path.join(CALLS_CSV))?;
    write_table(calls, &analysis.combined())?;

    let ranks = std::fs::File::create(path.join(RANKS_CSV))?;
    write_table(ranks, &analysis.ranks)?;
    Ok(path)
}
