// src/table/store.rs

use csv::{ReaderBuilder, WriterBuilder};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{Row, Table};
use crate::error::{LoadError, PersistError};

/// Parse CSV from any reader. Every record must have the same field count.
pub fn read_from<R: Read>(reader: R) -> Result<Table, csv::Error> {
    let mut rdr = ReaderBuilder::new().has_headers(false).from_reader(reader);
    let rows = rdr
        .records()
        .map(|rec| rec.map(|r| r.iter().map(str::to_string).collect::<Row>()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table::new(rows))
}

/// Serialize every row, header included, as CSV.
pub fn write_to<W: Write>(writer: W, table: &Table) -> Result<(), csv::Error> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    for row in table.rows() {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read the table at `path`. A file without any rows is rejected.
pub fn load(path: &Path) -> Result<Table, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let table = read_from(file).map_err(|source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if table.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), rows = table.len(), "loaded table");
    Ok(table)
}

/// Replace the file at `path` with `table`.
///
/// The CSV is written to a temporary file in the same directory and renamed
/// over the target, so a failed write leaves the original untouched.
pub fn persist(path: &Path, table: &Table) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;

    write_to(&mut tmp, table).map_err(|source| PersistError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.as_file().sync_all().map_err(io_err)?;

    // keep the original file's mode rather than the temp file's 0600
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| io_err(e.error))?;
    debug!(path = %path.display(), rows = table.len(), "persisted table");
    Ok(())
}
