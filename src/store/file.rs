use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use super::memory::{MemoryStore, RowArena};
use super::{MatrixStore, TableHandle};
use crate::error::{PipelineError, Result};
use crate::grid::SpatialGrid;

const TABLE_EXTENSION: &str = "csv";

/// File-backed [`MatrixStore`]: `<dir>/<entity>.csv` per entity.
///
/// The first line of a table is the column header `0,1,...,cells-1`; each
/// following line is one window's row. Committed rows are mirrored in memory,
/// so reads are served without I/O. A row is formatted completely before a
/// single write, and the mirror only advances once that write succeeded. A
/// write that fails partway is truncated back off the file.
///
/// Identifiers are percent-escaped into file stems (`veh/1` is stored as
/// `veh%2F1.csv`), so any non-empty identifier names exactly one table.
///
/// The directory is never listed. After reopening, [`entities`] only reports
/// entities whose tables were accessed through [`get_or_create`] or
/// [`append_row`] since, and assembling a dataset from a reopened store
/// requires touching every entity of interest first.
///
/// [`entities`]: MatrixStore::entities
/// [`get_or_create`]: MatrixStore::get_or_create
/// [`append_row`]: MatrixStore::append_row
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    mirror: MemoryStore,
}

impl FileStore {
    /// Opens (creating if needed) a table directory.
    ///
    /// Existing tables are not scanned: an entity's table is loaded the first
    /// time it is accessed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, cells: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            mirror: MemoryStore::new(cells),
        })
    }

    /// Opens a table directory sized for a grid.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn for_grid(dir: impl Into<PathBuf>, grid: &SpatialGrid) -> Result<Self> {
        Self::open(dir, grid.cells())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an entity's table.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRecord`] for an empty identifier.
    pub fn table_path(&self, entity_id: &str) -> Result<PathBuf> {
        if entity_id.is_empty() {
            return Err(PipelineError::invalid_record("empty entity identifier"));
        }
        Ok(self.dir.join(format!("{}.{TABLE_EXTENSION}", file_stem(entity_id))))
    }

    fn header(&self) -> String {
        let mut line = String::new();
        for cell in 0..self.mirror.cells() {
            if cell > 0 {
                line.push(',');
            }
            let _ = write!(line, "{cell}");
        }
        line.push('\n');
        line
    }

    fn create_table(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(self.header().as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn load_table(&self, path: &Path) -> Result<RowArena> {
        let cells = self.mirror.cells();
        let mut file = File::open(path)?;
        if !ends_with_newline(&mut file)? {
            return Err(PipelineError::corrupt_table(path, 0, "table does not end with a complete row"));
        }
        file.seek(SeekFrom::Start(0))?;

        let mut lines = BufReader::new(file).lines();
        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| PipelineError::corrupt_table(path, 1, "missing header"))?;
        let expected = self.header();
        if header.trim() != expected.trim() {
            return Err(PipelineError::corrupt_table(
                path,
                1,
                format!("header does not describe {cells} cells"),
            ));
        }

        let mut arena = RowArena::default();
        let mut row = Vec::with_capacity(cells);
        for (i, line) in lines.enumerate() {
            let line = line?;
            let line_no = i + 2;
            row.clear();
            for field in line.split(',') {
                let value = field.trim().parse::<f64>().map_err(|e| {
                    PipelineError::corrupt_table(path, line_no, format!("bad value '{field}': {e}"))
                })?;
                row.push(value);
            }
            if row.len() != cells {
                return Err(PipelineError::corrupt_table(
                    path,
                    line_no,
                    format!("expected {cells} values, found {}", row.len()),
                ));
            }
            arena.push(&row);
        }
        Ok(arena)
    }
}

impl MatrixStore for FileStore {
    fn cells(&self) -> usize {
        self.mirror.cells()
    }

    fn get_or_create(&mut self, entity_id: &str) -> Result<TableHandle> {
        if let Some(handle) = self.mirror.handle(entity_id) {
            return Ok(handle);
        }
        let path = self.table_path(entity_id)?;
        let arena = if path.exists() {
            let arena = self.load_table(&path)?;
            debug!(entity = entity_id, rows = arena.rows(), path = %path.display(), "loaded table");
            arena
        } else {
            self.create_table(&path)?;
            debug!(entity = entity_id, cells = self.cells(), path = %path.display(), "created table");
            RowArena::default()
        };
        self.mirror.insert_table(entity_id, arena);
        Ok(TableHandle {
            cells: self.cells(),
            rows: self.mirror.row_count(entity_id),
        })
    }

    fn append_row(&mut self, entity_id: &str, row: &[f64]) -> Result<()> {
        self.mirror.check_len(entity_id, row)?;
        self.get_or_create(entity_id)?;

        let mut line = String::with_capacity(row.len() * 20);
        for (i, v) in row.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            let _ = write!(line, "{v}");
        }
        line.push('\n');

        let path = self.table_path(entity_id)?;
        let mut file = OpenOptions::new().append(true).open(&path)?;
        append_or_rollback(&mut file, line.as_bytes(), |file, bytes| {
            file.write_all(bytes)?;
            file.flush()
        })?;

        self.mirror.push_unchecked(entity_id, row);
        trace!(entity = entity_id, rows = self.mirror.row_count(entity_id), "appended row");
        Ok(())
    }

    fn read_range(&self, entity_id: &str, start_window: u64, end_window: u64) -> Vec<&[f64]> {
        self.mirror.read_range(entity_id, start_window, end_window)
    }

    fn row_count(&self, entity_id: &str) -> usize {
        self.mirror.row_count(entity_id)
    }

    fn entities(&self) -> Vec<String> {
        self.mirror.entities()
    }

    fn contains(&self, entity_id: &str) -> bool {
        self.mirror.contains(entity_id)
    }
}

/// Escapes an identifier into a file stem that stays inside the table
/// directory. `%`, path separators, control characters, characters reserved
/// on common file systems and a leading `.` are written as `%XX` per byte.
fn file_stem(entity_id: &str) -> String {
    let mut stem = String::with_capacity(entity_id.len());
    for (i, c) in entity_id.char_indices() {
        let escape = c.is_control()
            || matches!(c, '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            || (i == 0 && c == '.');
        if escape {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(stem, "%{byte:02X}");
            }
        } else {
            stem.push(c);
        }
    }
    stem
}

/// Writes `bytes` at the end of `file`; if `write` fails, the file is cut
/// back to its previous length before the error is returned.
fn append_or_rollback<F>(file: &mut File, bytes: &[u8], write: F) -> Result<()>
where
    F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
{
    let len = file.metadata()?.len();
    if let Err(err) = write(&mut *file, bytes) {
        if let Err(truncate_err) = file.set_len(len) {
            warn!(error = %truncate_err, len, "could not roll back a partial row");
        }
        return Err(err.into());
    }
    Ok(())
}

fn ends_with_newline(file: &mut File) -> Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
