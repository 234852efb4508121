use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{self, Error, Result};
use crate::table::{Column, ColumnGroup, Schema, Table};

// ---------------------------------------------------------------------------
// ReadOptions – how to interpret a foreign CSV on import
// ---------------------------------------------------------------------------

/// Options for importing a CSV that was not written by this crate.
/// Repository-owned files never need these: their layout is fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadOptions {
    /// Leading lines to discard before the two header rows.
    #[serde(default)]
    pub skiprows: usize,
    /// Column holding row labels, if any. `None` synthesizes labels `0..n`.
    #[serde(default)]
    pub index_col: Option<usize>,
    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: u8,
}

fn default_delimiter() -> u8 {
    b','
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            skiprows: 0,
            index_col: None,
            delimiter: b',',
        }
    }
}

// ---------------------------------------------------------------------------
// Frame – a Table bound to (at most) one CSV file
// ---------------------------------------------------------------------------

/// A [`Table`] plus the file it mirrors. Construction through [`Frame::create`]
/// writes through to disk immediately; a detached frame carries no file and
/// refuses to [`write`](Frame::write).
#[derive(Debug, Clone)]
pub struct Frame {
    path: Option<PathBuf>,
    table: Table,
}

impl Frame {
    /// Bind `table` to `path` and write it out.
    pub fn create(path: impl Into<PathBuf>, table: Table) -> Result<Self> {
        let frame = Frame {
            path: Some(path.into()),
            table,
        };
        frame.write()?;
        Ok(frame)
    }

    /// A frame with no backing file.
    pub fn detached(table: Table) -> Self {
        Frame { path: None, table }
    }

    /// Read a repository-owned CSV: two header rows (group labels, then
    /// variable names) over a leading row-label column.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = read_table(&path, &ReadOptions {
            skiprows: 0,
            index_col: Some(0),
            delimiter: b',',
        })?;
        Ok(Frame {
            path: Some(path),
            table,
        })
    }

    /// Read a foreign CSV under `options`. The two header rows are still
    /// required; everything else (label column, extra lines, delimiter) is
    /// negotiable.
    pub fn import(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Table> {
        read_table(path.as_ref(), options)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    /// Rewrite the backing file from the in-memory table.
    pub fn write(&self) -> Result<()> {
        let path = self.path.as_deref().ok_or(Error::UnboundFrame)?;
        write_table(path, &self.table)
    }
}

// ---------------------------------------------------------------------------
// CSV layout
// ---------------------------------------------------------------------------

fn write_table(path: &Path, table: &Table) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(|e| error::csv(path, e))?;

    let mut groups = vec![String::new()];
    let mut names = vec![String::new()];
    for column in table.schema().columns() {
        groups.push(column.group.label().to_string());
        names.push(column.name.clone());
    }
    writer.write_record(&groups).map_err(|e| error::csv(path, e))?;
    writer.write_record(&names).map_err(|e| error::csv(path, e))?;

    let values = table.values();
    for (row, label) in table.index().iter().enumerate() {
        let mut record = Vec::with_capacity(1 + table.n_cols());
        record.push(label.clone());
        for col in 0..table.n_cols() {
            record.push(values[[row, col]].to_string());
        }
        writer.write_record(&record).map_err(|e| error::csv(path, e))?;
    }
    writer.flush().map_err(|e| error::io(path, e))?;
    Ok(())
}

fn read_table(path: &Path, options: &ReadOptions) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(options.delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| error::csv(path, e))?;

    let mut records = reader.records();
    for _ in 0..options.skiprows {
        match records.next() {
            Some(record) => {
                record.map_err(|e| error::csv(path, e))?;
            }
            None => {
                return Err(error::malformed(path, "ran out of lines while skipping"));
            }
        }
    }

    let group_row = next_record(path, &mut records, "group header row")?;
    let name_row = next_record(path, &mut records, "name header row")?;
    if group_row.len() != name_row.len() {
        return Err(error::malformed(
            path,
            format!(
                "header rows disagree on width: {} vs {}",
                group_row.len(),
                name_row.len()
            ),
        ));
    }

    let label_col = options.index_col;
    if let Some(i) = label_col {
        if i >= group_row.len() {
            return Err(error::malformed(
                path,
                format!("index column {i} is outside a {}-column table", group_row.len()),
            ));
        }
    }

    let mut columns = Vec::new();
    for (pos, (group, name)) in group_row.iter().zip(name_row.iter()).enumerate() {
        if label_col == Some(pos) {
            continue;
        }
        let group = ColumnGroup::parse(group).ok_or_else(|| {
            error::malformed(path, format!("unknown column group {group:?} at column {pos}"))
        })?;
        columns.push(Column::new(group, name));
    }
    let schema = Schema::new(columns)?;
    let width = group_row.len();

    let mut index = Vec::new();
    let mut flat = Vec::new();
    let mut n_rows = 0usize;
    for (offset, record) in records.enumerate() {
        let record = record.map_err(|e| error::csv(path, e))?;
        if record.len() == 1 && record[0].is_empty() {
            continue; // trailing blank line
        }
        if record.len() != width {
            return Err(error::malformed(
                path,
                format!(
                    "data row {offset} has {} fields, header has {width}",
                    record.len()
                ),
            ));
        }
        let mut label = None;
        for (pos, cell) in record.iter().enumerate() {
            if label_col == Some(pos) {
                label = Some(cell.to_string());
                continue;
            }
            let value: f64 = cell.trim().parse().map_err(|_| {
                error::malformed(
                    path,
                    format!("row {offset}, column {pos}: {cell:?} is not numeric"),
                )
            })?;
            flat.push(value);
        }
        index.push(label.unwrap_or_else(|| n_rows.to_string()));
        n_rows += 1;
    }

    let n_cols = schema.len();
    let values = ndarray::Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| error::malformed(path, e.to_string()))?;
    Ok(Table::new(schema, index, values))
}

fn next_record(
    path: &Path,
    records: &mut csv::StringRecordsIter<'_, std::fs::File>,
    what: &str,
) -> Result<StringRecord> {
    match records.next() {
        Some(record) => record.map_err(|e| error::csv(path, e)),
        None => Err(error::malformed(path, format!("missing {what}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
