use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{self, Result};
use crate::frame::ReadOptions;
use crate::table::{ColumnGroup, Table};

// ---------------------------------------------------------------------------
// Meta – the per-folder metadata document
// ---------------------------------------------------------------------------

/// Everything a repository or fold records about itself besides the tables.
/// Field names mirror the on-disk JSON keys, which are part of the format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meta {
    /// Number of proper folds the repository was last partitioned into.
    /// Zero for a repository that has never been folded.
    #[serde(rename = "K")]
    pub k_folds: usize,
    /// Whether fold K (train = test = everything) exists alongside folds 0..K.
    #[serde(default)]
    pub has_improper_fold: bool,
    /// Whether rows were shuffled within blocks when last partitioned.
    #[serde(rename = "shuffle before folding", default)]
    pub shuffle_before_folding: bool,
    /// False turns every fold's normalization into the identity.
    #[serde(rename = "normalization applicable", default = "default_true")]
    pub normalization_applicable: bool,
    pub data: DataShape,
    /// Provenance of an imported repository; absent when built from memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Set only in a fold's folder: which fold this is.
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    pub fold_index: Option<usize>,
}

fn default_true() -> bool {
    true
}

/// Shape and header of the data table, denormalized into the metadata for
/// inspection without parsing CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataShape {
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "M")]
    pub m: usize,
    #[serde(rename = "L")]
    pub l: usize,
    /// Row-label column names. Derived shapes use the single name `N`,
    /// the row number written as the leading CSV column.
    #[serde(rename = "Index", default)]
    pub index: Vec<String>,
    #[serde(rename = "Category", default)]
    pub category: Vec<String>,
    #[serde(rename = "Input")]
    pub input: Vec<String>,
    #[serde(rename = "Output")]
    pub output: Vec<String>,
}

impl DataShape {
    /// Describe `table`.
    pub fn of(table: &Table) -> Self {
        let schema = table.schema();
        let names = |g: ColumnGroup| schema.names(g).iter().map(|s| s.to_string()).collect();
        DataShape {
            n: table.n_rows(),
            m: schema.m(),
            l: schema.l(),
            index: vec!["N".to_string()],
            category: names(ColumnGroup::Category),
            input: names(ColumnGroup::Input),
            output: names(ColumnGroup::Output),
        }
    }
}

/// Where an imported repository's data came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Origin {
    pub csv: String,
    pub options: ReadOptions,
}

impl Meta {
    /// Fresh metadata for an unfolded repository around `table`.
    pub fn for_table(table: &Table) -> Self {
        Meta {
            k_folds: 0,
            has_improper_fold: false,
            shuffle_before_folding: false,
            normalization_applicable: true,
            data: DataShape::of(table),
            origin: None,
            fold_index: None,
        }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| error::io(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| error::json(path, e))
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| error::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|e| error::json(path, e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
