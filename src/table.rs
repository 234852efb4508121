use std::fmt;
use std::ops::Range;

use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// ColumnGroup – the upper level of the two-level column header
// ---------------------------------------------------------------------------

/// Column-group axis of the header. Declaration order is the canonical
/// on-disk column order: Category columns first, then Inputs, then Outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnGroup {
    /// Optional discrete covariate columns.
    Category,
    /// The M input (design) columns.
    Input,
    /// The L output (response) columns.
    Output,
}

impl ColumnGroup {
    /// The header label written to / read from file.
    pub fn label(self) -> &'static str {
        match self {
            ColumnGroup::Category => "Category",
            ColumnGroup::Input => "Input",
            ColumnGroup::Output => "Output",
        }
    }

    /// Parse a header label. Unknown labels are `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Category" => Some(ColumnGroup::Category),
            "Input" => Some(ColumnGroup::Input),
            "Output" => Some(ColumnGroup::Output),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Column / Schema – ordered two-level header
// ---------------------------------------------------------------------------

/// One column of the two-level header: group label plus variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub group: ColumnGroup,
    pub name: String,
}

impl Column {
    pub fn new(group: ColumnGroup, name: impl Into<String>) -> Self {
        Column {
            group,
            name: name.into(),
        }
    }
}

/// The full column header of a table. Guaranteed ordered: zero or more
/// Category columns, then Input columns, then Output columns, each group
/// contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema from an explicit column list, rejecting out-of-order
    /// groups (a Category column after an Input column, and so on).
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let ordered = columns.windows(2).all(|w| w[0].group <= w[1].group);
        if !ordered {
            return Err(Error::SchemaMismatch {
                expected: "Category, Input, Output groups in order".to_string(),
                found: columns
                    .iter()
                    .map(|c| c.group.label())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        Ok(Schema { columns })
    }

    /// Build a schema from per-group name lists (always correctly ordered).
    pub fn from_parts(category: &[&str], input: &[&str], output: &[&str]) -> Self {
        let mut columns = Vec::with_capacity(category.len() + input.len() + output.len());
        for name in category {
            columns.push(Column::new(ColumnGroup::Category, *name));
        }
        for name in input {
            columns.push(Column::new(ColumnGroup::Input, *name));
        }
        for name in output {
            columns.push(Column::new(ColumnGroup::Output, *name));
        }
        Schema { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Contiguous column positions of `group`. Empty range when absent.
    pub fn group_span(&self, group: ColumnGroup) -> Range<usize> {
        let start = self
            .columns
            .iter()
            .position(|c| c.group == group)
            .unwrap_or(self.columns.len());
        let end = self
            .columns
            .iter()
            .rposition(|c| c.group == group)
            .map(|p| p + 1)
            .unwrap_or(start);
        start..end
    }

    /// Number of columns in `group`.
    pub fn group_len(&self, group: ColumnGroup) -> usize {
        self.group_span(group).len()
    }

    /// Variable names of `group`, in column order.
    pub fn names(&self, group: ColumnGroup) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.group == group)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// The number of Input columns, M.
    pub fn m(&self) -> usize {
        self.group_len(ColumnGroup::Input)
    }

    /// The number of Output columns, L.
    pub fn l(&self) -> usize {
        self.group_len(ColumnGroup::Output)
    }
}

// ---------------------------------------------------------------------------
// Table – schema + row labels + values
// ---------------------------------------------------------------------------

/// An in-memory numeric table: a [`Schema`], one label per row, and an
/// `N x schema.len()` value matrix. The unit every frame, fold and transform
/// works in.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: Schema,
    index: Vec<String>,
    values: Array2<f64>,
}

impl Table {
    /// Assemble a table. The shapes are a caller contract, not runtime data.
    pub fn new(schema: Schema, index: Vec<String>, values: Array2<f64>) -> Self {
        assert_eq!(
            values.ncols(),
            schema.len(),
            "value matrix has {} columns but the schema names {}",
            values.ncols(),
            schema.len()
        );
        assert_eq!(
            values.nrows(),
            index.len(),
            "value matrix has {} rows but {} row labels were given",
            values.nrows(),
            index.len()
        );
        Table {
            schema,
            index,
            values,
        }
    }

    /// Assemble a table with synthesized row labels `0..n`.
    pub fn from_values(schema: Schema, values: Array2<f64>) -> Self {
        let index = (0..values.nrows()).map(|i| i.to_string()).collect();
        Table::new(schema, index, values)
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn values_mut(&mut self) -> ArrayViewMut2<'_, f64> {
        self.values.view_mut()
    }

    /// View of one header group's columns (empty view when absent).
    pub fn block(&self, group: ColumnGroup) -> ArrayView2<'_, f64> {
        let span = self.schema.group_span(group);
        self.values.slice(ndarray::s![.., span])
    }

    /// Mutable view of one header group's columns.
    pub fn block_mut(&mut self, group: ColumnGroup) -> ArrayViewMut2<'_, f64> {
        let span = self.schema.group_span(group);
        self.values.slice_mut(ndarray::s![.., span])
    }

    /// New table holding `rows` (by position), labels carried along.
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        let index = rows.iter().map(|&r| self.index[r].clone()).collect();
        let values = self.values.select(Axis(0), rows);
        Table {
            schema: self.schema.clone(),
            index,
            values,
        }
    }

    /// New table holding `cols` (by position), schema carried along.
    /// The selection must preserve group order, which any subsequence of an
    /// ordered schema does.
    pub fn select_columns(&self, cols: &[usize]) -> Table {
        let columns = cols.iter().map(|&c| self.schema.columns[c].clone()).collect();
        let schema = Schema { columns };
        let values = self.values.select(Axis(1), cols);
        Table {
            schema,
            index: self.index.clone(),
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
