use std::path::Path;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{self, Error, Result};
use crate::frame::Frame;
use crate::table::{ColumnGroup, Schema, Table};
use crate::transform::probit;

/// Uniform inputs are clipped to `[MARGIN, 1 - MARGIN]` before the probit,
/// keeping boundary values finite.
pub const UNIFORM_MARGIN: f64 = 1e-12;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Row labels of the statistics table, in storage order.
const STAT_ROWS: [&str; 5] = ["mean", "std", "rng", "min", "max"];

// ---------------------------------------------------------------------------
// Stats – per-column statistics of a training table
// ---------------------------------------------------------------------------

/// Per-column statistics over the Input and Output columns of one table.
///
/// `std` uses one delta degree of freedom. The remaining rows encode the
/// modeled Uniform input: `rng = 2 * std * sqrt(3)`, `min = mean - std *
/// sqrt(3)`, `max = mean + std * sqrt(3)`, so a Uniform(min, max) variable
/// has exactly the observed mean and standard deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    columns: Schema,
    mean: Array1<f64>,
    std: Array1<f64>,
    rng: Array1<f64>,
    min: Array1<f64>,
    max: Array1<f64>,
}

impl Stats {
    /// Compute statistics from `table`. Category columns carry none.
    pub fn compute(table: &Table) -> Result<Self> {
        let n = table.n_rows();
        if n < 2 {
            return Err(Error::NotEnoughRows {
                context: "normalization statistics",
                needed: 2,
                rows: n,
            });
        }
        let columns = stat_columns(table.schema())?;
        let sub = select_stat_columns(table);
        let Some(mean) = sub.mean_axis(Axis(0)) else {
            return Err(Error::NotEnoughRows {
                context: "normalization statistics",
                needed: 2,
                rows: 0,
            });
        };
        let std = sub.std_axis(Axis(0), 1.0);
        let semi_range = &std * SQRT_3;
        Ok(Stats {
            min: &mean - &semi_range,
            max: &mean + &semi_range,
            rng: &semi_range * 2.0,
            columns,
            mean,
            std,
        })
    }

    /// Read a statistics table written by [`Stats::write`].
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let table = Frame::read(path)?.into_table();
        let columns = stat_columns(table.schema())?;
        let sub = select_stat_columns(&table);
        let row = |label: &str| -> Result<Array1<f64>> {
            let at = table
                .index()
                .iter()
                .position(|l| l == label)
                .ok_or_else(|| error::malformed(path, format!("statistics row {label:?} missing")))?;
            Ok(sub.row(at).to_owned())
        };
        Ok(Stats {
            mean: row("mean")?,
            std: row("std")?,
            rng: row("rng")?,
            min: row("min")?,
            max: row("max")?,
            columns,
        })
    }

    /// The statistics as a 5-row table, rows labelled per [`STAT_ROWS`].
    pub fn to_table(&self) -> Table {
        let mut values = Array2::zeros((STAT_ROWS.len(), self.columns.len()));
        for (at, array) in [&self.mean, &self.std, &self.rng, &self.min, &self.max]
            .into_iter()
            .enumerate()
        {
            values.row_mut(at).assign(array);
        }
        let index = STAT_ROWS.iter().map(|s| s.to_string()).collect();
        Table::new(self.columns.clone(), index, values)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        Frame::create(path.as_ref(), self.to_table())?;
        Ok(())
    }

    pub fn columns(&self) -> &Schema {
        &self.columns
    }

    pub fn m(&self) -> usize {
        self.columns.m()
    }

    pub fn l(&self) -> usize {
        self.columns.l()
    }

    // ---- per-block slices (columns are Input then Output) ----

    pub fn x_min(&self) -> ArrayView1<'_, f64> {
        self.min.slice(s![..self.m()])
    }

    pub fn x_rng(&self) -> ArrayView1<'_, f64> {
        self.rng.slice(s![..self.m()])
    }

    pub fn y_mean(&self) -> ArrayView1<'_, f64> {
        self.mean.slice(s![self.m()..])
    }

    pub fn y_std(&self) -> ArrayView1<'_, f64> {
        self.std.slice(s![self.m()..])
    }

    /// Error unless `table` names the same Input and Output columns.
    fn check_columns(&self, table: &Table) -> Result<()> {
        let matches = self.columns.names(ColumnGroup::Input) == table.schema().names(ColumnGroup::Input)
            && self.columns.names(ColumnGroup::Output) == table.schema().names(ColumnGroup::Output);
        if matches {
            Ok(())
        } else {
            Err(Error::SchemaMismatch {
                expected: describe(&self.columns),
                found: describe(table.schema()),
            })
        }
    }
}

fn stat_columns(schema: &Schema) -> Result<Schema> {
    let columns = schema
        .columns()
        .iter()
        .filter(|c| c.group != ColumnGroup::Category)
        .cloned()
        .collect();
    Schema::new(columns)
}

fn select_stat_columns(table: &Table) -> Array2<f64> {
    let schema = table.schema();
    let cols: Vec<usize> = schema
        .group_span(ColumnGroup::Input)
        .chain(schema.group_span(ColumnGroup::Output))
        .collect();
    table.values().select(Axis(1), &cols)
}

fn describe(schema: &Schema) -> String {
    format!(
        "Input [{}], Output [{}]",
        schema.names(ColumnGroup::Input).join(", "),
        schema.names(ColumnGroup::Output).join(", ")
    )
}

// ---------------------------------------------------------------------------
// Normalization – the bijective raw <-> canonical map
// ---------------------------------------------------------------------------

/// A reversible map between raw and canonical space.
///
/// Inputs are treated as Uniform(min, max), squeezed to (0, 1) and probit
/// transformed to standard normal. Outputs are centred and scaled to unit
/// variance. With `applicable = false` every map is the identity.
#[derive(Debug, Clone)]
pub struct Normalization {
    stats: Stats,
    applicable: bool,
}

impl Normalization {
    pub fn from_stats(stats: Stats, applicable: bool) -> Self {
        Normalization { stats, applicable }
    }

    /// Compute statistics from `table`, usually a fold's training slice.
    pub fn from_table(table: &Table, applicable: bool) -> Result<Self> {
        Ok(Normalization {
            stats: Stats::compute(table)?,
            applicable,
        })
    }

    /// Load an existing statistics file.
    pub fn read(path: impl AsRef<Path>, applicable: bool) -> Result<Self> {
        Ok(Normalization {
            stats: Stats::read(path)?,
            applicable,
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn is_applicable(&self) -> bool {
        self.applicable
    }

    /// Map `table` from raw to canonical space. Category columns and row
    /// labels pass through untouched.
    pub fn apply_to(&self, table: &Table) -> Result<Table> {
        if !self.applicable {
            return Ok(table.clone());
        }
        self.stats.check_columns(table)?;
        let mut out = table.clone();
        for (j, mut col) in out
            .block_mut(ColumnGroup::Input)
            .axis_iter_mut(Axis(1))
            .enumerate()
        {
            let min = self.stats.x_min()[j];
            let rng = self.stats.x_rng()[j];
            for v in col.iter_mut() {
                let u = ((*v - min) / rng).clamp(UNIFORM_MARGIN, 1.0 - UNIFORM_MARGIN);
                *v = probit::quantile(u);
            }
        }
        for (j, mut col) in out
            .block_mut(ColumnGroup::Output)
            .axis_iter_mut(Axis(1))
            .enumerate()
        {
            let mean = self.stats.y_mean()[j];
            let std = self.stats.y_std()[j];
            for v in col.iter_mut() {
                *v = (*v - mean) / std;
            }
        }
        Ok(out)
    }

    /// Map `table` from canonical back to raw space. Exact inverse of
    /// [`apply_to`](Normalization::apply_to) away from the clip margin.
    pub fn undo_from(&self, table: &Table) -> Result<Table> {
        if !self.applicable {
            return Ok(table.clone());
        }
        self.stats.check_columns(table)?;
        let mut out = table.clone();
        for (j, mut col) in out
            .block_mut(ColumnGroup::Input)
            .axis_iter_mut(Axis(1))
            .enumerate()
        {
            let min = self.stats.x_min()[j];
            let rng = self.stats.x_rng()[j];
            for v in col.iter_mut() {
                *v = probit::cdf(*v) * rng + min;
            }
        }
        for (j, mut col) in out
            .block_mut(ColumnGroup::Output)
            .axis_iter_mut(Axis(1))
            .enumerate()
        {
            let mean = self.stats.y_mean()[j];
            let std = self.stats.y_std()[j];
            for v in col.iter_mut() {
                *v = *v * std + mean;
            }
        }
        Ok(out)
    }

    /// Rescale canonical outputs by `std` without re-adding the mean. The
    /// right inverse for dispersion quantities such as predictive standard
    /// deviations.
    pub fn unscale_y(&self, y: ArrayView2<f64>) -> Array2<f64> {
        let mut out = y.to_owned();
        if self.applicable {
            for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
                let std = self.stats.y_std()[j];
                for v in col.iter_mut() {
                    *v *= std;
                }
            }
        }
        out
    }

    /// Derivative of the raw input w.r.t. the canonical input, evaluated at
    /// canonical values `z`, for the requested input `axes`:
    /// `rng[axis] * pdf(z[.., axis])`. Ones when not applicable.
    pub fn x_gradient(&self, z: ArrayView2<f64>, axes: &[usize]) -> Array2<f64> {
        let n = z.nrows();
        if !self.applicable {
            return Array2::ones((n, axes.len()));
        }
        let rng = self.stats.x_rng();
        Array2::from_shape_fn((n, axes.len()), |(i, j)| {
            let axis = axes[j];
            rng[axis] * probit::pdf(z[[i, axis]])
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance * (1.0 + b.abs())
    }

    fn sample_table() -> Table {
        let schema = Schema::from_parts(&[], &["X1", "X2"], &["Y"]);
        let values = array![
            [1.0, 10.0, -2.0],
            [2.0, 30.0, 0.5],
            [3.0, 20.0, 1.0],
            [4.0, 40.0, 3.5],
        ];
        Table::from_values(schema, values)
    }

    #[test]
    fn stats_follow_the_uniform_model() {
        let stats = Stats::compute(&sample_table()).unwrap();
        // Column X1 = [1, 2, 3, 4]: mean 2.5, std sqrt(5/3), semi-range sqrt(5).
        let std = (5.0f64 / 3.0).sqrt();
        let semi = 5.0f64.sqrt();
        assert!(close(stats.mean[0], 2.5, 1e-12));
        assert!(close(stats.std[0], std, 1e-12));
        assert!(close(stats.rng[0], 2.0 * semi, 1e-12));
        assert!(close(stats.min[0], 2.5 - semi, 1e-12));
        assert!(close(stats.max[0], 2.5 + semi, 1e-12));
    }

    #[test]
    fn stats_need_two_rows() {
        let schema = Schema::from_parts(&[], &["X"], &["Y"]);
        let one = Table::from_values(schema, array![[1.0, 2.0]]);
        assert!(matches!(
            Stats::compute(&one),
            Err(Error::NotEnoughRows { rows: 1, .. })
        ));
    }

    #[test]
    fn stats_file_round_trips_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("normalization.csv");
        let stats = Stats::compute(&sample_table()).unwrap();
        stats.write(&path).unwrap();
        assert_eq!(Stats::read(&path).unwrap(), stats);
    }

    #[test]
    fn apply_then_undo_recovers_raw_values() {
        let table = sample_table();
        let normalization = Normalization::from_table(&table, true).unwrap();
        let canonical = normalization.apply_to(&table).unwrap();
        let raw = normalization.undo_from(&canonical).unwrap();
        for (a, b) in raw.values().iter().zip(table.values().iter()) {
            assert!(close(*a, *b, 1e-9), "round trip drifted: {a} vs {b}");
        }
        assert_eq!(raw.index(), table.index());
    }

    #[test]
    fn outputs_standardize_to_zero_mean_unit_variance() {
        let table = sample_table();
        let normalization = Normalization::from_table(&table, true).unwrap();
        let canonical = normalization.apply_to(&table).unwrap();
        let y = canonical.block(ColumnGroup::Output);
        let mean = y.mean_axis(Axis(0)).unwrap()[0];
        let std = y.std_axis(Axis(0), 1.0)[0];
        assert!(mean.abs() < 1e-12);
        assert!(close(std, 1.0, 1e-12));
    }

    #[test]
    fn boundary_values_stay_finite() {
        let table = sample_table();
        let normalization = Normalization::from_table(&table, true).unwrap();
        let stats = normalization.stats();
        // A table sitting exactly on min and max of each input column.
        let schema = Schema::from_parts(&[], &["X1", "X2"], &["Y"]);
        let edge = Table::from_values(
            schema,
            array![
                [stats.x_min()[0], stats.x_min()[1], 0.0],
                [
                    stats.x_min()[0] + stats.x_rng()[0],
                    stats.x_min()[1] + stats.x_rng()[1],
                    0.0
                ],
            ],
        );
        let canonical = normalization.apply_to(&edge).unwrap();
        for v in canonical.block(ColumnGroup::Input).iter() {
            assert!(v.is_finite(), "clipped probit produced {v}");
            assert!(v.abs() < 7.5, "clipped probit too extreme: {v}");
        }
    }

    #[test]
    fn inapplicable_normalization_is_the_identity() {
        let table = sample_table();
        let normalization = Normalization::from_table(&table, false).unwrap();
        assert_eq!(normalization.apply_to(&table).unwrap(), table);
        assert_eq!(normalization.undo_from(&table).unwrap(), table);
        let y = table.block(ColumnGroup::Output);
        assert_eq!(normalization.unscale_y(y), y.to_owned());
        let ones = normalization.x_gradient(table.block(ColumnGroup::Input), &[0, 1]);
        assert!(ones.iter().all(|&g| g == 1.0));
    }

    #[test]
    fn unscale_y_is_undo_without_the_mean() {
        let table = sample_table();
        let normalization = Normalization::from_table(&table, true).unwrap();
        let canonical = normalization.apply_to(&table).unwrap();
        let undone = normalization.undo_from(&canonical).unwrap();
        let unscaled = normalization.unscale_y(canonical.block(ColumnGroup::Output));
        let mean = normalization.stats().y_mean()[0];
        for (row, undone_row) in unscaled
            .axis_iter(Axis(0))
            .zip(undone.block(ColumnGroup::Output).axis_iter(Axis(0)))
        {
            assert!(close(row[0] + mean, undone_row[0], 1e-9));
        }
    }

    #[test]
    fn x_gradient_scales_the_normal_density() {
        let table = sample_table();
        let normalization = Normalization::from_table(&table, true).unwrap();
        let z = array![[0.0, 0.0], [1.0, -1.0]];
        let gradient = normalization.x_gradient(z.view(), &[0, 1]);
        let rng = normalization.stats().x_rng().to_owned();
        assert!(close(gradient[[0, 0]], rng[0] * probit::pdf(0.0), 1e-12));
        assert!(close(gradient[[1, 1]], rng[1] * probit::pdf(-1.0), 1e-12));
        // Single-axis request keeps only that axis.
        let single = normalization.x_gradient(z.view(), &[1]);
        assert_eq!(single.ncols(), 1);
        assert!(close(single[[0, 0]], rng[1] * probit::pdf(0.0), 1e-12));
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let table = sample_table();
        let normalization = Normalization::from_table(&table, true).unwrap();
        let other = Table::from_values(
            Schema::from_parts(&[], &["X1", "X3"], &["Y"]),
            array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
        );
        assert!(matches!(
            normalization.apply_to(&other),
            Err(Error::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn category_columns_pass_through() {
        let schema = Schema::from_parts(&["C"], &["X"], &["Y"]);
        let table = Table::from_values(
            schema,
            array![[7.0, 1.0, -1.0], [8.0, 2.0, 0.0], [9.0, 3.0, 1.0]],
        );
        let normalization = Normalization::from_table(&table, true).unwrap();
        assert_eq!(normalization.stats().columns().len(), 2);
        let canonical = normalization.apply_to(&table).unwrap();
        assert_eq!(
            canonical.block(ColumnGroup::Category),
            table.block(ColumnGroup::Category)
        );
    }
}
