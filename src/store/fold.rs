use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{self, Error, Result};
use crate::frame::Frame;
use crate::meta::{DataShape, Meta};
use crate::store::repository::Repository;
use crate::store::{Dataset, DATA_CSV, META_JSON, NORMALIZATION_CSV, ROTATION_CSV, TEST_CSV};
use crate::table::{ColumnGroup, Table};
use crate::transform::{rotation, Normalization, Stats};

// ---------------------------------------------------------------------------
// Fold – one cross-validation partition
// ---------------------------------------------------------------------------

/// One cross-validation partition: a repository-shaped base holding the
/// training data, plus a held-out test frame, the fold's normalization and a
/// cumulative input rotation.
///
/// A fold is created whole by [`Fold::from_frames`] (or by
/// [`Repository::into_k_folds`]) and mutated only through
/// [`apply_input_rotation`](Fold::apply_input_rotation). It deliberately has
/// no `folds()` or `split_outputs()`: folds do not nest.
#[derive(Debug)]
pub struct Fold {
    k: usize,
    base: Repository,
    test: Frame,
    normalization: Normalization,
}

impl Fold {
    /// Create fold `k` under `parent` from training and test tables, both in
    /// raw space. Statistics come from `normalization` when given, otherwise
    /// from the training table itself. Both tables are normalized and written
    /// together with the statistics and the fold's metadata; an existing
    /// `fold.k` directory is replaced wholesale.
    pub fn from_frames(
        parent: &Repository,
        k: usize,
        train: Table,
        test: Table,
        normalization: Option<&Path>,
    ) -> Result<Self> {
        let stats = match normalization {
            Some(path) => Stats::read(path)?,
            None => Stats::compute(&train)?,
        };
        Self::build(parent, k, train, test, stats)
    }

    pub(crate) fn build(
        parent: &Repository,
        k: usize,
        train: Table,
        test: Table,
        stats: Stats,
    ) -> Result<Self> {
        let folder = parent.fold_folder(k);
        if folder.exists() {
            fs::remove_dir_all(&folder).map_err(|e| error::io(&folder, e))?;
        }
        fs::create_dir_all(&folder).map_err(|e| error::io(&folder, e))?;

        let mut meta = parent.meta().clone();
        meta.fold_index = Some(k);
        let normalization = Normalization::from_stats(stats, meta.normalization_applicable);
        normalization.stats().write(folder.join(NORMALIZATION_CSV))?;
        let train = normalization.apply_to(&train)?;
        let test = normalization.apply_to(&test)?;
        meta.data = DataShape::of(&train);
        meta.write(folder.join(META_JSON))?;
        debug!(
            "fold {k}: {} training rows, {} test rows at {}",
            train.n_rows(),
            test.n_rows(),
            folder.display()
        );
        let data = Frame::create(folder.join(DATA_CSV), train)?;
        let test = Frame::create(folder.join(TEST_CSV), test)?;
        Ok(Fold {
            k,
            base: Repository::from_parts(folder, meta, data),
            test,
            normalization,
        })
    }

    /// Open fold `k` of `parent`. `k` may run to `parent` K inclusive, the
    /// improper fold's index; missing files are fatal.
    pub fn open(parent: &Repository, k: usize) -> Result<Self> {
        let max = parent.meta().k_folds;
        if k > max {
            return Err(Error::FoldIndexOutOfBounds {
                k,
                max,
                folder: parent.folder().to_path_buf(),
            });
        }
        let folder = parent.fold_folder(k);
        let meta = Meta::read(folder.join(META_JSON))?;
        let data = Frame::read(folder.join(DATA_CSV))?;
        let test = Frame::read(folder.join(TEST_CSV))?;
        let normalization =
            Normalization::read(folder.join(NORMALIZATION_CSV), meta.normalization_applicable)?;
        Ok(Fold {
            k,
            base: Repository::from_parts(folder, meta, data),
            test,
            normalization,
        })
    }

    /// This fold's index under its parent.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The held-out test frame, in canonical (normalized, rotated) space.
    pub fn test_data(&self) -> &Frame {
        &self.test
    }

    /// The `(n_test, M)` input block of the test table.
    pub fn test_x(&self) -> ArrayView2<'_, f64> {
        self.test.table().block(ColumnGroup::Input)
    }

    /// The `(n_test, L)` output block of the test table.
    pub fn test_y(&self) -> ArrayView2<'_, f64> {
        self.test.table().block(ColumnGroup::Output)
    }

    pub fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    fn rotation_path(&self) -> PathBuf {
        self.folder().join(ROTATION_CSV)
    }

    /// The cumulative rotation applied to this fold's inputs so far; the
    /// identity when none has been.
    pub fn input_rotation(&self) -> Result<Array2<f64>> {
        let path = self.rotation_path();
        if path.exists() {
            rotation::read_matrix(&path)
        } else {
            Ok(Array2::eye(self.m()))
        }
    }

    /// Rotate the Input block of both tables by `r` (`X <- X . r`, `r` must
    /// be `M x M`), write both, and fold `r` into the stored cumulative
    /// rotation. Undone only by applying the inverse rotation; the
    /// normalization inverse does not touch it.
    pub fn apply_input_rotation(&mut self, r: ArrayView2<f64>) -> Result<()> {
        rotate_input_block(self.base.data_frame_mut().table_mut(), r);
        self.base.data_frame_mut().write()?;
        rotate_input_block(self.test.table_mut(), r);
        self.test.write()?;
        let cumulative = self.input_rotation()?.dot(&r);
        rotation::write_matrix(self.rotation_path(), cumulative.view())?;
        debug!("fold {}: composed rotation into {}", self.k, self.rotation_path().display());
        Ok(())
    }

    /// Multiply input axis `j` of both tables by `factors[j]` and write both.
    /// Used by PCA import to whiten the rotated axes.
    pub(crate) fn scale_input_axes(&mut self, factors: &[f64]) -> Result<()> {
        scale_input_block(self.base.data_frame_mut().table_mut(), factors);
        self.base.data_frame_mut().write()?;
        scale_input_block(self.test.table_mut(), factors);
        self.test.write()?;
        Ok(())
    }
}

impl Dataset for Fold {
    fn folder(&self) -> &Path {
        self.base.folder()
    }

    fn meta(&self) -> &Meta {
        self.base.meta()
    }

    fn data(&self) -> &Frame {
        self.base.data()
    }
}

fn rotate_input_block(table: &mut Table, r: ArrayView2<f64>) {
    let rotated = table.block(ColumnGroup::Input).dot(&r);
    table.block_mut(ColumnGroup::Input).assign(&rotated);
}

fn scale_input_block(table: &mut Table, factors: &[f64]) {
    for (j, mut col) in table
        .block_mut(ColumnGroup::Input)
        .axis_iter_mut(Axis(1))
        .enumerate()
    {
        for v in col.iter_mut() {
            *v *= factors[j];
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Schema;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::tempdir;

    fn raw_table() -> Table {
        let schema = Schema::from_parts(&[], &["X1", "X2"], &["Y"]);
        let values = array![
            [0.1, 1.0, 5.0],
            [0.2, 2.0, 6.0],
            [0.3, 3.0, 7.0],
            [0.4, 4.0, 8.0],
            [0.5, 5.0, 9.0],
            [0.6, 6.0, 10.0],
        ];
        Table::from_values(schema, values)
    }

    fn parent(dir: &Path) -> Repository {
        Repository::create(dir.join("repo"), raw_table(), None).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn from_frames_writes_the_whole_fold() {
        let dir = tempdir().unwrap();
        let repo = parent(dir.path());
        let table = raw_table();
        let train = table.select_rows(&[0, 1, 2, 3]);
        let test = table.select_rows(&[4, 5]);
        let fold = Fold::from_frames(&repo, 0, train, test, None).unwrap();
        for name in [DATA_CSV, TEST_CSV, META_JSON, NORMALIZATION_CSV] {
            assert!(fold.folder().join(name).exists(), "{name} missing");
        }
        assert_eq!(fold.n(), 4);
        assert_eq!(fold.test_x().nrows(), 2);
        assert_eq!(fold.meta().fold_index, Some(0));
        // Written data is in canonical space: outputs of the training slice
        // are standardized.
        let y = fold.y();
        let mean = y.mean_axis(Axis(0)).unwrap()[0];
        assert!(mean.abs() < 1e-12, "training outputs not centred: {mean}");
    }

    #[test]
    fn open_round_trips_and_undoes_to_raw() {
        let dir = tempdir().unwrap();
        let repo = parent(dir.path());
        let table = raw_table();
        let train = table.select_rows(&[0, 1, 2, 3]);
        let test = table.select_rows(&[4, 5]);
        Fold::from_frames(&repo, 0, train.clone(), test, None).unwrap();
        let fold = Fold::open(&repo, 0).unwrap();
        let undone = fold
            .normalization()
            .undo_from(fold.data().table())
            .unwrap();
        for (a, b) in undone.values().iter().zip(train.values().iter()) {
            assert!(close(*a, *b), "undo drifted: {a} vs {b}");
        }
        assert_eq!(undone.index(), train.index());
    }

    #[test]
    fn open_checks_the_fold_index() {
        let dir = tempdir().unwrap();
        let repo = parent(dir.path());
        let err = Fold::open(&repo, 3).unwrap_err();
        assert!(matches!(err, Error::FoldIndexOutOfBounds { k: 3, max: 0, .. }));
    }

    #[test]
    fn supplied_statistics_override_the_training_slice() {
        let dir = tempdir().unwrap();
        let repo = parent(dir.path());
        let table = raw_table();
        // Statistics from the whole table, folds trained on half of it.
        let stats = Stats::compute(&table).unwrap();
        let path = dir.path().join("shared.csv");
        stats.write(&path).unwrap();
        let train = table.select_rows(&[0, 1, 2]);
        let test = table.select_rows(&[3, 4, 5]);
        let fold = Fold::from_frames(&repo, 0, train, test, Some(&path)).unwrap();
        assert_eq!(fold.normalization().stats(), &stats);
        assert_eq!(Stats::read(fold.folder().join(NORMALIZATION_CSV)).unwrap(), stats);
    }

    #[test]
    fn missing_rotation_artifact_reads_as_identity() {
        let dir = tempdir().unwrap();
        let repo = parent(dir.path());
        let table = raw_table();
        let fold = Fold::from_frames(
            &repo,
            0,
            table.select_rows(&[0, 1, 2]),
            table.select_rows(&[3, 4, 5]),
            None,
        )
        .unwrap();
        assert_eq!(fold.input_rotation().unwrap(), Array2::<f64>::eye(2));
    }

    #[test]
    fn rotations_compose_in_data_and_artifact() {
        let dir = tempdir().unwrap();
        let repo = parent(dir.path());
        let table = raw_table();
        let train = table.select_rows(&[0, 1, 2]);
        let test = table.select_rows(&[3, 4, 5]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let r1 = rotation::random_orthogonal(2, &mut rng);
        let r2 = rotation::random_orthogonal(2, &mut rng);

        let mut stepwise =
            Fold::from_frames(&repo, 0, train.clone(), test.clone(), None).unwrap();
        stepwise.apply_input_rotation(r1.view()).unwrap();
        stepwise.apply_input_rotation(r2.view()).unwrap();

        let mut at_once = Fold::from_frames(&repo, 1, train, test, None).unwrap();
        let product = r1.dot(&r2);
        at_once.apply_input_rotation(product.view()).unwrap();

        for (a, b) in stepwise.x().iter().zip(at_once.x().iter()) {
            assert!(close(*a, *b), "stepwise {a} vs combined {b}");
        }
        let cumulative = stepwise.input_rotation().unwrap();
        for (a, b) in cumulative.iter().zip(product.iter()) {
            assert!(close(*a, *b), "artifact {a} vs product {b}");
        }
        // Re-opened folds see exactly what was written.
        let reopened = Fold::open(&repo, 0).unwrap();
        assert_eq!(reopened.x(), stepwise.x());
    }

    #[test]
    fn axis_scaling_applies_per_column() {
        let dir = tempdir().unwrap();
        let repo = parent(dir.path());
        let table = raw_table();
        let mut fold = Fold::from_frames(
            &repo,
            0,
            table.select_rows(&[0, 1, 2]),
            table.select_rows(&[3, 4, 5]),
            None,
        )
        .unwrap();
        let before = fold.x().to_owned();
        fold.scale_input_axes(&[2.0, 0.5]).unwrap();
        for i in 0..before.nrows() {
            assert!(close(fold.x()[[i, 0]], before[[i, 0]] * 2.0));
            assert!(close(fold.x()[[i, 1]], before[[i, 1]] * 0.5));
        }
        let reopened = Fold::open(&repo, 0).unwrap();
        assert_eq!(reopened.x(), fold.x());
    }
}
