use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::error::{self, Error, Result};
use crate::frame::{Frame, ReadOptions};
use crate::meta::{DataShape, Meta, Origin};
use crate::store::fold::Fold;
use crate::store::{partition, Dataset, DATA_CSV, META_JSON, NORMALIZATION_CSV};
use crate::table::{ColumnGroup, Table};
use crate::transform::{rotation, Stats};

/// Whitening leaves axes with eigenvalues at or below this floor unscaled.
const EIGENVALUE_FLOOR: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How [`Repository::into_k_folds`] partitions and normalizes.
#[derive(Debug, Clone)]
pub struct FoldOptions {
    /// Shuffle the row order before building blocks.
    pub shuffle_before_folding: bool,
    /// An existing statistics file every fold should use, instead of
    /// statistics computed from the unfolded dataset.
    pub normalization: Option<PathBuf>,
    /// `false` makes every fold's normalization the identity.
    pub normalization_applicable: bool,
}

impl Default for FoldOptions {
    fn default() -> Self {
        FoldOptions {
            shuffle_before_folding: false,
            normalization: None,
            normalization_applicable: true,
        }
    }
}

/// What [`Repository::rotate_folds`] does with a matrix that is not an
/// orthogonal `M x M` rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedRotation {
    /// Warn and substitute a Haar-random rotation.
    #[default]
    Resample,
    /// Fail with [`Error::MalformedRotation`].
    Reject,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// A folder holding one primary data table and its metadata, and owning any
/// `fold.<k>` sub-directories built from it.
#[derive(Debug)]
pub struct Repository {
    folder: PathBuf,
    meta: Meta,
    data: Frame,
}

impl Repository {
    /// Create a repository at `folder` around `table`. The folder must not
    /// already hold anything; clearing it is the caller's decision. `meta`
    /// seeds the metadata (its data shape is recomputed from the table).
    pub fn create(folder: impl Into<PathBuf>, table: Table, meta: Option<Meta>) -> Result<Self> {
        let folder = folder.into();
        if folder.exists() {
            let mut entries = fs::read_dir(&folder).map_err(|e| error::io(&folder, e))?;
            if entries.next().is_some() {
                return Err(Error::FolderNotEmpty(folder));
            }
        } else {
            fs::create_dir_all(&folder).map_err(|e| error::io(&folder, e))?;
        }
        let mut meta = meta.unwrap_or_else(|| Meta::for_table(&table));
        meta.data = DataShape::of(&table);
        meta.fold_index = None;
        let data = Frame::create(folder.join(DATA_CSV), table)?;
        meta.write(folder.join(META_JSON))?;
        info!("created repository at {}", folder.display());
        Ok(Repository { folder, meta, data })
    }

    /// Open an existing repository. Missing table or metadata is fatal.
    pub fn open(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        let meta = Meta::read(folder.join(META_JSON))?;
        let data = Frame::read(folder.join(DATA_CSV))?;
        Ok(Repository { folder, meta, data })
    }

    /// Import an external delimited file, recording its provenance in the
    /// metadata.
    pub fn from_csv(
        folder: impl Into<PathBuf>,
        csv: impl AsRef<Path>,
        options: &ReadOptions,
    ) -> Result<Self> {
        let csv = csv.as_ref();
        let table = Frame::import(csv, options)?;
        let mut meta = Meta::for_table(&table);
        meta.origin = Some(Origin {
            csv: csv.display().to_string(),
            options: options.clone(),
        });
        info!("imported {} rows from {}", table.n_rows(), csv.display());
        Self::create(folder, table, Some(meta))
    }

    /// Import an external delimited file and whiten its inputs: build one
    /// proper fold over all data, estimate the input covariance there, rotate
    /// every fold onto the principal axes (eigenvalues descending) and
    /// rescale each rotated axis by `1 / sqrt(eigenvalue)`. Near-null axes
    /// stay unscaled.
    pub fn from_csv_pca<R: Rng + ?Sized>(
        folder: impl Into<PathBuf>,
        csv: impl AsRef<Path>,
        options: &ReadOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let mut repo = Self::from_csv(folder, csv, options)?;
        repo.into_k_folds(-1, &FoldOptions::default(), rng)?;
        let cov = {
            let fold = Fold::open(&repo, 0)?;
            rotation::covariance(fold.x())?
        };
        let (eigenvalues, eigenvectors) = rotation::principal_axes(cov.view());
        repo.rotate_folds(Some(eigenvectors.view()), MalformedRotation::Resample, rng)?;
        let factors: Vec<f64> = eigenvalues
            .iter()
            .map(|&v| if v <= EIGENVALUE_FLOOR { 1.0 } else { v.sqrt().recip() })
            .collect();
        let mut fold = Fold::open(&repo, 0)?;
        fold.scale_input_axes(&factors)?;
        info!(
            "whitened {} principal axes at {}",
            factors.len(),
            repo.folder.display()
        );
        Ok(repo)
    }

    /// Partition into `|k|` proper folds, indexed `0..|k|`. Positive `k` adds
    /// the improper fold (training = test = everything) at index `k`;
    /// negative `k` suppresses it. All previous fold directories are purged
    /// first. Every fold normalizes with one set of statistics: the
    /// caller-supplied file, or statistics of the whole unfolded dataset,
    /// written to the repository's own `normalization.csv`.
    pub fn into_k_folds<R: Rng + ?Sized>(
        &mut self,
        k: i64,
        options: &FoldOptions,
        rng: &mut R,
    ) -> Result<&mut Self> {
        let n = self.data.table().n_rows();
        if k == 0 || k.unsigned_abs() > n as u64 {
            return Err(Error::FoldCountOutOfBounds { k, n });
        }
        let k_abs = k.unsigned_abs() as usize;
        for at in 0..=self.meta.k_folds.max(k_abs) {
            let dir = self.fold_folder(at);
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| error::io(&dir, e))?;
            }
        }
        let order = partition::row_order(n, options.shuffle_before_folding, rng);
        self.meta.k_folds = k_abs;
        self.meta.has_improper_fold = k > 0;
        self.meta.shuffle_before_folding = options.shuffle_before_folding;
        self.meta.normalization_applicable = options.normalization_applicable;
        self.meta.write(self.folder.join(META_JSON))?;

        let stats = match &options.normalization {
            Some(path) => Stats::read(path)?,
            None => {
                let stats = Stats::compute(self.data.table())?;
                stats.write(self.folder.join(NORMALIZATION_CSV))?;
                stats
            }
        };
        if k > 0 {
            let whole = self.data.table().select_rows(&order);
            Fold::build(self, k_abs, whole.clone(), whole, stats.clone())?;
        }
        let indicator = partition::fold_indicator(n, k_abs, rng);
        for at in 0..k_abs {
            let split = partition::split(&order, &indicator, at);
            let train = self.data.table().select_rows(&split.train);
            let test = self.data.table().select_rows(&split.test);
            Fold::build(self, at, train, test, stats.clone())?;
        }
        info!(
            "folded {n} rows into {k_abs} folds{} at {}",
            if k > 0 { " plus an improper fold" } else { "" },
            self.folder.display()
        );
        Ok(self)
    }

    /// Apply one rotation to every fold's inputs. `None` applies the
    /// identity. A matrix that is not an orthogonal `M x M` rotation is
    /// handled per `policy`.
    pub fn rotate_folds<R: Rng + ?Sized>(
        &mut self,
        rotation: Option<ArrayView2<f64>>,
        policy: MalformedRotation,
        rng: &mut R,
    ) -> Result<&mut Self> {
        let m = self.m();
        let r: Array2<f64> = match rotation {
            None => Array2::eye(m),
            Some(candidate) if rotation::is_orthogonal(candidate, m) => candidate.to_owned(),
            Some(candidate) => match policy {
                MalformedRotation::Resample => {
                    warn!(
                        "{}x{} rotation is not an orthogonal {m}x{m} matrix; substituting a random one",
                        candidate.nrows(),
                        candidate.ncols()
                    );
                    rotation::random_orthogonal(m, rng)
                }
                MalformedRotation::Reject => {
                    return Err(Error::MalformedRotation {
                        rows: candidate.nrows(),
                        cols: candidate.ncols(),
                        m,
                    })
                }
            },
        };
        for at in self.folds() {
            let mut fold = Fold::open(self, at)?;
            fold.apply_input_rotation(r.view())?;
        }
        info!(
            "rotated inputs of {} folds at {}",
            self.folds().len(),
            self.folder.display()
        );
        Ok(self)
    }

    /// Indices of the folds this repository holds: empty before folding,
    /// otherwise `0..K` plus the improper fold when present.
    pub fn folds(&self) -> Range<usize> {
        if self.meta.k_folds < 1 {
            0..0
        } else if self.meta.has_improper_fold {
            0..self.meta.k_folds + 1
        } else {
            0..self.meta.k_folds
        }
    }

    pub fn fold_folder(&self, k: usize) -> PathBuf {
        self.folder.join(format!("fold.{k}"))
    }

    /// Write `L` single-output sub-repositories `Y.<l>`, each holding every
    /// Category and Input column plus output `l`. Existing splits are
    /// replaced; fold directories are not copied, so each split starts
    /// unfolded.
    pub fn split_outputs(&self) -> Result<Vec<Repository>> {
        let table = self.data.table();
        let schema = table.schema();
        let leading: Vec<usize> = schema
            .group_span(ColumnGroup::Category)
            .chain(schema.group_span(ColumnGroup::Input))
            .collect();
        let output = schema.group_span(ColumnGroup::Output);
        let mut splits = Vec::with_capacity(output.len());
        for (l, at) in output.enumerate() {
            let mut cols = leading.clone();
            cols.push(at);
            let sub = table.select_columns(&cols);
            let folder = self.folder.join(format!("Y.{l}"));
            if folder.exists() {
                fs::remove_dir_all(&folder).map_err(|e| error::io(&folder, e))?;
            }
            let mut meta = self.meta.clone();
            meta.k_folds = 0;
            meta.has_improper_fold = false;
            splits.push(Repository::create(folder, sub, Some(meta))?);
        }
        info!("split {} outputs of {}", splits.len(), self.folder.display());
        Ok(splits)
    }

    /// Index and path of every `Y.<l>` split present on disk, ascending.
    pub fn output_splits(&self) -> Result<Vec<(usize, PathBuf)>> {
        let mut splits = Vec::new();
        let entries = fs::read_dir(&self.folder).map_err(|e| error::io(&self.folder, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| error::io(&self.folder, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(index) = name
                .to_string_lossy()
                .strip_prefix("Y.")
                .and_then(|tail| tail.parse::<usize>().ok())
            {
                splits.push((index, entry.path()));
            }
        }
        splits.sort_by_key(|(index, _)| *index);
        Ok(splits)
    }

    pub(crate) fn from_parts(folder: PathBuf, meta: Meta, data: Frame) -> Self {
        Repository { folder, meta, data }
    }

    pub(crate) fn data_frame_mut(&mut self) -> &mut Frame {
        &mut self.data
    }
}

impl Dataset for Repository {
    fn folder(&self) -> &Path {
        &self.folder
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn data(&self) -> &Frame {
        &self.data
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
