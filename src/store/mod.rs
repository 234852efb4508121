//! File-backed dataset stores: the Repository/Fold hierarchy.

pub mod fold;
pub mod partition;
pub mod repository;

pub use fold::Fold;
pub use repository::{FoldOptions, MalformedRotation, Repository};

use std::path::Path;

use ndarray::ArrayView2;

use crate::frame::Frame;
use crate::meta::Meta;
use crate::table::ColumnGroup;

// File names fixed by the on-disk format.
pub(crate) const DATA_CSV: &str = "data.csv";
pub(crate) const META_JSON: &str = "meta.json";
pub(crate) const TEST_CSV: &str = "test.csv";
pub(crate) const NORMALIZATION_CSV: &str = "normalization.csv";
pub(crate) const ROTATION_CSV: &str = "rotation.csv";

/// What a model consumer reads from any dataset folder, Repository and Fold
/// alike. Slicing is by recorded header group, never by raw column position.
pub trait Dataset {
    fn folder(&self) -> &Path;
    fn meta(&self) -> &Meta;
    /// The primary (for a Fold: training) frame.
    fn data(&self) -> &Frame;

    /// The `(N, M)` input block of the primary table.
    fn x(&self) -> ArrayView2<'_, f64> {
        self.data().table().block(ColumnGroup::Input)
    }

    /// The `(N, L)` output block of the primary table.
    fn y(&self) -> ArrayView2<'_, f64> {
        self.data().table().block(ColumnGroup::Output)
    }

    fn n(&self) -> usize {
        self.data().table().n_rows()
    }

    fn m(&self) -> usize {
        self.data().table().schema().m()
    }

    fn l(&self) -> usize {
        self.data().table().schema().l()
    }
}
