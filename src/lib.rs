//! File-backed tabular dataset repositories for cross-validated modeling.
//!
//! A [`Repository`] owns one numeric data table, stored as CSV with a
//! two-level column header (Category / Input / Output groups over variable
//! names) next to a JSON metadata document. [`Repository::into_k_folds`]
//! partitions it into `fold.<k>` sub-folders, each holding a training and a
//! test table mapped to canonical space: probit-transformed inputs and
//! standardized outputs, reversible through the fold's [`Normalization`].
//! Folds can further be rotated onto new input axes
//! ([`Repository::rotate_folds`]), or imported pre-whitened along principal
//! components ([`Repository::from_csv_pca`]). Every transform is recorded on
//! disk, so a repository re-opened later sees exactly the state it was left
//! in.
//!
//! Pipeline:
//! ```text
//!  foreign .csv
//!        │  from_csv / from_csv_pca
//!        ▼
//!   ┌────────────┐
//!   │ Repository  │  data.csv + meta.json in one folder
//!   └────────────┘
//!        │  into_k_folds(K)
//!        ▼
//!   ┌────────────┐
//!   │  Fold 0..K  │  fold.k/: train + test, normalized
//!   └────────────┘     (probit inputs, standardized outputs)
//!        │  rotate_folds(R)
//!        ▼
//!   canonical model space; Normalization::undo_from maps back
//! ```

pub mod error;
pub mod frame;
pub mod meta;
pub mod store;
pub mod table;
pub mod transform;

pub use error::{Error, Result};
pub use frame::{Frame, ReadOptions};
pub use meta::{DataShape, Meta, Origin};
pub use store::{Dataset, Fold, FoldOptions, MalformedRotation, Repository};
pub use table::{Column, ColumnGroup, Schema, Table};
pub use transform::{Normalization, Stats};
