//! Builds a small noisy trigonometric dataset and runs it through the whole
//! pipeline: repository creation, five-fold partitioning with shuffling, and
//! a random rotation of the normalized input space.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crossfold::transform::rotation;
use crossfold::{Dataset, Fold, FoldOptions, MalformedRotation, Repository, Schema, Table};

fn main() -> Result<()> {
    env_logger::init();

    let folder = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_repo"));
    if folder.exists() {
        bail!("{} already exists; pick a fresh folder", folder.display());
    }
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    // y = sin(pi (x1 + x2)) plus noise, inputs uniform on [-1, 1).
    let n = 200;
    let mut values = Array2::zeros((n, 3));
    for mut row in values.rows_mut() {
        let x1 = rng.gen_range(-1.0..1.0);
        let x2 = rng.gen_range(-1.0..1.0);
        let noise: f64 = rng.sample(StandardNormal);
        row[0] = x1;
        row[1] = x2;
        row[2] = (std::f64::consts::PI * (x1 + x2)).sin() + 0.1 * noise;
    }
    let schema = Schema::from_parts(&[], &["X1", "X2"], &["Y"]);
    let table = Table::from_values(schema, values);

    let mut repo = Repository::create(&folder, table, None)
        .with_context(|| format!("creating a repository at {}", folder.display()))?;
    let options = FoldOptions {
        shuffle_before_folding: true,
        ..FoldOptions::default()
    };
    repo.into_k_folds(5, &options, &mut rng)
        .context("partitioning into folds")?;

    let r = rotation::random_orthogonal(repo.m(), &mut rng);
    repo.rotate_folds(Some(r.view()), MalformedRotation::Reject, &mut rng)
        .context("rotating fold inputs")?;

    for k in repo.folds() {
        let fold = Fold::open(&repo, k)?;
        println!(
            "fold {k}: {} training rows, {} test rows at {}",
            fold.n(),
            fold.test_x().nrows(),
            fold.folder().display()
        );
    }
    println!(
        "Wrote {n} rows, {} folds and one rotation to {}",
        repo.folds().len(),
        folder.display()
    );
    Ok(())
}
