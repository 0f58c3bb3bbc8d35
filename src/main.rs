#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod cli;
mod embed;
mod locate;
mod record;
mod store;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Result, bail};
use clap::Parser;

use cli::{Cli, OutputFormat};
use embed::{Device, Embedder};
use record::{Split, assign_labels};
use store::Writer;

fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Linear pipeline: validate inputs, resolve both manifests, extract both
/// splits through one model instance, label, persist.
fn run(cli: Cli) -> Result<()> {
    validate_inputs(&cli.train_dir, &cli.test_dir)?;

    let train_paths = resolve(&cli.train_dir, &cli.dataset_dir, Split::Train, cli.strict)?;
    let test_paths = resolve(&cli.test_dir, &cli.dataset_dir, Split::Test, cli.strict)?;

    let device = Device::detect();
    tracing::info!(%device, pretrain_dir = %cli.pretrain_dir.display(), "loading model");
    let mut embedder = Embedder::load(&cli.pretrain_dir, device)?;

    let mut train_records = embedder.extract(&train_paths, cli.quiet)?;
    let mut test_records = embedder.extract(&test_paths, cli.quiet)?;

    assign_labels(&mut train_records);
    assign_labels(&mut test_records);

    let writer = match cli.output {
        OutputFormat::Npy => Writer::Npz {
            save_path: cli.save_path,
        },
        OutputFormat::Lancedb => Writer::Lance {
            save_path: cli.save_path,
            id_policy: cli.id_policy,
        },
    };
    writer.persist(&train_records, &test_records)?;

    if !cli.quiet {
        eprintln!(
            "Done: {} train, {} test embeddings",
            train_records.len(),
            test_records.len()
        );
    }
    Ok(())
}

/// Both manifest paths must exist before any model work begins.
fn validate_inputs(train_dir: &Path, test_dir: &Path) -> Result<()> {
    for (flag, path) in [("--train_dir", train_dir), ("--test_dir", test_dir)] {
        if !path.exists() {
            bail!("{flag} path {} does not exist", path.display());
        }
    }
    Ok(())
}

/// Resolve one manifest, reporting entries that matched nothing. A miss is
/// a warning by default; `--strict` makes it fatal.
fn resolve(
    manifest: &Path,
    dataset_root: &Path,
    split: Split,
    strict: bool,
) -> Result<Vec<PathBuf>> {
    let resolution = locate::locate(manifest, dataset_root)?;

    if !resolution.unresolved.is_empty() {
        for filename in &resolution.unresolved {
            tracing::warn!(
                split = split.as_str(),
                filename = filename.as_str(),
                "manifest entry not found under any dataset subdirectory"
            );
        }
        if strict {
            bail!(
                "{} unresolved manifest entries in {split} split (run without --strict to skip them)",
                resolution.unresolved.len()
            );
        }
    }

    Ok(resolution.resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    #[test]
    fn test_validate_inputs_missing_train() {
        let tmp = TempDir::new().unwrap();
        let test_manifest = tmp.path().join("test.json");
        fs::write(&test_manifest, "[]").unwrap();

        let err =
            validate_inputs(&tmp.path().join("missing.json"), &test_manifest).unwrap_err();
        assert!(err.to_string().contains("--train_dir"));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_inputs_ok() {
        let tmp = TempDir::new().unwrap();
        let train = tmp.path().join("train.json");
        let test = tmp.path().join("test.json");
        fs::write(&train, "[]").unwrap();
        fs::write(&test, "[]").unwrap();
        assert!(validate_inputs(&train, &test).is_ok());
    }

    #[test]
    fn test_resolve_strict_fails_on_miss() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("dataset");
        fs::create_dir_all(root.join("en")).unwrap();
        fs::write(root.join("en/a.wav"), b"").unwrap();

        let manifest = tmp.path().join("train.json");
        fs::write(
            &manifest,
            r#"[{"filename": "a.wav"}, {"filename": "ghost.wav"}]"#,
        )
        .unwrap();

        assert!(resolve(&manifest, &root, Split::Train, true).is_err());

        let paths = resolve(&manifest, &root, Split::Train, false).unwrap();
        assert_eq!(paths, vec![root.join("en/a.wav")]);
    }
}
