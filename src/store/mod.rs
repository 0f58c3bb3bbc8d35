mod lance;
mod npz;

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::IdPolicy;
use crate::record::{EmbeddingRecord, Split};

/// Persistence strategy, selected by `--output`.
pub enum Writer {
    /// Single NPZ container bundling both splits.
    Npz { save_path: PathBuf },
    /// LanceDB collection with one row per record.
    Lance {
        save_path: PathBuf,
        id_policy: IdPolicy,
    },
}

impl Writer {
    /// Persist both splits. Records are borrowed only for the duration of
    /// the call.
    pub fn persist(
        &self,
        train: &[EmbeddingRecord],
        test: &[EmbeddingRecord],
    ) -> Result<()> {
        match self {
            Writer::Npz { save_path } => {
                let path = npz::save(train, test, save_path)?;
                tracing::info!(path = %path.display(), "wrote NPZ container");
                Ok(())
            }
            Writer::Lance {
                save_path,
                id_policy,
            } => {
                let mut store = lance::LanceStore::open(save_path)?;
                store.write(train, Split::Train, *id_policy)?;
                store.write(test, Split::Test, *id_policy)?;
                tracing::info!(path = %save_path.display(), "wrote LanceDB collection");
                Ok(())
            }
        }
    }
}
