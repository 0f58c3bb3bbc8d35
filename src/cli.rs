use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Flag names follow the original batch-tool convention (snake_case) so
/// existing invocations keep working.
#[derive(Parser)]
#[command(name = "spkembed", about = "Extract speaker embeddings from audio datasets")]
pub struct Cli {
    /// Root directory containing one audio subdirectory per category.
    #[arg(long = "dataset_dir", default_value = "./dataset")]
    pub dataset_dir: PathBuf,

    /// Path to the train manifest (JSON array of {"filename": ...}).
    #[arg(long = "train_dir", default_value = "./train_audio")]
    pub train_dir: PathBuf,

    /// Path to the test manifest.
    #[arg(long = "test_dir", default_value = "./test_audio")]
    pub test_dir: PathBuf,

    /// Directory containing the pretrained ONNX model (model.onnx).
    #[arg(long = "pretrain_dir", default_value = "./pretrain_dir")]
    pub pretrain_dir: PathBuf,

    /// Embedding persistence format.
    #[arg(long, value_enum)]
    pub output: OutputFormat,

    /// Output directory (npy) or database path (lancedb).
    #[arg(long = "save_path", default_value = "./embeddings")]
    pub save_path: PathBuf,

    /// Id policy for the lancedb output: overwrite reuses positional ids
    /// (reruns replace prior rows), append generates fresh unique ids.
    #[arg(long = "id-policy", value_enum, default_value = "overwrite")]
    pub id_policy: IdPolicy,

    /// Fail when any manifest entry resolves to no file on disk.
    #[arg(long)]
    pub strict: bool,

    /// Suppress stderr output (progress bars, status messages).
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single NPZ array container bundling both splits.
    Npy,
    /// LanceDB collection with one row per record.
    Lancedb,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdPolicy {
    /// Positional ids ({split}_{index}); identical reruns replace rows.
    Overwrite,
    /// Fresh uuid-based ids; reruns accumulate.
    Append,
}
