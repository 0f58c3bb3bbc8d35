use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use ndarray::{Array1, Array2};
use ndarray_npy::NpzWriter;

use crate::record::{EmbeddingRecord, Split};

const ARCHIVE_NAME: &str = "embeddings.npz";

/// Write both splits into a single NPZ container at
/// `save_path/embeddings.npz`, overwriting any existing archive.
///
/// Per split the archive holds `{split}_embeddings` (N x D f32),
/// `{split}_file_paths`, and `{split}_labels`; the string columns are
/// stored newline-joined as u8 arrays.
pub(super) fn save(
    train: &[EmbeddingRecord],
    test: &[EmbeddingRecord],
    save_path: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(save_path)?;
    let path = save_path.join(ARCHIVE_NAME);

    let mut npz = NpzWriter::new(File::create(&path)?);
    add_split(&mut npz, Split::Train, train)?;
    add_split(&mut npz, Split::Test, test)?;
    npz.finish()?;

    Ok(path)
}

fn add_split(
    npz: &mut NpzWriter<File>,
    split: Split,
    records: &[EmbeddingRecord],
) -> Result<()> {
    npz.add_array(&format!("{split}_embeddings"), &embedding_matrix(records)?)?;
    npz.add_array(
        &format!("{split}_file_paths"),
        &joined_bytes(records, |r| r.file_path.as_str()),
    )?;
    npz.add_array(
        &format!("{split}_labels"),
        &joined_bytes(records, |r| r.label.as_str()),
    )?;
    Ok(())
}

/// Stack record embeddings into an N x D matrix. The dimensionality is
/// uniform within a run (single model); a mismatch is a hard error.
fn embedding_matrix(records: &[EmbeddingRecord]) -> Result<Array2<f32>> {
    let dim = records.first().map_or(0, |r| r.embedding.len());
    let mut flat = Vec::with_capacity(records.len() * dim);
    for record in records {
        if record.embedding.len() != dim {
            bail!(
                "embedding dimension mismatch: {} has {} dims, expected {dim}",
                record.file_path,
                record.embedding.len()
            );
        }
        flat.extend_from_slice(&record.embedding);
    }
    Ok(Array2::from_shape_vec((records.len(), dim), flat)?)
}

fn joined_bytes(records: &[EmbeddingRecord], field: fn(&EmbeddingRecord) -> &str) -> Array1<u8> {
    let joined = records.iter().map(field).collect::<Vec<_>>().join("\n");
    Array1::from_vec(joined.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray_npy::NpzReader;
    use tempfile::TempDir;

    fn make_record(file_path: &str, label: &str, embedding: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            file_path: file_path.to_string(),
            embedding,
            label: label.to_string(),
        }
    }

    fn sample_splits() -> (Vec<EmbeddingRecord>, Vec<EmbeddingRecord>) {
        let train = vec![
            make_record("/data/en/a.wav", "en", vec![1.0, 2.0, 3.0]),
            make_record("/data/de/b.wav", "de", vec![4.0, 5.0, 6.0]),
        ];
        let test = vec![make_record("/data/en/c.wav", "en", vec![7.0, 8.0, 9.0])];
        (train, test)
    }

    #[test]
    fn test_round_trip() {
        let tmp = TempDir::new().unwrap();
        let (train, test) = sample_splits();

        let path = save(&train, &test, tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("embeddings.npz"));

        let mut npz = NpzReader::new(File::open(&path).unwrap()).unwrap();
        let train_embs: Array2<f32> = npz.by_name("train_embeddings").unwrap();
        assert_eq!(train_embs.shape(), &[2, 3]);
        assert!((train_embs[[1, 2]] - 6.0).abs() < f32::EPSILON);

        let test_embs: Array2<f32> = npz.by_name("test_embeddings").unwrap();
        assert_eq!(test_embs.shape(), &[1, 3]);

        let labels: Array1<u8> = npz.by_name("train_labels").unwrap();
        assert_eq!(String::from_utf8(labels.to_vec()).unwrap(), "en\nde");

        let paths: Array1<u8> = npz.by_name("test_file_paths").unwrap();
        assert_eq!(
            String::from_utf8(paths.to_vec()).unwrap(),
            "/data/en/c.wav"
        );
    }

    #[test]
    fn test_identical_inputs_identical_bytes() {
        let tmp_a = TempDir::new().unwrap();
        let tmp_b = TempDir::new().unwrap();
        let (train, test) = sample_splits();

        let path_a = save(&train, &test, tmp_a.path()).unwrap();
        let path_b = save(&train, &test, tmp_b.path()).unwrap();

        let bytes_a = fs::read(path_a).unwrap();
        let bytes_b = fs::read(path_b).unwrap();
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn test_overwrites_existing_archive() {
        let tmp = TempDir::new().unwrap();
        let (train, test) = sample_splits();

        save(&train, &test, tmp.path()).unwrap();
        // Second run with one fewer record must fully replace the archive.
        let path = save(&train[..1], &test, tmp.path()).unwrap();

        let mut npz = NpzReader::new(File::open(&path).unwrap()).unwrap();
        let train_embs: Array2<f32> = npz.by_name("train_embeddings").unwrap();
        assert_eq!(train_embs.shape(), &[1, 3]);
    }

    #[test]
    fn test_creates_save_path() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("out/deep");
        let (train, test) = sample_splits();

        let path = save(&train, &test, &nested).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_empty_splits() {
        let tmp = TempDir::new().unwrap();
        let path = save(&[], &[], tmp.path()).unwrap();

        let mut npz = NpzReader::new(File::open(&path).unwrap()).unwrap();
        let train_embs: Array2<f32> = npz.by_name("train_embeddings").unwrap();
        assert_eq!(train_embs.shape(), &[0, 0]);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let records = vec![
            make_record("/a.wav", "x", vec![1.0, 2.0]),
            make_record("/b.wav", "y", vec![1.0, 2.0, 3.0]),
        ];
        assert!(embedding_matrix(&records).is_err());
    }
}
