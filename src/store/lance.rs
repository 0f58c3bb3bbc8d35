use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use arrow_array::{
    ArrayRef, RecordBatch, RecordBatchIterator, StringArray,
    builder::{FixedSizeListBuilder, Float32Builder},
};
use arrow_schema::{DataType, Field, Schema};
use uuid::Uuid;

use crate::cli::IdPolicy;
use crate::record::{EmbeddingRecord, Split};

const COLLECTION: &str = "gender_embeddings";

/// Blocking facade over a `LanceDB` database. The connection and its tokio
/// runtime live together so handles never outlive the runtime.
pub(super) struct LanceStore {
    conn: lancedb::Connection,
    rt: tokio::runtime::Runtime,
}

impl LanceStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let rt = tokio::runtime::Runtime::new()?;
        let conn = rt.block_on(lancedb::connect(path.to_string_lossy().as_ref()).execute())?;
        Ok(Self { conn, rt })
    }

    /// Persist one split.
    ///
    /// `Overwrite` keys rows by positional id (`{split}_{index}`) and
    /// upserts, so identical reruns replace prior rows. `Append` generates
    /// fresh uuid ids and plain-inserts, so reruns accumulate.
    pub fn write(
        &mut self,
        records: &[EmbeddingRecord],
        split: Split,
        policy: IdPolicy,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let dim = uniform_dim(records)?;
        let ids = make_ids(split, records.len(), policy);
        let batch = to_batch(records, &ids, split, dim)?;
        let schema = batch.schema();

        self.rt.block_on(async {
            let table = get_or_create_collection(&self.conn, dim).await?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            match policy {
                IdPolicy::Overwrite => {
                    let mut merge = table.merge_insert(&["id"]);
                    merge
                        .when_matched_update_all(None)
                        .when_not_matched_insert_all();
                    merge.execute(Box::new(batches)).await?;
                }
                IdPolicy::Append => {
                    table.add(Box::new(batches)).execute().await?;
                }
            }
            Ok(())
        })
    }
}

/// Record ids for one batch.
fn make_ids(split: Split, count: usize, policy: IdPolicy) -> Vec<String> {
    match policy {
        IdPolicy::Overwrite => (0..count).map(|i| format!("{split}_{i}")).collect(),
        IdPolicy::Append => (0..count)
            .map(|_| format!("{split}_{}", Uuid::new_v4()))
            .collect(),
    }
}

/// All embeddings in a run come from one model, so the dimensionality must
/// be uniform.
fn uniform_dim(records: &[EmbeddingRecord]) -> Result<usize> {
    let dim = records[0].embedding.len();
    for record in records {
        if record.embedding.len() != dim {
            bail!(
                "embedding dimension mismatch: {} has {} dims, expected {dim}",
                record.file_path,
                record.embedding.len()
            );
        }
    }
    Ok(dim)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn collection_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            false,
        ),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("label", DataType::Utf8, false),
        Field::new("split", DataType::Utf8, false),
    ]))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn build_embedding_column(records: &[EmbeddingRecord], dim: usize) -> ArrayRef {
    let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32)
        .with_field(Field::new("item", DataType::Float32, true));
    for record in records {
        for &val in &record.embedding {
            builder.values().append_value(val);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn to_batch(
    records: &[EmbeddingRecord],
    ids: &[String],
    split: Split,
    dim: usize,
) -> Result<RecordBatch> {
    let schema = collection_schema(dim);

    let id_strs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let file_paths: Vec<&str> = records.iter().map(|r| r.file_path.as_str()).collect();
    let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
    let splits: Vec<&str> = records.iter().map(|_| split.as_str()).collect();

    let batch = RecordBatch::try_new(schema, vec![
        Arc::new(StringArray::from(id_strs)) as ArrayRef,
        build_embedding_column(records, dim),
        Arc::new(StringArray::from(file_paths)),
        Arc::new(StringArray::from(labels)),
        Arc::new(StringArray::from(splits)),
    ])?;

    Ok(batch)
}

/// Get or create the embeddings collection.
async fn get_or_create_collection(
    conn: &lancedb::Connection,
    dim: usize,
) -> Result<lancedb::Table> {
    let tables = conn.table_names().execute().await?;
    if tables.iter().any(|n| n == COLLECTION) {
        Ok(conn.open_table(COLLECTION).execute().await?)
    } else {
        let schema = collection_schema(dim);
        let empty = RecordBatch::new_empty(Arc::clone(&schema));
        let batches = RecordBatchIterator::new(vec![Ok(empty)], schema);
        Ok(conn
            .create_table(COLLECTION, Box::new(batches))
            .execute()
            .await?)
    }
}
