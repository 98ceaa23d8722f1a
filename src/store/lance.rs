use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array, UInt64Array, types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use futures::stream::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use std::collections::HashMap;
use std::sync::Arc;

use crate::parser::Chunk;

/// One chunk row read back from the vector table
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: u64,
    pub path: String,
    pub kind: String,
    pub name: Option<String>,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub doc: Option<String>,
    pub model_id: String,
}

/// Embedded LanceDB table holding chunk rows and their vectors.
///
/// Each row carries the model identifier of the embedding that produced it;
/// vector queries always filter on the active model so rows written by a
/// different model can never surface as semantic matches.
pub struct ChunkTable {
    connection: Connection,
    table_name: String,
    dimension: usize,
}

impl ChunkTable {
    pub async fn open(connection: Connection, table_name: &str, dimension: usize) -> Result<Self> {
        let table = Self {
            connection,
            table_name: table_name.to_string(),
            dimension,
        };
        table.ensure_table().await?;
        Ok(table)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("id", DataType::UInt64, false),
            Field::new("path", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("language", DataType::Utf8, false),
            Field::new("start_line", DataType::UInt32, false),
            Field::new("end_line", DataType::UInt32, false),
            Field::new("start_byte", DataType::UInt64, false),
            Field::new("end_byte", DataType::UInt64, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("doc", DataType::Utf8, true),
            Field::new("model_id", DataType::Utf8, false),
            Field::new("indexed_at", DataType::Utf8, false),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        if table_names.contains(&self.table_name) {
            return Ok(());
        }

        let schema = self.schema();
        let empty_batch = RecordBatch::new_empty(schema.clone());
        let batches = RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema);

        self.connection
            .create_table(&self.table_name, Box::new(batches))
            .execute()
            .await
            .with_context(|| format!("Failed to create table '{}'", self.table_name))?;

        tracing::debug!("Created vector table '{}'", self.table_name);
        Ok(())
    }

    async fn table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table '{}'", self.table_name))
    }

    fn record_batch(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        model_id: &str,
    ) -> Result<RecordBatch> {
        let schema = self.schema();
        let indexed_at = chrono::Utc::now().to_rfc3339();

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            embeddings
                .iter()
                .map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>())),
            self.dimension as i32,
        );

        let id_array = UInt64Array::from(chunks.iter().map(|c| c.id()).collect::<Vec<_>>());
        let path_array =
            StringArray::from(chunks.iter().map(|c| c.path.as_str()).collect::<Vec<_>>());
        let kind_array =
            StringArray::from(chunks.iter().map(|c| c.kind.as_str()).collect::<Vec<_>>());
        let name_array =
            StringArray::from(chunks.iter().map(|c| c.name.as_deref()).collect::<Vec<_>>());
        let language_array = StringArray::from(
            chunks
                .iter()
                .map(|c| c.language.as_str())
                .collect::<Vec<_>>(),
        );
        let start_line_array =
            UInt32Array::from(chunks.iter().map(|c| c.start_line).collect::<Vec<_>>());
        let end_line_array =
            UInt32Array::from(chunks.iter().map(|c| c.end_line).collect::<Vec<_>>());
        let start_byte_array = UInt64Array::from(
            chunks
                .iter()
                .map(|c| c.start_byte as u64)
                .collect::<Vec<_>>(),
        );
        let end_byte_array = UInt64Array::from(
            chunks
                .iter()
                .map(|c| c.end_byte as u64)
                .collect::<Vec<_>>(),
        );
        let content_array =
            StringArray::from(chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>());
        let doc_array =
            StringArray::from(chunks.iter().map(|c| c.doc.as_deref()).collect::<Vec<_>>());
        let model_id_array =
            StringArray::from(chunks.iter().map(|_| model_id).collect::<Vec<_>>());
        let indexed_at_array = StringArray::from(
            chunks
                .iter()
                .map(|_| indexed_at.as_str())
                .collect::<Vec<_>>(),
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(vector_array),
                Arc::new(id_array),
                Arc::new(path_array),
                Arc::new(kind_array),
                Arc::new(name_array),
                Arc::new(language_array),
                Arc::new(start_line_array),
                Arc::new(end_line_array),
                Arc::new(start_byte_array),
                Arc::new(end_byte_array),
                Arc::new(content_array),
                Arc::new(doc_array),
                Arc::new(model_id_array),
                Arc::new(indexed_at_array),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// Add chunk rows with their vectors. Lengths must match.
    pub async fn add_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        model_id: &str,
    ) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        anyhow::ensure!(
            chunks.len() == embeddings.len(),
            "chunk/embedding count mismatch: {} vs {}",
            chunks.len(),
            embeddings.len()
        );

        let schema = self.schema();
        let batch = self.record_batch(chunks, embeddings, model_id)?;
        let count = batch.num_rows();
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        self.table()
            .await?
            .add(Box::new(batches))
            .execute()
            .await
            .context("Failed to add chunk rows")?;

        Ok(count)
    }

    /// Delete every row belonging to a file path
    pub async fn delete_by_path(&self, path: &str) -> Result<()> {
        let filter = format!("path = '{}'", escape_literal(path));
        self.table()
            .await?
            .delete(&filter)
            .await
            .with_context(|| format!("Failed to delete rows for '{}'", path))?;
        Ok(())
    }

    /// Nearest-neighbor search restricted to rows of the given model.
    ///
    /// Returns records with a similarity score derived from L2 distance.
    pub async fn vector_search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        model_id: &str,
    ) -> Result<Vec<(ChunkRecord, f32)>> {
        let table = self.table().await?;

        let stream = table
            .vector_search(query_vector)
            .context("Failed to create vector search")?
            .limit(limit)
            .only_if(format!("model_id = '{}'", escape_literal(model_id)))
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect vector search results")?;

        let mut results = Vec::new();
        for batch in &batches {
            let distance_array = batch
                .column_by_name("_distance")
                .context("Missing _distance column")?
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("Invalid _distance type")?;
            let records = records_from_batch(batch)?;
            for (i, record) in records.into_iter().enumerate() {
                let score = 1.0 / (1.0 + distance_array.value(i));
                results.push((record, score));
            }
        }
        Ok(results)
    }

    /// Fetch rows by chunk id
    pub async fn get_by_ids(&self, ids: &[u64]) -> Result<Vec<ChunkRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.scan_filtered(&format!("id IN ({})", id_list)).await
    }

    /// Fetch every row for a file path
    pub async fn chunks_for_path(&self, path: &str) -> Result<Vec<ChunkRecord>> {
        self.scan_filtered(&format!("path = '{}'", escape_literal(path)))
            .await
    }

    async fn scan_filtered(&self, filter: &str) -> Result<Vec<ChunkRecord>> {
        let table = self.table().await?;
        let stream = table
            .query()
            .only_if(filter.to_string())
            .execute()
            .await
            .context("Failed to query chunk rows")?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect chunk rows")?;

        let mut records = Vec::new();
        for batch in &batches {
            records.extend(records_from_batch(batch)?);
        }
        Ok(records)
    }

    /// Total row count
    pub async fn count(&self) -> Result<usize> {
        self.table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }

    /// Row counts grouped by language, descending
    pub async fn language_counts(&self) -> Result<Vec<(String, usize)>> {
        let table = self.table().await?;
        let stream = table
            .query()
            .select(Select::Columns(vec!["language".to_string()]))
            .execute()
            .await
            .context("Failed to query languages")?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect language data")?;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for batch in batches {
            let language_array = batch
                .column_by_name("language")
                .context("Missing language column")?
                .as_any()
                .downcast_ref::<StringArray>()
                .context("Invalid language type")?;
            for i in 0..batch.num_rows() {
                *counts.entry(language_array.value(i).to_string()).or_insert(0) += 1;
            }
        }

        let mut breakdown: Vec<(String, usize)> = counts.into_iter().collect();
        breakdown.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(breakdown)
    }

    /// Distinct file paths currently present in the table
    pub async fn indexed_paths(&self) -> Result<Vec<String>> {
        let table = self.table().await?;
        let stream = table
            .query()
            .select(Select::Columns(vec!["path".to_string()]))
            .execute()
            .await
            .context("Failed to query paths")?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect path data")?;

        let mut paths = std::collections::BTreeSet::new();
        for batch in batches {
            let path_array = batch
                .column_by_name("path")
                .context("Missing path column")?
                .as_any()
                .downcast_ref::<StringArray>()
                .context("Invalid path type")?;
            for i in 0..batch.num_rows() {
                paths.insert(path_array.value(i).to_string());
            }
        }
        Ok(paths.into_iter().collect())
    }

    /// Drop and recreate the table
    pub async fn clear(&self) -> Result<()> {
        self.connection
            .drop_table(&self.table_name)
            .await
            .with_context(|| format!("Failed to drop table '{}'", self.table_name))?;
        self.ensure_table().await
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn records_from_batch(batch: &RecordBatch) -> Result<Vec<ChunkRecord>> {
    let id_array = batch
        .column_by_name("id")
        .context("Missing id column")?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .context("Invalid id type")?;
    let path_array = string_column(batch, "path")?;
    let kind_array = string_column(batch, "kind")?;
    let name_array = string_column(batch, "name")?;
    let language_array = string_column(batch, "language")?;
    let start_line_array = u32_column(batch, "start_line")?;
    let end_line_array = u32_column(batch, "end_line")?;
    let content_array = string_column(batch, "content")?;
    let doc_array = string_column(batch, "doc")?;
    let model_id_array = string_column(batch, "model_id")?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        records.push(ChunkRecord {
            id: id_array.value(i),
            path: path_array.value(i).to_string(),
            kind: kind_array.value(i).to_string(),
            name: if name_array.is_null(i) {
                None
            } else {
                Some(name_array.value(i).to_string())
            },
            language: language_array.value(i).to_string(),
            start_line: start_line_array.value(i),
            end_line: end_line_array.value(i),
            content: content_array.value(i).to_string(),
            doc: if doc_array.is_null(i) {
                None
            } else {
                Some(doc_array.value(i).to_string())
            },
            model_id: model_id_array.value(i).to_string(),
        });
    }
    Ok(records)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("Invalid {} type", name))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .with_context(|| format!("Invalid {} type", name))
}
