use anyhow::{anyhow, bail, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use localrag_core::traits::DenseIndex;
use localrag_core::types::{BlockKind, CandidateResult, Chunk};
use localrag_core::Error;

use crate::flat::l2_normalize;
use crate::schema::build_arrow_schema;
use crate::table::{ensure_table, open_db, table_exists};

pub const MANIFEST_FILE: &str = "lance_index.json";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Manifest {
	table: String,
	dim: usize,
}

/// Dense index stored in a LanceDB table (`heading`, `content`, `kind`, `vector`).
///
/// Rows are durable as soon as `add` returns; `save` only records which table
/// and width a directory refers to, and `load` checks that table is present.
pub struct LanceIndex {
	db: Connection,
	table_name: String,
	dim: usize,
}

impl LanceIndex {
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = open_db(uri).await?;
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	fn to_record_batch(&self, vectors: &[Vec<f32>], metadata: &[Chunk]) -> Result<RecordBatch> {
		let headings: Vec<&str> = metadata.iter().map(|c| c.heading.as_str()).collect();
		let contents: Vec<&str> = metadata.iter().map(|c| c.content.as_str()).collect();
		let kinds: Vec<&str> = metadata.iter().map(|c| c.kind.as_str()).collect();
		let rows = vectors.iter().map(|v| Some(l2_normalize(v).into_iter().map(Some).collect::<Vec<_>>()));
		let record_batch = RecordBatch::try_new(build_arrow_schema(self.dim as i32), vec![
			Arc::new(StringArray::from(headings)),
			Arc::new(StringArray::from(contents)),
			Arc::new(StringArray::from(kinds)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows, self.dim as i32)),
		])?;
		Ok(record_batch)
	}
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| anyhow!("lance column '{name}' missing"))
}

fn batch_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let (headings, contents, kinds) = (string_column(batch, "heading")?, string_column(batch, "content")?, string_column(batch, "kind")?);
	Ok((0..batch.num_rows())
		.map(|i| Chunk::new(headings.value(i), contents.value(i), BlockKind::parse(kinds.value(i))))
		.collect())
}

#[async_trait]
impl DenseIndex for LanceIndex {
	async fn add(&self, vectors: &[Vec<f32>], metadata: &[Chunk]) -> Result<()> {
		if vectors.len() != metadata.len() {
			bail!("{} vectors but {} metadata entries", vectors.len(), metadata.len());
		}
		if vectors.is_empty() { return Ok(()); }
		if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
			return Err(Error::Operation(format!("dimension mismatch: index has {}, got {}", self.dim, bad.len())).into());
		}
		let record_batch = self.to_record_batch(vectors, metadata)?;
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema.clone()));
		ensure_table(&self.db, &self.table_name, schema).await?;
		self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
		debug!(rows = vectors.len(), table = %self.table_name, "added rows to lance table");
		Ok(())
	}

	async fn search(&self, query: &[f32], k: usize) -> Result<Vec<CandidateResult>> {
		if k == 0 || !table_exists(&self.db, &self.table_name).await? { return Ok(Vec::new()); }
		let table = self.db.open_table(&self.table_name).execute().await?;
		let limit = k.min(table.count_rows(None).await?);
		if limit == 0 { return Ok(Vec::new()); }
		let mut stream = table
			.vector_search(l2_normalize(query))?
			.distance_type(DistanceType::Cosine)
			.limit(limit)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let distances = batch
				.column_by_name("_distance")
				.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
				.ok_or_else(|| anyhow!("lance result without _distance"))?;
			for (i, chunk) in batch_chunks(&batch)?.iter().enumerate() {
				hits.push(CandidateResult::from_chunk(chunk, 1.0 - distances.value(i)));
			}
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(k);
		Ok(hits)
	}

	async fn metadata(&self) -> Result<Vec<Chunk>> {
		if !table_exists(&self.db, &self.table_name).await? { return Ok(Vec::new()); }
		let table = self.db.open_table(&self.table_name).execute().await?;
		let mut stream = table.query().execute().await?;
		let mut out = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			out.extend(batch_chunks(&batch)?);
		}
		Ok(out)
	}

	async fn len(&self) -> Result<usize> {
		if !table_exists(&self.db, &self.table_name).await? { return Ok(0); }
		Ok(self.db.open_table(&self.table_name).execute().await?.count_rows(None).await?)
	}

	fn artifacts(&self, dir: &Path) -> Vec<PathBuf> { vec![dir.join(MANIFEST_FILE)] }

	async fn save(&self, dir: &Path) -> Result<()> {
		fs::create_dir_all(dir)?;
		let manifest = Manifest { table: self.table_name.clone(), dim: self.dim };
		fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest)?)?;
		info!(dir = %dir.display(), table = %self.table_name, "lance index manifest saved");
		Ok(())
	}

	async fn load(&self, dir: &Path) -> Result<()> {
		let path = dir.join(MANIFEST_FILE);
		if !path.exists() { return Err(Error::PersistenceMissing(path).into()); }
		let manifest: Manifest = serde_json::from_slice(&fs::read(&path)?)?;
		let expected = Manifest { table: self.table_name.clone(), dim: self.dim };
		if manifest != expected {
			bail!("{} describes table '{}' ({}-d), this index is '{}' ({}-d)", path.display(), manifest.table, manifest.dim, expected.table, expected.dim);
		}
		if !table_exists(&self.db, &self.table_name).await? {
			return Err(Error::PersistenceMissing(path).into());
		}
		info!(dir = %dir.display(), table = %self.table_name, "lance index attached");
		Ok(())
	}
}
