//! Cross-database table replication.
//!
//! A [`TableReplicator`] copies one table between two [`Database`]s:
//!
//! 1. introspect the source and translate its column types
//! 2. create the destination table if it is absent
//! 3. clear destination rows (filtered delete or truncate)
//! 4. stream the source in chunks, normalize each chunk, and load it
//!
//! Chunk loads go through the [`ResilientBulkLoader`] when the job asks
//! for it.

mod loader;
mod transform;

pub use loader::{widened_width, LoadReport, Repair, ResilientBulkLoader};
pub use transform::ChunkPlan;

use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, info};

use crate::core::{ColumnDescriptor, Dialect, Params, Value};
use crate::database::Database;
use crate::dialect::TypeTranslator;
use crate::error::{CopyError, Result};

/// Synthetic run-timestamp column appended on request.
pub const AUX_UPDATED_DATA: &str = "AUX_UPDATED_DATA";

/// One table copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationJob {
    pub source_table: String,
    pub destination_table: String,
    /// `WHERE` clause applied to the source query.
    pub source_filter: Option<String>,
    /// `WHERE` clause for the destination delete. Wins over `truncate`.
    pub destination_filter: Option<String>,
    pub truncate: bool,
    pub append_timestamp: bool,
    /// Explicit column list; defaults to the destination's columns.
    pub select_columns: Option<Vec<String>>,
    /// Rows per chunk; defaults to the source's configured chunk size.
    pub chunk_size: Option<usize>,
    /// Route chunk loads through the self-healing loader with this many
    /// attempts.
    pub resilient_attempts: Option<usize>,
}

impl ReplicationJob {
    /// Copy `source_table` into `destination_table`, truncating first.
    pub fn new(source_table: impl Into<String>, destination_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            destination_table: destination_table.into(),
            source_filter: None,
            destination_filter: None,
            truncate: true,
            append_timestamp: false,
            select_columns: None,
            chunk_size: None,
            resilient_attempts: None,
        }
    }

    pub fn source_filter(mut self, filter: impl Into<String>) -> Self {
        self.source_filter = Some(filter.into());
        self
    }

    pub fn destination_filter(mut self, filter: impl Into<String>) -> Self {
        self.destination_filter = Some(filter.into());
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn append_timestamp(mut self, append: bool) -> Self {
        self.append_timestamp = append;
        self
    }

    pub fn select_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    pub fn resilient(mut self, max_attempts: usize) -> Self {
        self.resilient_attempts = Some(max_attempts.max(1));
        self
    }
}

/// Summary of a finished copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationReport {
    pub chunks: usize,
    pub rows: u64,
    pub created_table: bool,
    pub elapsed: Duration,
}

/// Copies tables from one database into another.
#[derive(Debug, Clone, Copy)]
pub struct TableReplicator<'a> {
    source: &'a Database,
    destination: &'a Database,
}

impl<'a> TableReplicator<'a> {
    pub fn new(source: &'a Database, destination: &'a Database) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Destination DDL types for the source columns, in order.
    pub fn type_map(&self, columns: &[ColumnDescriptor], append_timestamp: bool) -> Vec<(String, String)> {
        let translator = TypeTranslator::new(self.source.kind(), self.destination.kind());
        let mut map = translator.type_map(columns);
        if append_timestamp {
            map.push((
                AUX_UPDATED_DATA.to_string(),
                self.destination.dialect().run_timestamp_type().to_string(),
            ));
        }
        map
    }

    /// Run one copy.
    ///
    /// # Errors
    ///
    /// Table creation failures return [`CopyError::TableCreation`] before
    /// any row is read. Chunk load failures propagate as they occur;
    /// chunks already loaded stay committed.
    pub async fn run(&self, job: &ReplicationJob) -> Result<ReplicationReport> {
        let started = Instant::now();
        let target = job.destination_table.as_str();
        info!(
            "Replicating {} ({}) -> {} ({})",
            job.source_table,
            self.source.kind(),
            target,
            self.destination.kind()
        );

        let source_columns = self.source.describe_table(&job.source_table).await?;
        if source_columns.is_empty() {
            return Err(CopyError::SchemaMismatch {
                table: job.source_table.clone(),
                message: "source table not found or has no columns".into(),
            });
        }
        let type_map = self.type_map(&source_columns, job.append_timestamp);

        let created_table = if self.destination.exist_table(target).await? {
            info!("Table {} already exists", target);
            false
        } else {
            let subset = job.select_columns.as_ref().map(|cols| {
                let mut subset = cols.clone();
                if job.append_timestamp {
                    subset.push(AUX_UPDATED_DATA.to_string());
                }
                subset
            });
            self.destination
                .create_table(target, &type_map, subset.as_deref())
                .await?;
            true
        };

        if job.destination_filter.is_some() || job.truncate {
            self.destination
                .delete_rows(target, job.destination_filter.as_deref())
                .await?;
        } else {
            info!("Keeping existing rows in {}", target);
        }

        let destination_columns = self.destination.describe_table(target).await?;
        let load_types: Vec<(String, String)> = if destination_columns.is_empty() {
            type_map
        } else {
            destination_columns
                .iter()
                .map(|c| (c.column.clone(), c.native_type.clone()))
                .collect()
        };

        let sql = self.select_sql(job, &destination_columns)?;
        debug!("Source query: {}", sql);

        let chunk_size = job
            .chunk_size
            .unwrap_or(self.source.settings().chunk_size);
        let run_timestamp = Value::DateTime(Local::now().naive_local());
        let loader = job.resilient_attempts.map(|attempts| {
            ResilientBulkLoader::new(self.destination).with_max_attempts(attempts)
        });

        let mut stream = self.source.stream(&sql, Params::None, chunk_size).await?;
        let mut plan: Option<ChunkPlan> = None;
        let mut rows = 0u64;
        let mut chunks = 0usize;

        while let Some(mut chunk) = stream.next_chunk().await? {
            let chunk_started = Instant::now();
            if job.append_timestamp {
                chunk.push_constant_column(AUX_UPDATED_DATA, run_timestamp.clone());
            }
            let chunk_plan = plan.get_or_insert_with(|| {
                ChunkPlan::new(chunk.columns(), &load_types, self.destination.dialect())
            });
            chunk_plan.apply(&mut chunk)?;

            match &loader {
                Some(loader) => {
                    loader.load(target, &chunk).await?;
                }
                None => {
                    self.destination.upload_batch(target, &chunk).await?;
                }
            }

            chunks += 1;
            rows += chunk.len() as u64;
            info!(
                "Chunk {} loaded into {} in {:.2}s; {} rows copied so far",
                chunks,
                target,
                chunk_started.elapsed().as_secs_f64(),
                rows
            );
        }

        let report = ReplicationReport {
            chunks,
            rows,
            created_table,
            elapsed: started.elapsed(),
        };
        info!(
            "Replicated {} rows into {} in {} chunks ({:.1}s)",
            report.rows,
            target,
            report.chunks,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Source `SELECT` over the projected columns.
    fn select_sql(&self, job: &ReplicationJob, destination: &[ColumnDescriptor]) -> Result<String> {
        let dialect = self.source.dialect();
        let names: Vec<String> = match &job.select_columns {
            Some(columns) => columns.iter().map(|c| dialect.quote_ident(c)).collect(),
            None => destination
                .iter()
                .filter(|c| !c.column.eq_ignore_ascii_case(AUX_UPDATED_DATA))
                .map(|c| dialect.quote_ident(&c.column))
                .collect(),
        };
        if names.is_empty() {
            return Err(CopyError::SchemaMismatch {
                table: job.destination_table.clone(),
                message: "no columns to copy".into(),
            });
        }
        let mut sql = format!("SELECT {} FROM {}", names.join(", "), job.source_table);
        if let Some(filter) = &job.source_filter {
            sql.push_str(&format!(" WHERE {}", filter));
        }
        Ok(sql)
    }
}
