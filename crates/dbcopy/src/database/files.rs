//! SQL kept in files: parameterized stored queries and query folders.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::core::{Params, RecordBatch};
use crate::error::{CopyError, Result};

use super::{ChunkStream, Database};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex")
});

/// Substitute `{name}` placeholders. `{{` and `}}` are literal braces.
///
/// An empty parameter map leaves the text untouched.
pub(crate) fn render_query(template: &str, params: &HashMap<String, String>) -> Result<String> {
    if params.is_empty() {
        return Ok(template.to_string());
    }
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        rendered.push_str(&template[last..whole.start()]);
        match caps.get(1) {
            Some(name) => {
                let value = params.get(name.as_str()).ok_or_else(|| {
                    CopyError::Config(format!("No value for query parameter '{}'", name.as_str()))
                })?;
                rendered.push_str(value);
            }
            None => rendered.push_str(&whole.as_str()[..1]),
        }
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

fn split_statements(content: &str) -> Vec<String> {
    content
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Every `.sql` file under `dir`, in a stable order.
fn sql_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = std::fs::read_dir(&current)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        for path in entries {
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("sql") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

impl Database {
    /// Read a stored query and fill in its `{name}` parameters.
    pub fn read_stored_query(
        path: impl AsRef<Path>,
        params: &HashMap<String, String>,
    ) -> Result<String> {
        let path = path.as_ref();
        let template = std::fs::read_to_string(path)?;
        debug!("Loaded stored query {}", path.display());
        render_query(&template, params)
    }

    /// Run a stored query and return every row.
    pub async fn get_from_file(
        &self,
        path: impl AsRef<Path>,
        params: &HashMap<String, String>,
    ) -> Result<RecordBatch> {
        let sql = Self::read_stored_query(path, params)?;
        self.get(&sql, Params::None).await
    }

    /// Stream a stored query in chunks of at most `chunk_size` rows.
    pub async fn stream_from_file(
        &self,
        path: impl AsRef<Path>,
        params: &HashMap<String, String>,
        chunk_size: usize,
    ) -> Result<ChunkStream> {
        let sql = Self::read_stored_query(path, params)?;
        self.stream(&sql, Params::None, chunk_size).await
    }

    /// Load every `.sql` file under `dir`, recursively, split on `;` and
    /// keyed by file name.
    ///
    /// Files with the same name in different folders collide; the last in
    /// path order wins.
    pub fn query_folder(dir: impl AsRef<Path>) -> Result<BTreeMap<String, Vec<String>>> {
        let mut queries = BTreeMap::new();
        for path in sql_files(dir.as_ref())? {
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let statements = split_statements(&std::fs::read_to_string(&path)?);
            if queries.insert(name.to_string(), statements).is_some() {
                warn!("Query file {} shadows an earlier file of the same name", path.display());
            }
        }
        Ok(queries)
    }
}
