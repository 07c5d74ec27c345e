//! Scripted in-memory connector for unit tests.
//!
//! SQL is answered by case-insensitive substring rules, first match wins.
//! A rule holds a queue of responses; the last one repeats once the rest
//! are used up. Everything a session or cursor does is recorded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{ConnectionProfile, DbKind};
use crate::core::{Connector, RecordBatch, RowCursor, Session, Value};
use crate::database::Database;
use crate::error::{CopyError, Result};

#[derive(Debug, Clone)]
pub(crate) enum Response {
    Rows(RecordBatch),
    Affected(u64),
    Fail(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Connect,
    Execute(String),
    Query(String),
    ExecuteMany(String, usize),
    Cursor(String),
    Fetch(usize),
    Commit,
    Rollback,
    Close,
    CursorClose,
    CursorDrop,
}

struct Rule {
    pattern: String,
    responses: VecDeque<Response>,
}

#[derive(Default)]
struct Script {
    rules: Vec<Rule>,
    events: Vec<Event>,
}

impl Script {
    fn respond(&mut self, sql: &str) -> Option<Response> {
        let sql = sql.to_lowercase();
        let rule = self
            .rules
            .iter_mut()
            .find(|r| sql.contains(&r.pattern))?;
        if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer SQL containing `pattern` with `response`.
    pub fn on(&self, pattern: &str, response: Response) -> &Self {
        self.on_seq(pattern, vec![response])
    }

    /// Answer SQL containing `pattern` with each response in turn.
    pub fn on_seq(&self, pattern: &str, responses: Vec<Response>) -> &Self {
        self.lock().rules.push(Rule {
            pattern: pattern.to_lowercase(),
            responses: responses.into(),
        });
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// SQL text of every statement and query, in order.
    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(sql)
                | Event::Query(sql)
                | Event::ExecuteMany(sql, _)
                | Event::Cursor(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.lock().events.iter().filter(|e| *e == event).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: Event) {
        self.lock().events.push(event);
    }

    fn respond(&self, sql: &str) -> Option<Response> {
        self.lock().respond(sql)
    }
}

/// A database of `kind` answered by a fresh script.
pub(crate) fn scripted(kind: DbKind) -> (Database, ScriptedConnector) {
    let script = ScriptedConnector::new();
    let db = Database::with_connector(ConnectionProfile::new(kind), Arc::new(script.clone()));
    (db, script)
}

/// Batch with string column names, for scripting.
pub(crate) fn batch(columns: &[&str], rows: Vec<Vec<Value>>) -> RecordBatch {
    RecordBatch::new(
        columns.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        rows,
    )
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _profile: &ConnectionProfile) -> Result<Box<dyn Session>> {
        self.record(Event::Connect);
        Ok(Box::new(ScriptedSession {
            script: self.clone(),
        }))
    }
}

struct ScriptedSession {
    script: ScriptedConnector,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.script.record(Event::Execute(sql.to_string()));
        match self.script.respond(sql) {
            Some(Response::Fail(msg)) => Err(CopyError::query(msg)),
            Some(Response::Affected(n)) => Ok(n),
            Some(Response::Rows(b)) => Ok(b.len() as u64),
            None => Ok(0),
        }
    }

    async fn query(&mut self, sql: &str, _params: &[Value], _fetch_hint: usize) -> Result<RecordBatch> {
        self.script.record(Event::Query(sql.to_string()));
        match self.script.respond(sql) {
            Some(Response::Fail(msg)) => Err(CopyError::query(msg)),
            Some(Response::Rows(b)) => Ok(b),
            _ => Ok(RecordBatch::default()),
        }
    }

    async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        self.script
            .record(Event::ExecuteMany(sql.to_string(), rows.len()));
        match self.script.respond(sql) {
            Some(Response::Fail(msg)) => Err(CopyError::query(msg)),
            _ => Ok(rows.len() as u64),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.script.record(Event::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.script.record(Event::Rollback);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.script.record(Event::Close);
        Ok(())
    }

    async fn into_cursor(
        self: Box<Self>,
        sql: &str,
        _params: &[Value],
        _fetch_hint: usize,
    ) -> Result<Box<dyn RowCursor>> {
        self.script.record(Event::Cursor(sql.to_string()));
        let batch = match self.script.respond(sql) {
            Some(Response::Fail(msg)) => return Err(CopyError::query(msg)),
            Some(Response::Rows(b)) => b,
            _ => RecordBatch::default(),
        };
        let columns = batch.columns().to_vec();
        Ok(Box::new(ScriptedCursor {
            script: self.script.clone(),
            columns,
            rows: batch.into_rows().into(),
            closed: false,
        }))
    }
}

struct ScriptedCursor {
    script: ScriptedConnector,
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    closed: bool,
}

#[async_trait]
impl RowCursor for ScriptedCursor {
    async fn fetch(&mut self, max_rows: usize) -> Result<RecordBatch> {
        let n = max_rows.min(self.rows.len());
        let rows: Vec<_> = self.rows.drain(..n).collect();
        self.script.record(Event::Fetch(rows.len()));
        Ok(RecordBatch::new(self.columns.clone(), rows))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.closed = true;
        self.script.record(Event::CursorClose);
        Ok(())
    }
}

impl Drop for ScriptedCursor {
    fn drop(&mut self) {
        if !self.closed {
            self.script.record(Event::CursorDrop);
        }
    }
}
