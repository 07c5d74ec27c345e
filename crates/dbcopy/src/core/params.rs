//! Statement arguments and named-marker rewriting.

use crate::error::{CopyError, Result};

use super::value::Value;

/// Arguments for a statement.
///
/// Positional arguments are passed through untouched, so the SQL must
/// already use the dialect's own placeholders. Named arguments are written
/// as `:name` markers and rewritten by [`Params::bind`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Produce the final SQL and positional values.
    ///
    /// `placeholder` receives the 1-based position of each marker.
    pub fn bind(&self, sql: &str, placeholder: impl Fn(usize) -> String) -> Result<(String, Vec<Value>)> {
        match self {
            Params::None => Ok((sql.to_string(), Vec::new())),
            Params::Positional(values) => Ok((sql.to_string(), values.clone())),
            Params::Named(pairs) => rewrite_named(sql, pairs, placeholder),
        }
    }
}

/// Replace `:name` markers outside quoted text.
///
/// `::` casts and markers inside `'...'` or `"..."` are left alone.
fn rewrite_named(
    sql: &str,
    pairs: &[(String, Value)],
    placeholder: impl Fn(usize) -> String,
) -> Result<(String, Vec<Value>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_alphabetic() || *n == '_') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let value = pairs
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        CopyError::query(format!("no value bound for parameter :{}", name))
                    })?;
                values.push(value);
                out.push_str(&placeholder(values.len()));
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok((out, values))
}
