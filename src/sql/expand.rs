//! Placeholder expansion and named parameter binding
//!
//! Search fragments reference document paths as `${path}` and values as
//! `:name`. Path placeholders are rewritten into column references or JSON
//! extraction expressions; named parameters are rewritten into the
//! backend's positional placeholders with their values collected in order.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::search::Params;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}\\]+)\}").expect("placeholder pattern"));

/// Replace every `${path}` in `fragment` with what `resolve` returns for it
///
/// A resolver returning `Ok(None)` leaves that placeholder untouched, so
/// expansion can run in stages (schema columns first, JSON extraction last).
pub fn expand_paths<F>(fragment: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&str) -> Result<Option<String>>,
{
    let mut out = String::with_capacity(fragment.len());
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(fragment) {
        let (Some(whole), Some(path)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&fragment[last..whole.start()]);
        match resolve(path.as_str())? {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&fragment[last..]);
    Ok(out)
}

/// A statement with positional placeholders and the values to bind, in order
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Rewrite `:name` parameters into positional placeholders
///
/// Text inside single quotes, double quotes and backticks is left alone, as
/// are `::` casts. Every occurrence of a name gets its own placeholder, so a
/// name used twice binds its value twice. Unknown names fail with
/// [`StoreError::MissingParameter`].
pub fn bind_named<P>(sql: &str, params: &Params, placeholder: P) -> Result<BoundStatement>
where
    P: Fn(usize) -> String,
{
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            ':' => match chars.peek().copied() {
                Some((_, ':')) => {
                    out.push_str("::");
                    chars.next();
                }
                Some((start, next)) if next.is_ascii_alphabetic() || next == '_' => {
                    let mut end = start;
                    while let Some(&(i, n)) = chars.peek() {
                        if n.is_ascii_alphanumeric() || n == '_' {
                            end = i + n.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &sql[start..end];
                    let value = params
                        .get(name)
                        .ok_or_else(|| StoreError::missing_parameter(name))?;
                    values.push(value.clone());
                    out.push_str(&placeholder(values.len()));
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }

    Ok(BoundStatement { sql: out, values })
}
