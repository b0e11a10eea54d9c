//! Named parameter bookkeeping.
//!
//! Every builder owns one [`ParamMap`]. Names are generated from a strictly
//! increasing counter, so they are unique within the map. When another
//! builder's parameters are folded in (groups, sub-queries, unions) any
//! colliding name is renamed in both the incoming map and the expression text
//! that references it before the merge.

use std::collections::{BTreeSet, HashMap};

use crate::{MapperError, Params, Value};

/// A `:name` placeholder located in statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte offset of the leading colon.
    pub start: usize,
    /// Byte offset one past the last name character.
    pub end: usize,
    pub name: String,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Locate every `:name` placeholder outside quoted literals and identifiers.
///
/// `::` casts and `:=` assignments are not placeholders.
pub fn placeholders(sql: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' && q != '`' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            ':' => match chars.peek() {
                Some(&(_, ':')) => {
                    chars.next();
                }
                Some(&(_, next)) if is_name_start(next) => {
                    let mut end = idx + 1;
                    while let Some(&(i, ch)) = chars.peek() {
                        if !is_name_char(ch) {
                            break;
                        }
                        end = i + ch.len_utf8();
                        chars.next();
                    }
                    found.push(Placeholder {
                        start: idx,
                        end,
                        name: sql[idx + 1..end].to_string(),
                    });
                }
                _ => {}
            },
            _ => {}
        }
    }

    found
}

/// Rewrite placeholders according to `renames` in a single pass, so chained
/// renames (`a → b`, `b → c`) never compound.
pub fn rename_placeholders(sql: &str, renames: &HashMap<String, String>) -> String {
    if renames.is_empty() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0;
    for placeholder in placeholders(sql) {
        if let Some(new_name) = renames.get(&placeholder.name) {
            out.push_str(&sql[cursor..placeholder.start]);
            out.push(':');
            out.push_str(new_name);
            cursor = placeholder.end;
        }
    }
    out.push_str(&sql[cursor..]);
    out
}

/// Strip an optional leading colon from a caller-supplied parameter name.
pub fn normalize_name(name: &str) -> &str {
    name.strip_prefix(':').unwrap_or(name)
}

/// Parameter map scoped to one builder instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    values: Params,
    counter: usize,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &Params {
        &self.values
    }

    pub fn into_values(self) -> Params {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn next_name(&mut self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let candidate = format!("p{}", self.counter);
            self.counter += 1;
            if !self.values.contains_key(&candidate) && !taken(&candidate) {
                return candidate;
            }
        }
    }

    /// Bind a value under a fresh name and return its placeholder (`:pN`).
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        let name = self.next_name(|_| false);
        self.values.insert(name.clone(), value.into());
        format!(":{name}")
    }

    /// Merge `incoming` into this map and return `expr` with any colliding
    /// placeholder renamed.
    ///
    /// Fails if a binding would be dropped or if the rewritten expression
    /// references a placeholder that has no value after the merge.
    pub fn merge(&mut self, expr: &str, incoming: Params) -> Result<String, MapperError> {
        let incoming: Params = incoming
            .into_iter()
            .map(|(name, value)| (normalize_name(&name).to_string(), value))
            .collect();

        let mut renames: HashMap<String, String> = HashMap::new();
        let mut assigned: BTreeSet<String> = BTreeSet::new();
        for name in incoming.keys() {
            if self.values.contains_key(name) {
                let fresh = self.next_name(|c| incoming.contains_key(c) || assigned.contains(c));
                assigned.insert(fresh.clone());
                renames.insert(name.clone(), fresh);
            }
        }

        let rewritten = rename_placeholders(expr, &renames);

        let mut staged = Vec::with_capacity(incoming.len());
        for (name, value) in incoming {
            let target = renames.get(&name).cloned().unwrap_or(name);
            if self.values.contains_key(&target) {
                return Err(MapperError::invalid(format!(
                    "parameter :{target} collides after renaming"
                )));
            }
            staged.push((target, value));
        }
        self.values.extend(staged);

        for placeholder in placeholders(&rewritten) {
            if !self.values.contains_key(&placeholder.name) {
                return Err(MapperError::invalid(format!(
                    "placeholder :{} has no bound value",
                    placeholder.name
                )));
            }
        }

        Ok(rewritten)
    }
}
