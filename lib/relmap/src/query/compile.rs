//! Rendering a [`QueryBuilder`] into SQL text.
//!
//! SELECT clause order: columns, FROM, joins, WHERE, GROUP BY, HAVING,
//! ORDER BY, LIMIT, OFFSET, lock, unions. Write statements (INSERT, UPDATE,
//! DELETE) quote every identifier they emit.

use super::statement::render_conditions;
use super::{CompiledQuery, ParamMap, QueryBuilder, Statement};
use crate::identifier::quote;
use crate::{MapperError, Payload};

fn render_select(statement: &Statement) -> String {
    let mut sql = String::from("SELECT ");
    if statement.distinct {
        sql.push_str("DISTINCT ");
    }
    if statement.calc_found_rows {
        sql.push_str("SQL_CALC_FOUND_ROWS ");
    }
    if statement.columns.is_empty() {
        sql.push('*');
    } else {
        sql.push_str(&statement.columns.join(", "));
    }

    if let Some(from) = &statement.from {
        sql.push_str(" FROM ");
        sql.push_str(&from.to_sql());
    }

    for join in &statement.joins {
        sql.push(' ');
        sql.push_str(join.kind.as_sql());
        sql.push(' ');
        sql.push_str(&join.source.to_sql());
        if !join.on.is_empty() {
            sql.push_str(" ON ");
            sql.push_str(&join.on);
        }
    }

    if !statement.conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&render_conditions(&statement.conditions));
    }
    if !statement.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&statement.group_by.join(", "));
    }
    if !statement.having.is_empty() {
        sql.push_str(" HAVING ");
        sql.push_str(&render_conditions(&statement.having));
    }
    if !statement.order_by.is_empty() {
        let order: Vec<String> = statement
            .order_by
            .iter()
            .map(|(column, order)| format!("{column} {}", order.as_sql()))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    if let Some(limit) = statement.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = statement.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
    if let Some(lock) = statement.lock {
        sql.push(' ');
        sql.push_str(lock.as_sql());
    }
    for union in &statement.unions {
        sql.push_str(if union.all { " UNION ALL (" } else { " UNION (" });
        sql.push_str(&union.sql);
        sql.push(')');
    }
    sql
}

/// A keyword of a raw statement with its byte span.
struct Word<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

impl Word<'_> {
    fn is(&self, keyword: &str) -> bool {
        self.text.eq_ignore_ascii_case(keyword)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Bare words at parenthesis depth zero, outside quoted literals and
/// identifiers. Placeholders, variables, numbers and qualified parts are
/// skipped.
fn top_level_words(sql: &str) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
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
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = idx + c.len_utf8();
                while let Some(&(i, ch)) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    end = i + ch.len_utf8();
                    chars.next();
                }
                if depth == 0 {
                    words.push(Word {
                        start: idx,
                        end,
                        text: &sql[idx..end],
                    });
                }
            }
            c if c.is_ascii_digit() || matches!(c, ':' | '@' | '.') => {
                while chars.peek().is_some_and(|&(_, ch)| is_word_char(ch)) {
                    chars.next();
                }
            }
            _ => {}
        }
    }

    words
}

/// A raw override; UPDATE and DELETE overrides still get the fluent WHERE.
///
/// The override's own top-level WHERE is parenthesized and ANDed with the
/// fluent conditions. A trailing ORDER BY or LIMIT stays after the WHERE.
fn render_custom(custom: &str, statement: &Statement) -> String {
    let custom = custom.trim();
    let words = top_level_words(custom);
    let is_write = words
        .first()
        .is_some_and(|w| w.is("UPDATE") || w.is("DELETE"));
    if !is_write || statement.conditions.is_empty() {
        return custom.to_string();
    }
    let conditions = render_conditions(&statement.conditions);

    let existing = words.iter().find(|w| w.is("WHERE"));
    let after = existing.map_or(0, |w| w.end);
    let tail_at = words
        .iter()
        .enumerate()
        .filter(|(_, w)| w.start >= after)
        .find(|(i, w)| {
            w.is("LIMIT") || (w.is("ORDER") && words.get(i + 1).is_some_and(|n| n.is("BY")))
        })
        .map_or(custom.len(), |(_, w)| w.start);
    let tail = &custom[tail_at..];
    let tail = if tail.is_empty() {
        String::new()
    } else {
        format!(" {tail}")
    };

    match existing {
        Some(word) => format!(
            "{} WHERE ({}) AND ({conditions}){tail}",
            custom[..word.start].trim_end(),
            custom[word.end..tail_at].trim(),
        ),
        None => format!("{} WHERE {conditions}{tail}", custom[..tail_at].trim_end()),
    }
}

impl QueryBuilder {
    /// Render the statement and its bindings. Pure given the builder state.
    pub fn compile(&self) -> Result<CompiledQuery, MapperError> {
        self.validated()?;
        let sql = match &self.statement.custom {
            Some(custom) => render_custom(custom, &self.statement),
            None => render_select(&self.statement),
        };
        Ok(CompiledQuery {
            sql,
            params: self.params.values().clone(),
        })
    }

    pub fn to_sql(&self) -> Result<String, MapperError> {
        self.compile().map(|compiled| compiled.sql)
    }

    /// Quoted name of the FROM table, required by write statements.
    fn write_target(&self) -> Result<String, MapperError> {
        self.validated()?;
        let table = self.statement.from_table().ok_or_else(|| {
            MapperError::invalid("write statements need a plain FROM table")
        })?;
        quote(&table.qualified())
    }

    fn where_suffix(&self) -> String {
        if self.statement.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", render_conditions(&self.statement.conditions))
        }
    }

    pub fn compile_insert(&self, payload: &Payload) -> Result<CompiledQuery, MapperError> {
        if payload.is_empty() {
            return Err(MapperError::invalid("insert payload is empty"));
        }
        let table = self.write_target()?;
        let mut params = ParamMap::new();
        let mut columns = Vec::with_capacity(payload.len());
        let mut values = Vec::with_capacity(payload.len());
        for (column, value) in payload {
            columns.push(quote(column)?);
            values.push(params.bind(value));
        }
        Ok(CompiledQuery {
            sql: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                values.join(", ")
            ),
            params: params.into_values(),
        })
    }

    /// `INSERT ... ON DUPLICATE KEY UPDATE`. An empty `update_columns` updates
    /// every payload column.
    pub fn compile_upsert(
        &self,
        payload: &Payload,
        update_columns: &[&str],
    ) -> Result<CompiledQuery, MapperError> {
        let insert = self.compile_insert(payload)?;
        let targets: Vec<&str> = if update_columns.is_empty() {
            payload.keys().map(String::as_str).collect()
        } else {
            update_columns.to_vec()
        };
        let assignments = targets
            .into_iter()
            .map(|column| {
                let quoted = quote(column)?;
                Ok(format!("{quoted} = VALUES({quoted})"))
            })
            .collect::<Result<Vec<_>, MapperError>>()?;
        Ok(CompiledQuery {
            sql: format!(
                "{} ON DUPLICATE KEY UPDATE {}",
                insert.sql,
                assignments.join(", ")
            ),
            params: insert.params,
        })
    }

    pub fn compile_update(&self, payload: &Payload) -> Result<CompiledQuery, MapperError> {
        if payload.is_empty() {
            return Err(MapperError::invalid("update payload is empty"));
        }
        let table = self.write_target()?;
        let mut params = self.params.clone();
        let assignments = payload
            .iter()
            .map(|(column, value)| Ok(format!("{} = {}", quote(column)?, params.bind(value))))
            .collect::<Result<Vec<_>, MapperError>>()?;
        Ok(CompiledQuery {
            sql: format!(
                "UPDATE {table} SET {}{}",
                assignments.join(", "),
                self.where_suffix()
            ),
            params: params.into_values(),
        })
    }

    pub fn compile_delete(&self) -> Result<CompiledQuery, MapperError> {
        let table = self.write_target()?;
        Ok(CompiledQuery {
            sql: format!("DELETE FROM {table}{}", self.where_suffix()),
            params: self.params.values().clone(),
        })
    }
}
