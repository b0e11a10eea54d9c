//! Table and column identifiers: parsing, quoting, validation, and resolution of
//! table references against the live schema.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::{Connection, MapperError, SchemaCache};

/// Split `schema.name` into its parts, stripping backticks.
pub fn parse_qualified(reference: &str) -> (Option<&str>, &str) {
    let reference = reference.trim();
    match reference.split_once('.') {
        Some((schema, name)) => (
            Some(schema.trim_matches('`')),
            name.trim_matches('`'),
        ),
        None => (None, reference.trim_matches('`')),
    }
}

/// Reject identifiers that could terminate or escape a statement.
pub fn validate_identifier(name: &str) -> Result<(), MapperError> {
    if name.is_empty() {
        return Err(MapperError::invalid("empty identifier"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, ';' | '`' | '\'' | '"' | '\\' | '\0'))
    {
        return Err(MapperError::invalid(format!(
            "identifier {name:?} contains forbidden character {bad:?}"
        )));
    }
    if name.contains("--") || name.contains("/*") {
        return Err(MapperError::invalid(format!(
            "identifier {name:?} contains a comment opener"
        )));
    }
    Ok(())
}

/// Check a free-form column or table reference passed to the fluent API.
///
/// Expressions such as `COUNT(*) AS total` or `` `users`.`id` `` are allowed;
/// terminators, comment openers and string quotes are not.
pub fn check_reference(reference: &str) -> Result<(), MapperError> {
    if reference.trim().is_empty() {
        return Err(MapperError::invalid("empty column or table reference"));
    }
    if reference.contains(';')
        || reference.contains("--")
        || reference.contains("/*")
        || reference.contains('\'')
        || reference.contains('"')
        || reference.contains('\0')
    {
        return Err(MapperError::invalid(format!(
            "unsafe column or table reference {reference:?}"
        )));
    }
    Ok(())
}

/// Backtick-quote an identifier, quoting each part of a dotted reference.
/// `*` parts are left bare.
pub fn quote(name: &str) -> Result<String, MapperError> {
    let parts = name
        .split('.')
        .map(|part| {
            let part = part.trim().trim_matches('`');
            if part == "*" {
                return Ok(part.to_string());
            }
            validate_identifier(part)?;
            Ok(format!("`{part}`"))
        })
        .collect::<Result<Vec<_>, MapperError>>()?;
    Ok(parts.join("."))
}

fn ends_with_consonant_y(name: &str) -> bool {
    let mut chars = name.chars().rev();
    matches!(chars.next(), Some('y'))
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() && !"aeiou".contains(c))
}

/// Toggle a table name between its singular and plural English form.
pub fn toggle_plural(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if name.ends_with(suffix) {
            return name[..name.len() - 2].to_string();
        }
    }
    if name.ends_with("ss") {
        return format!("{name}es");
    }
    if let Some(stem) = name.strip_suffix('s') {
        return stem.to_string();
    }
    if ends_with_consonant_y(name) {
        return format!("{}ies", &name[..name.len() - 1]);
    }
    if name.ends_with('x') || name.ends_with("sh") || name.ends_with("ch") || name.ends_with('z')
    {
        return format!("{name}es");
    }
    format!("{name}s")
}

/// Resolves table references to canonical table names.
///
/// Order: explicit static map, exact existence, plural/singular toggle,
/// then the original text unchanged. Results are memoized per resolver.
#[derive(Debug, Default)]
pub struct IdentifierResolver {
    table_map: HashMap<String, String>,
    resolved: Mutex<HashMap<String, String>>,
}

impl IdentifierResolver {
    pub fn new(table_map: HashMap<String, String>) -> Self {
        Self {
            table_map,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a (possibly schema-qualified) table reference.
    pub async fn resolve(
        &self,
        conn: &dyn Connection,
        schema_cache: &SchemaCache,
        reference: &str,
    ) -> Result<String, MapperError> {
        if let Some(hit) = self.resolved.lock().get(reference) {
            return Ok(hit.clone());
        }

        let (schema, name) = parse_qualified(reference);
        let qualify = |table: &str| match schema {
            Some(schema) => format!("{schema}.{table}"),
            None => table.to_string(),
        };

        let resolved = if let Some(mapped) = self
            .table_map
            .get(reference)
            .or_else(|| self.table_map.get(name))
        {
            mapped.clone()
        } else if schema_cache.table_exists(conn, schema, name).await? {
            qualify(name)
        } else {
            let toggled = toggle_plural(name);
            if schema_cache.table_exists(conn, schema, &toggled).await? {
                debug!(from = %reference, to = %toggled, "table reference resolved by plural toggle");
                qualify(&toggled)
            } else {
                reference.to_string()
            }
        };

        self.resolved
            .lock()
            .insert(reference.to_string(), resolved.clone());
        Ok(resolved)
    }

    pub fn clear(&self) {
        self.resolved.lock().clear();
    }
}
