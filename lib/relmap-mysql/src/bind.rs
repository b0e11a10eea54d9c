//! Named placeholder rewriting and argument binding.

use sqlx::Arguments;
use sqlx::mysql::MySqlArguments;

use relmap::query::placeholders;
use relmap::{MapperError, Params, Value};

/// Rewrite `:name` placeholders to `?` and list the values in occurrence
/// order. A name used twice is bound twice. Placeholders inside quoted
/// literals and identifiers are left alone.
pub fn to_positional<'p>(
    sql: &str,
    params: &'p Params,
) -> Result<(String, Vec<&'p Value>), MapperError> {
    let found = placeholders(sql);
    if found.is_empty() {
        return Ok((sql.to_string(), Vec::new()));
    }

    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::with_capacity(found.len());
    let mut cursor = 0;
    for placeholder in found {
        let value = params.get(&placeholder.name).ok_or_else(|| {
            MapperError::invalid(format!("no value bound for :{}", placeholder.name))
        })?;
        out.push_str(&sql[cursor..placeholder.start]);
        out.push('?');
        cursor = placeholder.end;
        values.push(value);
    }
    out.push_str(&sql[cursor..]);
    Ok((out, values))
}

fn bind_error(err: impl std::fmt::Display) -> MapperError {
    MapperError::invalid(format!("cannot bind parameter: {err}"))
}

/// Bind a Value to MySqlArguments.
fn bind_value(args: &mut MySqlArguments, value: &Value) -> Result<(), MapperError> {
    match value {
        Value::Null => args.add(None::<String>),
        Value::Bool(b) => args.add(*b),
        Value::Int(n) => args.add(*n),
        Value::UInt(n) => args.add(*n),
        Value::Float(n) => args.add(*n),
        Value::String(s) => args.add(s.clone()),
        Value::Datetime(dt) => args.add(*dt),
        Value::Json(v) => args.add(v.clone()),
    }
    .map_err(bind_error)
}

pub(crate) fn arguments(values: &[&Value]) -> Result<MySqlArguments, MapperError> {
    let mut args = MySqlArguments::default();
    for value in values {
        bind_value(&mut args, value)?;
    }
    Ok(args)
}
