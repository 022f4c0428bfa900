//! Filter and ordering compilation to SQLite
//!
//! Rows live as JSON in `records.body`; every field reference becomes
//! `json_extract(body, ?)` with a bound `$.path`. The generated SQL keeps the
//! row semantics of [`Filter::matches`]: a missing field reads as null,
//! comparisons never match across types or against null, and `1 == 1.0`.
//! Every predicate yields 0 or 1, never NULL, so `NOT` inverts exactly.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tessera_core::spec::filter::Direction;
use tessera_core::spec::{Filter, OrderBy};
use tessera_core::storage::RowQuery;

use crate::errors::{invalid_name, Result};

/// SQL fragment with its positional parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Fragment {
    fn literal(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }

    fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn append(&mut self, other: Fragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }
}

/// Reject names that cannot be safely inlined into DDL or a JSON path
///
/// # Errors
///
/// Returns `Validation` for empty names or characters outside `[A-Za-z0-9_.]`.
pub fn check_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(invalid_name(kind, name))
    }
}

/// `$.a.b` for the dotted field `a.b`
///
/// # Errors
///
/// Returns `Validation` for an unusable field name.
pub fn json_path(field: &str) -> Result<String> {
    check_name("field", field)?;
    Ok(format!("$.{}", field))
}

/// Bind a JSON scalar the way `json_extract` would return it
pub fn bind_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::MAX)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // json_extract returns nested values as minified JSON text
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// `json_type` results that compare against `value`
fn comparable_types(value: &Value) -> Option<&'static str> {
    match value {
        Value::Number(_) => Some("('integer', 'real')"),
        Value::String(_) => Some("('text')"),
        Value::Bool(_) => Some("('true', 'false')"),
        Value::Array(_) => Some("('array')"),
        Value::Object(_) => Some("('object')"),
        Value::Null => None,
    }
}

fn extract(field: &str) -> Result<Fragment> {
    Ok(Fragment {
        sql: "json_extract(body, ?)".to_string(),
        params: vec![SqlValue::Text(json_path(field)?)],
    })
}

fn comparison(field: &str, op: &str, value: &Value) -> Result<Fragment> {
    let Some(types) = comparable_types(value) else {
        return Ok(Fragment::literal("0"));
    };
    let path = json_path(field)?;
    Ok(Fragment {
        sql: format!(
            "COALESCE(json_type(body, ?) IN {} AND json_extract(body, ?) {} ?, 0)",
            types, op
        ),
        params: vec![
            SqlValue::Text(path.clone()),
            SqlValue::Text(path),
            bind_value(value),
        ],
    })
}

/// Equality that, like ordering, never crosses JSON types (`true != 1`)
fn equality(field: &str, value: &Value) -> Result<Fragment> {
    if value.is_null() {
        let mut out = extract(field)?;
        out.push_sql(" IS NULL");
        return Ok(out);
    }
    comparison(field, "=", value)
}

fn join(filters: &[Filter], separator: &str, empty: &str) -> Result<Fragment> {
    if filters.is_empty() {
        return Ok(Fragment::literal(empty));
    }
    let mut out = Fragment::literal("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            out.push_sql(separator);
        }
        out.append(compile_filter(filter)?);
    }
    out.push_sql(")");
    Ok(out)
}

/// Compile a predicate tree to a boolean SQL expression over `body`
///
/// # Errors
///
/// Returns `Validation` for an unusable field name.
pub fn compile_filter(filter: &Filter) -> Result<Fragment> {
    match filter {
        Filter::Eq(field, value) => equality(field, value),
        Filter::Ne(field, value) => {
            let mut out = Fragment::literal("NOT ");
            out.append(equality(field, value)?);
            Ok(out)
        }
        Filter::Lt(field, value) => comparison(field, "<", value),
        Filter::Le(field, value) => comparison(field, "<=", value),
        Filter::Gt(field, value) => comparison(field, ">", value),
        Filter::Ge(field, value) => comparison(field, ">=", value),
        Filter::In(field, values) => {
            if values.is_empty() {
                return Ok(Fragment::literal("0"));
            }
            let mut out = Fragment::literal("(");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_sql(" OR ");
                }
                out.append(equality(field, value)?);
            }
            out.push_sql(")");
            Ok(out)
        }
        Filter::IsNull(field) => {
            let mut out = extract(field)?;
            out.push_sql(" IS NULL");
            Ok(out)
        }
        Filter::And(filters) => join(filters, " AND ", "1"),
        Filter::Or(filters) => join(filters, " OR ", "0"),
        Filter::Not(inner) => {
            let mut out = Fragment::literal("NOT (");
            out.append(compile_filter(inner)?);
            out.push_sql(")");
            Ok(out)
        }
    }
}

/// `ORDER BY` clause; insertion order breaks ties
///
/// # Errors
///
/// Returns `Validation` for an unusable field name.
pub fn compile_order(order_by: &[OrderBy]) -> Result<Fragment> {
    let mut out = Fragment::literal(" ORDER BY ");
    for key in order_by {
        out.append(extract(&key.field)?);
        out.push_sql(match key.direction {
            Direction::Asc => " ASC, ",
            Direction::Desc => " DESC, ",
        });
    }
    out.push_sql("seq ASC");
    Ok(out)
}

/// Full `SELECT body` statement for one table
///
/// # Errors
///
/// Returns `Validation` for an unusable field name.
pub fn compile_select(table: &str, query: &RowQuery) -> Result<Fragment> {
    let mut out = Fragment {
        sql: "SELECT body FROM records WHERE table_name = ?".to_string(),
        params: vec![SqlValue::Text(table.to_string())],
    };
    if let Some(filter) = &query.filter {
        out.push_sql(" AND ");
        out.append(compile_filter(filter)?);
    }
    out.append(compile_order(&query.order_by)?);
    if let Some(limit) = query.limit {
        out.push_sql(&format!(" LIMIT {}", limit));
    }
    Ok(out)
}

/// `SELECT COUNT(*)` statement for one table
///
/// # Errors
///
/// Returns `Validation` for an unusable field name.
pub fn compile_count(table: &str, filter: Option<&Filter>) -> Result<Fragment> {
    let mut out = Fragment {
        sql: "SELECT COUNT(*) FROM records WHERE table_name = ?".to_string(),
        params: vec![SqlValue::Text(table.to_string())],
    };
    if let Some(filter) = filter {
        out.push_sql(" AND ");
        out.append(compile_filter(filter)?);
    }
    Ok(out)
}

/// DDL for the partial unique index guarding `table.field`
///
/// # Errors
///
/// Returns `Validation` for an unusable table or field name.
pub fn unique_index_ddl(table: &str, field: &str) -> Result<String> {
    check_name("table", table)?;
    let path = json_path(field)?;
    Ok(format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS \"{index}\" ON records (json_extract(body, '{path}')) \
         WHERE table_name = '{table}' AND json_extract(body, '{path}') IS NOT NULL",
        index = crate::errors::unique_index_name(table, field),
        path = path,
        table = table,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eq_binds_path_and_value() {
        let fragment = compile_filter(&Filter::eq("title", "Beach")).unwrap();
        assert_eq!(
            fragment.sql,
            "COALESCE(json_type(body, ?) IN ('text') AND json_extract(body, ?) = ?, 0)"
        );
        assert_eq!(
            fragment.params,
            vec![
                SqlValue::Text("$.title".to_string()),
                SqlValue::Text("$.title".to_string()),
                SqlValue::Text("Beach".to_string())
            ]
        );
    }

    #[test]
    fn test_eq_null_is_null_check() {
        let fragment = compile_filter(&Filter::eq("note", Value::Null)).unwrap();
        assert_eq!(fragment.sql, "json_extract(body, ?) IS NULL");
        let negated = compile_filter(&Filter::ne("note", Value::Null)).unwrap();
        assert_eq!(negated.sql, "NOT json_extract(body, ?) IS NULL");
    }

    #[test]
    fn test_comparison_guards_type() {
        let fragment = compile_filter(&Filter::lt("position", 3)).unwrap();
        assert!(fragment
            .sql
            .starts_with("COALESCE(json_type(body, ?) IN ('integer', 'real')"));
        assert_eq!(fragment.params.len(), 3);
        assert_eq!(fragment.params[2], SqlValue::Integer(3));
    }

    #[test]
    fn test_comparison_against_null_never_matches() {
        let fragment = compile_filter(&Filter::gt("position", Value::Null)).unwrap();
        assert_eq!(fragment.sql, "0");
    }

    #[test]
    fn test_in_with_null_and_empty() {
        let empty = compile_filter(&Filter::In("kind".to_string(), vec![])).unwrap();
        assert_eq!(empty.sql, "0");

        let mixed = compile_filter(&Filter::In(
            "kind".to_string(),
            vec![json!("image"), Value::Null],
        ))
        .unwrap();
        assert_eq!(
            mixed.sql,
            "(COALESCE(json_type(body, ?) IN ('text') AND json_extract(body, ?) = ?, 0) \
             OR json_extract(body, ?) IS NULL)"
        );
        assert_eq!(mixed.params.len(), 4);
    }

    #[test]
    fn test_empty_and_or() {
        assert_eq!(compile_filter(&Filter::And(vec![])).unwrap().sql, "1");
        assert_eq!(compile_filter(&Filter::Or(vec![])).unwrap().sql, "0");
    }

    #[test]
    fn test_rejects_injection_in_field_names() {
        assert!(compile_filter(&Filter::eq("title') OR 1=1 --", "x")).is_err());
        assert!(unique_index_ddl("tags; DROP TABLE records", "name").is_err());
    }

    #[test]
    fn test_select_orders_then_limits() {
        let query = RowQuery::all().ordered_by(OrderBy::desc("position")).limit(1);
        let fragment = compile_select("timeline_entries", &query).unwrap();
        assert!(fragment
            .sql
            .ends_with("ORDER BY json_extract(body, ?) DESC, seq ASC LIMIT 1"));
    }

    #[test]
    fn test_bool_binds_as_integer() {
        assert_eq!(bind_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(bind_value(&json!(u64::MAX)), SqlValue::Real(u64::MAX as f64));
    }
}
