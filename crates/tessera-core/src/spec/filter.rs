//! Engine-agnostic predicates and ordering over JSON row fields
//!
//! Field names are top-level keys or dotted paths (`meta.width`). A missing
//! field reads as `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::model::{id_value, EntityId, ID_FIELD};

/// Predicate tree evaluated against a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Le(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ge(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull(field.into())
    }

    /// Match a field holding an entity id
    pub fn refers_to(field: impl Into<String>, id: EntityId) -> Self {
        Filter::Eq(field.into(), id_value(id))
    }

    pub fn id_eq(id: EntityId) -> Self {
        Filter::refers_to(ID_FIELD, id)
    }

    pub fn id_in(ids: impl IntoIterator<Item = EntityId>) -> Self {
        Filter::In(ID_FIELD.to_string(), ids.into_iter().map(id_value).collect())
    }

    /// Conjunction, flattening nested `And`s
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, Filter::And(mut right)) => {
                right.insert(0, this);
                Filter::And(right)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut left) => {
                left.push(other);
                Filter::Or(left)
            }
            this => Filter::Or(vec![this, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Evaluate against a JSON row
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => values_equal(field_value(row, field), value),
            Filter::Ne(field, value) => !values_equal(field_value(row, field), value),
            Filter::Lt(field, value) => {
                compare_values(field_value(row, field), value) == Some(Ordering::Less)
            }
            Filter::Le(field, value) => matches!(
                compare_values(field_value(row, field), value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::Gt(field, value) => {
                compare_values(field_value(row, field), value) == Some(Ordering::Greater)
            }
            Filter::Ge(field, value) => matches!(
                compare_values(field_value(row, field), value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::In(field, values) => {
                let actual = field_value(row, field);
                values.iter().any(|v| values_equal(actual, v))
            }
            Filter::IsNull(field) => field_value(row, field).is_null(),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Filter::Not(inner) => !inner.matches(row),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Compare two rows by a list of sort keys
pub fn compare_rows(a: &Value, b: &Value, order_by: &[OrderBy]) -> Ordering {
    for key in order_by {
        let ord = total_order(field_value(a, &key.field), field_value(b, &key.field));
        let ord = match key.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

static NULL: Value = Value::Null;

/// Look up a top-level or dotted field, `null` if absent
pub fn field_value<'a>(row: &'a Value, field: &str) -> &'a Value {
    let mut current = row;
    for part in field.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return &NULL,
        }
    }
    current
}

/// Equality with numeric normalization (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Partial order for comparisons; `None` across types or against `null`
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting: nulls first, then by type, then by value
fn total_order(a: &Value, b: &Value) -> Ordering {
    compare_values(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}
