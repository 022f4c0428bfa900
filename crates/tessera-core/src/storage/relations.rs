//! Eager-load resolution built on plain queries
//!
//! One query per relation node: collect the join keys of every source row,
//! fetch matching targets with an `In` filter, recurse into nested
//! relations, then distribute targets back to their source rows.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::{RowQuery, Session};
use crate::errors::Result;
use crate::model::ID_FIELD;
use crate::spec::filter::{field_value, values_equal};
use crate::spec::{Filter, LoadedRow, RelatedMap, Relation, RelationKind};

/// Resolve `relations` for `rows` through `session.query`
///
/// # Errors
///
/// Propagates the first failing query.
pub fn resolve_by_query<'a, S>(
    session: &'a S,
    rows: &'a [Value],
    relations: &'a [Relation],
) -> BoxFuture<'a, Result<Vec<RelatedMap>>>
where
    S: Session + ?Sized,
{
    async move {
        let mut maps = vec![RelatedMap::new(); rows.len()];

        for relation in relations {
            // (field on the source row, field on the target row)
            let (source_key, target_key) = match &relation.kind {
                RelationKind::BelongsTo { foreign_key } => (foreign_key.as_str(), ID_FIELD),
                RelationKind::HasMany { foreign_key } => (ID_FIELD, foreign_key.as_str()),
            };

            let mut keys: Vec<Value> = Vec::new();
            for row in rows {
                let key = field_value(row, source_key);
                if !key.is_null() && !keys.contains(key) {
                    keys.push(key.clone());
                }
            }

            if keys.is_empty() {
                for map in maps.iter_mut() {
                    map.insert(relation.name.clone(), Vec::new());
                }
                continue;
            }

            let query = RowQuery {
                filter: Some(Filter::In(target_key.to_string(), keys)),
                order_by: relation.order_by.clone(),
                limit: None,
            };
            let targets = session.query(&relation.target_table, &query).await?;

            let nested = if relation.nested.is_empty() {
                vec![RelatedMap::new(); targets.len()]
            } else {
                resolve_by_query(session, &targets, &relation.nested).await?
            };
            let loaded: Vec<LoadedRow> = targets
                .iter()
                .cloned()
                .zip(nested)
                .map(|(row, related)| LoadedRow { row, related })
                .collect();

            for (source, map) in rows.iter().zip(maps.iter_mut()) {
                let key = field_value(source, source_key);
                let matched: Vec<LoadedRow> = if key.is_null() {
                    Vec::new()
                } else {
                    loaded
                        .iter()
                        .filter(|t| values_equal(field_value(&t.row, target_key), key))
                        .cloned()
                        .collect()
                };
                map.insert(relation.name.clone(), matched);
            }
        }

        Ok(maps)
    }
    .boxed()
}
