//! Query evaluation over an in-process entity map.

use std::cmp::Ordering;

use stash_types::{compare_values, Direction, Key, Properties, Query};

use crate::error::{BackendFault, BackendResult};

/// Evaluate `query` against `entities`, which must be in key order.
///
/// Semantics follow a typical document datastore:
/// - an entity missing a filtered, ordered, or projected field never matches;
/// - ties under an order clause keep key order;
/// - `distinct` drops rows whose returned fields repeat an earlier row;
/// - keys-only rows carry empty properties.
pub fn evaluate<'a, I>(entities: I, query: &Query) -> BackendResult<Vec<(Key, Properties)>>
where
    I: IntoIterator<Item = (&'a Key, &'a Properties)>,
{
    let mut filters = Vec::with_capacity(query.filters().len());
    for filter in query.filters() {
        let (field, op) = filter
            .parts()
            .map_err(|_| BackendFault::InvalidQuery(format!("bad filter {:?}", filter.expr)))?;
        filters.push((field, op, &filter.value));
    }

    let order = query.order_field();

    let mut rows: Vec<(&Key, &Properties)> = entities
        .into_iter()
        .filter(|(key, _)| key.kind() == query.kind())
        .filter(|(key, _)| query.ancestor_key().map_or(true, |a| key.has_ancestor(a)))
        .filter(|(_, props)| {
            filters.iter().all(|(field, op, operand)| {
                props
                    .get(*field)
                    .is_some_and(|candidate| op.apply(candidate, operand))
            })
        })
        .filter(|(_, props)| order.map_or(true, |(field, _)| props.contains_key(field)))
        .filter(|(_, props)| query.projection().iter().all(|f| props.contains_key(f)))
        .collect();

    if let Some((field, direction)) = order {
        rows.sort_by(|(_, a), (_, b)| {
            let ord = match (a.get(field), b.get(field)) {
                (Some(x), Some(y)) => compare_values(x, y),
                _ => Ordering::Equal,
            };
            match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }

    let mut out: Vec<(Key, Properties)> = Vec::new();
    let mut seen: Vec<Properties> = Vec::new();
    for (key, props) in rows {
        let returned = if query.projection().is_empty() {
            props.clone()
        } else {
            query
                .projection()
                .iter()
                .filter_map(|f| props.get(f).map(|v| (f.clone(), v.clone())))
                .collect()
        };
        if query.is_distinct() {
            if seen.contains(&returned) {
                continue;
            }
            seen.push(returned.clone());
        }
        let returned = if query.is_keys_only() {
            Properties::new()
        } else {
            returned
        };
        out.push((key.clone(), returned));
        if query.limit_value().is_some_and(|limit| out.len() >= limit) {
            break;
        }
    }
    Ok(out)
}
