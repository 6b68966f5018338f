//! Collection helpers shared across the toolkit.
//!
//! Small functions over `serde_json::Value` maps and ordered std
//! collections. The directory materializer relies on [`to_list`] and
//! [`first_value`]; the rest are offered to consuming modules.

use serde_json::map::Entry;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use tracing::warn;

/// Coerce a value to a list.
///
/// `null` becomes an empty list, arrays are returned element-wise and any
/// other value becomes a single-element list.
pub fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Return the first value that is not `null`.
pub fn first_value(values: impl IntoIterator<Item = Value>) -> Option<Value> {
    values.into_iter().find(|v| !v.is_null())
}

/// Merge `other` into `base` recursively, keeping what `base` already has.
///
/// Keys missing from `base` are copied over. Where both sides hold a
/// mapping the two are merged, and where both hold a list `other`'s items
/// are appended. Any other value already in `base` is left alone.
///
/// # Example
/// ```
/// use serde_json::json;
/// use omnipath_common::misc::merge_dicts;
///
/// let mut base = json!({"cache": {"dir": "/tmp"}, "organisms": [9606], "ttl": 3});
/// let other = json!({"cache": {"ttl": 7}, "organisms": [10090], "ttl": 5});
/// merge_dicts(base.as_object_mut().unwrap(), other.as_object().unwrap().clone());
/// assert_eq!(
///     base,
///     json!({"cache": {"dir": "/tmp", "ttl": 7}, "organisms": [9606, 10090], "ttl": 3}),
/// );
/// ```
pub fn merge_dicts(base: &mut Map<String, Value>, other: Map<String, Value>) {
    for (key, value) in other {
        match base.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                (Value::Object(inner), Value::Object(value)) => merge_dicts(inner, value),
                (Value::Array(items), Value::Array(value)) => items.extend(value),
                _ => {}
            },
        }
    }
}

/// Keep only the given keys of a map.
pub fn select_keys(map: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    map.iter()
        .filter(|(k, _)| keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Union of all the sets in a map.
pub fn dict_union<K, V>(groups: &BTreeMap<K, BTreeSet<V>>) -> BTreeSet<V>
where
    V: Ord + Clone,
{
    groups.values().flatten().cloned().collect()
}

/// Swap keys and values: each value maps to the set of keys it appeared under.
pub fn swap_dict<K, V>(map: &BTreeMap<K, Vec<V>>) -> BTreeMap<V, BTreeSet<K>>
where
    K: Ord + Clone,
    V: Ord + Clone,
{
    let mut out: BTreeMap<V, BTreeSet<K>> = BTreeMap::new();
    for (key, values) in map {
        for value in values {
            out.entry(value.clone()).or_default().insert(key.clone());
        }
    }
    out
}

/// Union of every group except `group`.
fn others<K: Ord, V: Ord + Clone>(groups: &BTreeMap<K, BTreeSet<V>>, group: &K) -> BTreeSet<V> {
    groups
        .iter()
        .filter(|(label, _)| *label != group)
        .flat_map(|(_, values)| values.iter().cloned())
        .collect()
}

fn group_of<'a, K: Ord + Debug, V>(
    groups: &'a BTreeMap<K, BTreeSet<V>>,
    group: &K,
) -> Option<&'a BTreeSet<V>> {
    let found = groups.get(group);
    if found.is_none() {
        warn!("Group {:?} missing from the groups", group);
    }
    found
}

/// Elements of `group` that also occur in at least one other group.
///
/// A missing group has no elements.
pub fn shared_elements<K, V>(groups: &BTreeMap<K, BTreeSet<V>>, group: &K) -> BTreeSet<V>
where
    K: Ord + Debug,
    V: Ord + Clone,
{
    let Some(own) = group_of(groups, group) else {
        return BTreeSet::new();
    };
    own.intersection(&others(groups, group)).cloned().collect()
}

/// Elements of `group` found in no other group.
///
/// A missing group has no elements.
pub fn unique_elements<K, V>(groups: &BTreeMap<K, BTreeSet<V>>, group: &K) -> BTreeSet<V>
where
    K: Ord + Debug,
    V: Ord + Clone,
{
    let Some(own) = group_of(groups, group) else {
        return BTreeSet::new();
    };
    own.difference(&others(groups, group)).cloned().collect()
}

fn occurrences<K, V: Ord + Clone>(groups: &BTreeMap<K, BTreeSet<V>>) -> BTreeMap<V, usize> {
    let mut counts = BTreeMap::new();
    for value in groups.values().flatten() {
        *counts.entry(value.clone()).or_insert(0) += 1;
    }
    counts
}

/// Elements present in at least two groups.
pub fn shared_total<K, V: Ord + Clone>(groups: &BTreeMap<K, BTreeSet<V>>) -> BTreeSet<V> {
    occurrences(groups)
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(v, _)| v)
        .collect()
}

/// Elements present in exactly one group.
pub fn unique_total<K, V: Ord + Clone>(groups: &BTreeMap<K, BTreeSet<V>>) -> BTreeSet<V> {
    occurrences(groups)
        .into_iter()
        .filter(|(_, n)| *n == 1)
        .map(|(v, _)| v)
        .collect()
}

/// Render rows as a plain-text table.
///
/// Columns are left aligned and padded to the widest cell; the header is
/// followed by a dashed separator. Short rows are padded with empty cells.
pub fn table_format(header: &[&str], rows: &[Vec<String>]) -> String {
    let ncol = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);

    let mut widths = vec![0usize; ncol];
    for (i, h) in header.iter().enumerate() {
        widths[i] = widths[i].max(h.chars().count());
    }
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| -> String {
        let line = (0..ncol)
            .map(|i| {
                let cell = cells.get(i).copied().unwrap_or("");
                format!("{:<width$}", cell, width = widths[i])
            })
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    };

    let mut lines = vec![render(header.to_vec())];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        lines.push(render(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn groups(items: &[(&str, &[i32])]) -> BTreeMap<String, BTreeSet<i32>> {
        items
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_to_list() {
        assert!(to_list(&Value::Null).is_empty());
        assert_eq!(to_list(&json!("a")), vec![json!("a")]);
        assert_eq!(to_list(&json!(["a", "b"])), vec![json!("a"), json!("b")]);
    }

    #[test]
    fn test_first_value_skips_nulls() {
        assert_eq!(
            first_value([Value::Null, json!(3), json!(4)]),
            Some(json!(3))
        );
        assert_eq!(first_value([Value::Null]), None);
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_merge_dicts_keeps_existing_scalars() {
        let mut base = object(json!({"host": "localhost", "port": 8080}));
        merge_dicts(&mut base, object(json!({"port": 9000, "debug": true})));
        assert_eq!(
            Value::Object(base),
            json!({"host": "localhost", "port": 8080, "debug": true})
        );
    }

    #[test]
    fn test_merge_dicts_nested_and_lists() {
        let mut base = object(json!({"server": {"host": "a"}, "organisms": [9606]}));
        merge_dicts(
            &mut base,
            object(json!({"server": {"port": 1}, "organisms": [10090, 10116]})),
        );
        assert_eq!(
            Value::Object(base),
            json!({"server": {"host": "a", "port": 1}, "organisms": [9606, 10090, 10116]})
        );
    }

    #[test]
    fn test_select_keys() {
        let map = json!({"a": 1, "b": 2, "c": 3});
        let map = map.as_object().unwrap();
        assert_eq!(Value::Object(select_keys(map, &["a", "c", "z"])), json!({"a": 1, "c": 3}));
    }

    #[test]
    fn test_dict_union() {
        let g = groups(&[("x", &[1, 2]), ("y", &[2, 4])]);
        assert_eq!(dict_union(&g), BTreeSet::from([1, 2, 4]));
        assert!(dict_union(&groups(&[])).is_empty());
    }

    #[test]
    fn test_swap_dict() {
        let mut map = BTreeMap::new();
        map.insert("a", vec![1, 2, 3]);
        map.insert("b", vec![2, 3]);
        let swapped = swap_dict(&map);
        assert_eq!(swapped[&1], BTreeSet::from(["a"]));
        assert_eq!(swapped[&2], BTreeSet::from(["a", "b"]));
    }

    #[test]
    fn test_shared_and_unique_of_group() {
        let g = groups(&[("a", &[1, 2, 3]), ("b", &[2, 3, 4]), ("c", &[3, 5])]);
        let a = "a".to_string();
        assert_eq!(shared_elements(&g, &a), BTreeSet::from([2, 3]));
        assert_eq!(unique_elements(&g, &a), BTreeSet::from([1]));
        assert_eq!(unique_elements(&g, &"c".to_string()), BTreeSet::from([5]));
        assert!(shared_elements(&g, &"missing".to_string()).is_empty());
    }

    #[test]
    fn test_shared_and_unique_total() {
        let g = groups(&[("a", &[1, 2, 3]), ("b", &[2, 3, 4]), ("c", &[3, 5])]);
        assert_eq!(shared_total(&g), BTreeSet::from([2, 3]));
        assert_eq!(unique_total(&g), BTreeSet::from([1, 4, 5]));
    }

    #[test]
    fn test_table_format() {
        let rows = vec![
            vec!["datadir".to_string(), "/data".to_string()],
            vec!["module".to_string()],
        ];
        let table = table_format(&["key", "value"], &rows);
        assert_eq!(
            table,
            "key      value\n-------  -----\ndatadir  /data\nmodule"
        );
    }
}
