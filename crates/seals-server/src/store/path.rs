use std::fmt;

use serde_json::{Map, Value};

use super::{ServerValue, StoreError};

const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// Slash-separated store path, e.g. `games/abc/teams/t1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments: Vec<String> = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(bad) = segments.iter().find(|s| s.contains(FORBIDDEN)) {
            return Err(StoreError::InvalidPath(format!(
                "segment '{bad}' in '{raw}' contains a reserved character"
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &StorePath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Two paths overlap when a write to one can change the value at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

pub(super) fn get_in<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// Writes `value` at `path`; `None` deletes. Emptied parent objects are
/// pruned so that "no children" and "absent" read the same.
pub(super) fn set_in(root: &mut Value, path: &StorePath, value: Option<Value>) {
    fn walk(node: &mut Value, segments: &[String], value: Option<Value>) {
        let Some((head, rest)) = segments.split_first() else {
            *node = value.unwrap_or(Value::Null);
            return;
        };
        if !node.is_object() {
            if value.is_none() {
                return;
            }
            *node = Value::Object(Map::new());
        }
        let Some(obj) = node.as_object_mut() else {
            return;
        };
        if rest.is_empty() {
            match value {
                Some(value) => {
                    obj.insert(head.clone(), value);
                }
                None => {
                    obj.remove(head);
                }
            }
            return;
        }
        let child = obj.entry(head.clone()).or_insert(Value::Null);
        walk(child, rest, value);
        if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
            obj.remove(head);
        }
    }

    walk(root, path.segments(), value);
    if root.is_null() {
        *root = Value::Object(Map::new());
    }
}

/// Drops nulls and empty objects and resolves server-value sentinels.
/// Returns `None` when nothing storable is left.
pub(super) fn normalize(value: Value, now: i64) -> Option<Value> {
    if ServerValue::is_timestamp(&value) {
        return Some(Value::from(now));
    }
    match value {
        Value::Null => None,
        Value::Object(obj) => {
            let cleaned: Map<String, Value> = obj
                .into_iter()
                .filter_map(|(key, child)| normalize(child, now).map(|child| (key, child)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .map(|item| normalize(item, now).unwrap_or(Value::Null))
                .collect(),
        )),
        other => Some(other),
    }
}
