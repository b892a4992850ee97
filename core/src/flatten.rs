/// Dotted-path flattening of nested JSON string tables
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_SEPARATOR: &str = ".";

/// Ordered mapping of flat key to leaf value.
pub type FlatMap = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlattenError {
    #[error("key `{key}` collides with `{conflicting}`: one path is a prefix of the other")]
    PathConflict { key: String, conflicting: String },

    #[error("key `{key}` appears more than once after flattening")]
    DuplicatePath { key: String },

    #[error("separator must not be empty")]
    EmptySeparator,
}

/// Flatten `tree` depth-first, emitting one entry per non-object leaf.
///
/// Keys follow the tree's own iteration order. A non-object root has no
/// addressable leaves and yields an empty map; empty objects are dropped.
/// Two leaves reaching the same path (`{"a.b": .., "a": {"b": ..}}`) are an
/// error, never a silent overwrite.
pub fn flatten(tree: &Value, separator: &str) -> Result<FlatMap, FlattenError> {
    let mut out = Map::new();
    if let Value::Object(map) = tree {
        flatten_into(map, "", separator, &mut out)?;
    }
    Ok(out)
}

fn flatten_into(
    map: &Map<String, Value>,
    parent: &str,
    separator: &str,
    out: &mut FlatMap,
) -> Result<(), FlattenError> {
    for (key, value) in map {
        let path = if parent.is_empty() {
            key.clone()
        } else {
            format!("{parent}{separator}{key}")
        };

        match value {
            Value::Object(child) => flatten_into(child, &path, separator, out)?,
            leaf => {
                if out.contains_key(&path) {
                    return Err(FlattenError::DuplicatePath { key: path });
                }
                out.insert(path, leaf.clone());
            }
        }
    }
    Ok(())
}

/// Rebuild the nested tree described by `flat`.
///
/// Fails instead of overwriting when one key is a strict path prefix of
/// another (`a` and `a.b`).
pub fn unflatten(flat: &FlatMap, separator: &str) -> Result<Value, FlattenError> {
    if separator.is_empty() {
        return Err(FlattenError::EmptySeparator);
    }

    let mut root = Map::new();
    for (key, value) in flat {
        let parts: Vec<&str> = key.split(separator).collect();
        let (last, parents) = match parts.split_last() {
            Some(split) => split,
            None => continue,
        };

        let mut node = &mut root;
        let mut walked = String::new();
        for part in parents {
            if !walked.is_empty() {
                walked.push_str(separator);
            }
            walked.push_str(part);

            let slot = node
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match slot {
                Value::Object(child) => child,
                _ => {
                    return Err(FlattenError::PathConflict {
                        key: key.clone(),
                        conflicting: walked,
                    })
                }
            };
        }

        if let Some(Value::Object(_)) = node.get(*last) {
            let conflicting = flat
                .keys()
                .find(|other| other.starts_with(&format!("{key}{separator}")))
                .cloned()
                .unwrap_or_else(|| key.clone());
            return Err(FlattenError::PathConflict {
                key: key.clone(),
                conflicting,
            });
        }
        node.insert(last.to_string(), value.clone());
    }

    Ok(Value::Object(root))
}

/// Text form of a leaf: strings verbatim, anything else as compact JSON.
pub fn leaf_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
