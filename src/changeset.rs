//! Structural diff and patch over JSON values.
//!
//! A [`Changeset`] is an ordered list of [`ChangeOp`]s. [`diff`] computes the
//! changeset turning one value into another, [`apply`] replays it. Objects are
//! compared key by key; every other value, arrays included, is compared as a
//! whole and replaced as a whole.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property names (or decimal array indices) leading to a value.
pub type Path = Vec<String>;

/// An ordered list of operations.
pub type Changeset = Vec<ChangeOp>;

/// Nesting depth at which [`diff`] stops descending and replaces the
/// remaining subtree with a single put.
const MAX_DEPTH: usize = 256;

/// One step of a changeset.
///
/// Serialized in the compact form stored in the log:
///
/// ```text
/// {"type":"put","key":["address","city"],"value":"Portland"}
/// {"type":"del","key":["nickname"]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeOp {
    /// Assign `value` at `path`. An empty path replaces the whole value.
    Put {
        #[serde(rename = "key")]
        path: Path,
        value: Value,
    },
    /// Remove whatever is at `path`. An empty path resets the whole value to null.
    Del {
        #[serde(rename = "key")]
        path: Path,
    },
}

impl ChangeOp {
    /// Build a put, rewriting it to a del when `value` is absent (null).
    pub fn put(path: Path, value: Value) -> Self {
        if value.is_null() {
            ChangeOp::Del { path }
        } else {
            ChangeOp::Put { path, value }
        }
    }

    pub fn del(path: Path) -> Self {
        ChangeOp::Del { path }
    }

    pub fn path(&self) -> &[String] {
        match self {
            ChangeOp::Put { path, .. } | ChangeOp::Del { path } => path,
        }
    }
}

/// Compute the changeset that turns `old` into `new`.
///
/// Shared object keys are compared recursively. Keys only in `old` become
/// dels, keys only in `new` become puts. Any other difference, including a
/// changed array, becomes a single put of the whole new value at that path.
/// A null `new` value counts as absent and yields a del.
///
/// # Examples
///
/// ```
/// use entityfold::changeset::{diff, ChangeOp};
/// use serde_json::json;
///
/// let old = json!({"name": "alice", "roles": ["a", "b"], "nick": "al"});
/// let new = json!({"name": "alice", "roles": ["a"], "age": 30});
///
/// let ops = diff(&old, &new);
/// assert_eq!(ops, vec![
///     ChangeOp::Put { path: vec!["roles".into()], value: json!(["a"]) },
///     ChangeOp::Del { path: vec!["nick".into()] },
///     ChangeOp::Put { path: vec!["age".into()], value: json!(30) },
/// ]);
///
/// // Nothing in common with null: one put at the root.
/// let ops = diff(&json!(null), &new);
/// assert_eq!(ops, vec![ChangeOp::Put { path: vec![], value: new.clone() }]);
/// ```
pub fn diff(old: &Value, new: &Value) -> Changeset {
    let mut changes = Vec::new();
    let mut comparing = Comparing::default();
    compare(&mut Vec::new(), old, new, &mut comparing, &mut changes);
    changes
}

/// Identities of the object nodes on the current comparison path.
///
/// Nodes are identified by address and only ever compared, never
/// dereferenced. Re-entering a node already on the path, or going deeper
/// than [`MAX_DEPTH`], ends the descent.
#[derive(Default)]
struct Comparing {
    stack: Vec<usize>,
}

impl Comparing {
    fn enter(&mut self, node: &Map<String, Value>) -> bool {
        let id = std::ptr::from_ref(node) as usize;
        if self.stack.len() >= MAX_DEPTH || self.stack.contains(&id) {
            return false;
        }
        self.stack.push(id);
        true
    }

    fn leave(&mut self) {
        self.stack.pop();
    }
}

fn compare(
    path: &mut Path,
    old: &Value,
    new: &Value,
    comparing: &mut Comparing,
    changes: &mut Changeset,
) {
    if let (Value::Object(old_map), Value::Object(new_map)) = (old, new) {
        if comparing.enter(old_map) {
            compare_objects(path, old_map, new_map, comparing, changes);
            comparing.leave();
            return;
        }
    }

    if old != new {
        changes.push(ChangeOp::put(path.clone(), new.clone()));
    }
}

fn compare_objects(
    path: &mut Path,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    comparing: &mut Comparing,
    changes: &mut Changeset,
) {
    for (key, old_value) in old {
        if let Some(new_value) = new.get(key) {
            path.push(key.clone());
            compare(path, old_value, new_value, comparing, changes);
            path.pop();
        }
    }

    for key in old.keys().filter(|key| !new.contains_key(*key)) {
        changes.push(ChangeOp::del(child_path(path, key)));
    }

    for (key, value) in new.iter().filter(|(key, _)| !old.contains_key(*key)) {
        changes.push(ChangeOp::put(child_path(path, key), value.clone()));
    }
}

fn child_path(path: &[String], key: &str) -> Path {
    let mut child = path.to_vec();
    child.push(key.to_string());
    child
}

/// Replay `ops` over a copy of `target`. `target` is left untouched.
///
/// # Examples
///
/// ```
/// use entityfold::changeset::{apply, diff};
/// use serde_json::json;
///
/// let old = json!({"user": {"name": "alice", "city": "Oslo"}});
/// let new = json!({"user": {"name": "alice", "city": "Bergen"}, "active": true});
///
/// let patched = apply(&diff(&old, &new), &old);
/// assert_eq!(patched, new);
/// assert_eq!(old["user"]["city"], "Oslo");
/// ```
pub fn apply(ops: &[ChangeOp], target: &Value) -> Value {
    let mut result = target.clone();
    apply_in_place(ops, &mut result);
    result
}

/// Replay `ops` directly onto `target`.
///
/// Puts create missing intermediate objects along the path. A numeric
/// segment addressing an array assigns that position; any index at or past
/// the end appends instead. Dels of paths that do not exist are no-ops.
pub fn apply_in_place(ops: &[ChangeOp], target: &mut Value) {
    for op in ops {
        match op {
            ChangeOp::Put { path, value } => match path.split_last() {
                None => *target = value.clone(),
                Some((last, parents)) => {
                    let mut node = &mut *target;
                    for segment in parents {
                        node = child_mut(node, segment);
                    }
                    *child_mut(node, last) = value.clone();
                }
            },
            ChangeOp::Del { path } => match path.split_last() {
                None => *target = Value::Null,
                Some((last, parents)) => {
                    if let Some(node) = find_mut(target, parents) {
                        remove_child(node, last);
                    }
                }
            },
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn array_index(node: &Value, segment: &str) -> Option<usize> {
    match node {
        Value::Array(_) => segment.parse().ok(),
        _ => None,
    }
}

/// Child of `node` at `segment`, created as an empty object when missing.
/// Scalars on the way are replaced by objects.
fn child_mut<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = array_index(node, segment);
    match (node, index) {
        (Value::Array(items), Some(index)) => {
            if index < items.len() {
                &mut items[index]
            } else {
                items.push(Value::Null);
                let last = items.len() - 1;
                &mut items[last]
            }
        }
        (Value::Object(map), _) => map.entry(segment).or_insert_with(empty_object),
        (node, _) => {
            *node = empty_object();
            child_mut(node, segment)
        }
    }
}

fn find_mut<'a>(mut node: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    for segment in segments {
        node = match node {
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get_mut(segment)?,
            _ => return None,
        };
    }
    Some(node)
}

fn remove_child(node: &mut Value, segment: &str) {
    match node {
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if index < items.len() {
                    items.remove(index);
                }
            }
        }
        Value::Object(map) => {
            map.remove(segment);
        }
        _ => {}
    }
}
