use super::path::{encode_key_value, KeyMatch, KeyValue, Path, Step};
use super::{ETAG_KEY, LAST_MODIFIED_KEY};
use serde_json::Value;
use std::io::Write;
use std::sync::Mutex;

/// Error is a failure of a store operation. Each variant maps to exactly one
/// HTTP outcome in the request pipeline, which is why read misses (`Empty`)
/// and mutation misses (`KeyPathNotFound`) are distinct.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key path matches no node")]
    Empty,
    #[error("key path is not unique")]
    NotUnique,
    #[error("data already exists")]
    DataExists,
    #[error("key path not found")]
    KeyPathNotFound,
    #[error("invalid shape: {0}")]
    Shape(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Store holds the datastore document. Every operation takes the single
/// exclusive lock for its full duration, so composite sequences
/// (ensure-path, mutate, metadata update) appear atomic to readers.
pub struct Store {
    document: Mutex<Value>,
}

impl Store {
    /// An empty store: a document whose root is an empty object.
    pub fn new() -> Store {
        Store {
            document: Mutex::new(Value::Object(Default::default())),
        }
    }

    /// Wrap an existing document. The root must be an object.
    pub fn with_document(document: Value) -> Result<Store, Error> {
        if !document.is_object() {
            return Err(Error::Shape("datastore root must be an object".to_string()));
        }
        Ok(Store {
            document: Mutex::new(document),
        })
    }

    /// Restore a store from a JSON file. A missing file yields an empty store.
    pub fn load(path: &std::path::Path) -> Result<Store, Error> {
        match std::fs::read(path) {
            Ok(bytes) => Store::with_document(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Store::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist the whole document. The write is atomic: a temporary file in
    /// the destination directory, then a rename over the target.
    pub fn save(&self, path: &std::path::Path) -> Result<(), Error> {
        // Serialization happens outside the critical section.
        let document = self.lock().clone();
        let bytes = serde_json::to_vec_pretty(&document)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => std::path::Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|err| Error::Io(err.error))?;
        Ok(())
    }

    /// A point-in-time copy of the document.
    pub fn document(&self) -> Value {
        self.lock().clone()
    }

    pub fn last_modified(&self) -> Option<String> {
        self.metadata(LAST_MODIFIED_KEY)
    }

    pub fn etag(&self) -> Option<String> {
        self.metadata(ETAG_KEY)
    }

    /// Resolve `path` to exactly one node. Also reports whether the node's
    /// parent is an array (i.e. the node is a list entry).
    pub fn get(&self, path: &Path) -> Result<(Value, bool), Error> {
        let document = self.lock();
        let node = resolve(&document, path)?.clone();
        let parent_is_array = matches!(path.last(), Some(Step::Entry { .. }));
        Ok((node, parent_is_array))
    }

    /// Create missing intermediate objects along `path`. A list-element step
    /// whose target entry is missing ensures the list exists as an array and
    /// stops; list elements are never invented.
    pub fn ensure_path(&self, path: &Path) -> Result<(), Error> {
        let mut document = self.lock();
        ensure(&mut document, path)
    }

    /// Replace the node at `path` with `value`'s contents. If the path
    /// matches no node and its final step is a list-element predicate, the
    /// single entry of `value` is appended to the parent list instead.
    /// Returns whether the node was created (as opposed to replaced).
    pub fn put(&self, path: &Path, value: Value) -> Result<bool, Error> {
        let last = path
            .last()
            .ok_or_else(|| Error::Shape("cannot replace the datastore root".to_string()))?
            .clone();

        let mut document = self.lock();
        ensure(&mut document, path)?;

        let created = match resolve_mut(&mut document, path) {
            Ok(node) => {
                replace_node(node, value)?;
                false
            }
            Err(Error::Empty) => {
                let parent = resolve_mut(&mut document, &path.parent())?;
                match &last {
                    Step::Entry { list, .. } => {
                        let entry = single_list_entry(value)?;
                        let array = parent
                            .get_mut(list)
                            .and_then(Value::as_array_mut)
                            .ok_or(Error::Empty)?;
                        array.push(entry);
                    }
                    Step::Child(name) => {
                        let object = parent.as_object_mut().ok_or_else(|| {
                            Error::Shape(format!("parent of {name:?} is not a container"))
                        })?;
                        object.insert(name.clone(), value);
                    }
                }
                true
            }
            Err(err) => return Err(err),
        };

        touch(&mut document);
        Ok(created)
    }

    /// Attach new data under `parent`. A single-entry array is a new list
    /// entry of the `child_key` list, identified by `key_leaves`; an object
    /// is attached at `child_key` directly. Returns the RESTCONF child
    /// identifier that was created (for the `Location` header).
    pub fn post(
        &self,
        parent: &Path,
        value: Value,
        child_key: &str,
        key_leaves: &[String],
    ) -> Result<String, Error> {
        let mut document = self.lock();

        // The parent resource must already exist.
        if let Err(err) = resolve(&document, parent) {
            return Err(match err {
                Error::Empty => Error::KeyPathNotFound,
                other => other,
            });
        }

        match value {
            Value::Array(mut entries) => {
                if entries.len() != 1 {
                    return Err(Error::Shape(
                        "list payload must contain exactly one entry".to_string(),
                    ));
                }
                let entry = entries.pop().expect("length checked above");
                let object = entry.as_object().ok_or_else(|| {
                    Error::Shape("list entry must be an object".to_string())
                })?;
                if key_leaves.is_empty() {
                    return Err(Error::Shape(format!(
                        "list {child_key:?} declares no key leaves"
                    )));
                }

                let mut keys = Vec::with_capacity(key_leaves.len());
                for leaf in key_leaves {
                    let node = object.get(leaf).ok_or_else(|| {
                        Error::Shape(format!("list entry is missing key leaf {leaf:?}"))
                    })?;
                    let value = KeyValue::from_node(node).ok_or_else(|| {
                        Error::Shape(format!("key leaf {leaf:?} is not a scalar"))
                    })?;
                    keys.push(KeyMatch::new(leaf.clone(), value));
                }

                let target = parent.clone().entry(child_key, keys.clone());
                match resolve(&document, &target) {
                    Ok(_) => return Err(Error::DataExists),
                    Err(Error::Empty) => (),
                    Err(err) => return Err(err),
                }

                ensure(&mut document, &target)?;
                let parent_node = resolve_mut(&mut document, parent)?;
                let array = parent_node
                    .get_mut(child_key)
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| Error::Shape(format!("{child_key:?} is not a list")))?;
                array.push(entry);

                let suffix = keys
                    .iter()
                    .map(|key| encode_key_value(&key.value.to_url_literal()))
                    .collect::<Vec<_>>()
                    .join(",");
                touch(&mut document);
                Ok(format!("{child_key}={suffix}"))
            }
            value @ Value::Object(_) => {
                let target = parent.clone().child(child_key);
                match resolve(&document, &target) {
                    // An existing null placeholder does not conflict.
                    Ok(existing) if !existing.is_null() => return Err(Error::DataExists),
                    Ok(_) | Err(Error::Empty) => (),
                    Err(err) => return Err(err),
                }

                let parent_node = resolve_mut(&mut document, parent)?;
                let object = parent_node.as_object_mut().ok_or_else(|| {
                    Error::Shape(format!("parent of {child_key:?} is not a container"))
                })?;
                object.insert(child_key.to_string(), value);
                touch(&mut document);
                Ok(child_key.to_string())
            }
            _ => Err(Error::Shape(
                "payload must be an object or a single-entry list".to_string(),
            )),
        }
    }

    /// Merge-assign each top-level key of `value` into the object at `path`.
    /// Nested objects are replaced wholesale, not deep-merged.
    pub fn patch(&self, path: &Path, value: Value) -> Result<(), Error> {
        let mut document = self.lock();
        let node = resolve_mut(&mut document, path).map_err(|err| match err {
            Error::Empty => Error::KeyPathNotFound,
            other => other,
        })?;

        // A list-entry patch arrives wrapped in its single-entry array.
        let patch = match value {
            Value::Array(mut entries) if entries.len() == 1 => {
                entries.pop().expect("length checked above")
            }
            other => other,
        };

        match (node, patch) {
            (Value::Object(target), Value::Object(patch)) => {
                for (key, value) in patch {
                    target.insert(key, value);
                }
            }
            _ => {
                return Err(Error::Shape(
                    "merge target and payload must both be objects".to_string(),
                ))
            }
        }

        touch(&mut document);
        Ok(())
    }

    /// Remove the node at `path`.
    pub fn delete(&self, path: &Path) -> Result<(), Error> {
        let last = path
            .last()
            .ok_or_else(|| Error::Shape("cannot delete the datastore root".to_string()))?
            .clone();

        let mut document = self.lock();
        let parent = resolve_mut(&mut document, &path.parent()).map_err(|err| match err {
            Error::Empty => Error::KeyPathNotFound,
            other => other,
        })?;

        match &last {
            Step::Child(name) => {
                let object = parent
                    .as_object_mut()
                    .ok_or(Error::KeyPathNotFound)?;
                object.shift_remove(name).ok_or(Error::KeyPathNotFound)?;
            }
            Step::Entry { list, keys } => {
                let array = parent
                    .get_mut(list)
                    .and_then(Value::as_array_mut)
                    .ok_or(Error::KeyPathNotFound)?;
                let index = unique_match(array, keys).map_err(|err| match err {
                    Error::Empty => Error::KeyPathNotFound,
                    other => other,
                })?;
                array.remove(index);
            }
        }

        touch(&mut document);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Value> {
        self.document.lock().expect("store lock poisoned")
    }

    fn metadata(&self, key: &str) -> Option<String> {
        self.lock().get(key)?.as_str().map(str::to_string)
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

/// Walk `path` immutably, resolving to exactly one node.
fn resolve<'v>(document: &'v Value, path: &Path) -> Result<&'v Value, Error> {
    let mut current = document;
    for step in path.steps() {
        match step {
            Step::Child(name) => {
                current = current.get(name).ok_or(Error::Empty)?;
            }
            Step::Entry { list, keys } => {
                let array = current
                    .get(list)
                    .and_then(Value::as_array)
                    .ok_or(Error::Empty)?;
                current = &array[unique_match(array, keys)?];
            }
        }
    }
    Ok(current)
}

/// Walk `path` mutably, resolving to exactly one node.
fn resolve_mut<'v>(document: &'v mut Value, path: &Path) -> Result<&'v mut Value, Error> {
    let mut current = document;
    for step in path.steps() {
        match step {
            Step::Child(name) => {
                current = current.get_mut(name).ok_or(Error::Empty)?;
            }
            Step::Entry { list, keys } => {
                let array = current
                    .get_mut(list)
                    .and_then(Value::as_array_mut)
                    .ok_or(Error::Empty)?;
                let index = unique_match(array, keys)?;
                current = &mut array[index];
            }
        }
    }
    Ok(current)
}

/// The index of the unique element matching `keys`.
fn unique_match(array: &[Value], keys: &[KeyMatch]) -> Result<usize, Error> {
    let mut matches = array
        .iter()
        .enumerate()
        .filter(|(_, element)| keys.iter().all(|key| key.matches(element)))
        .map(|(index, _)| index);

    let index = matches.next().ok_or(Error::Empty)?;
    if matches.next().is_some() {
        return Err(Error::NotUnique);
    }
    Ok(index)
}

fn ensure(document: &mut Value, path: &Path) -> Result<(), Error> {
    let mut current = document;
    for step in path.steps() {
        // A null placeholder is instantiated by the step that descends into it.
        if current.is_null() {
            *current = Value::Object(Default::default());
        }
        match step {
            Step::Child(name) => {
                let object = current.as_object_mut().ok_or_else(|| {
                    Error::Shape(format!("cannot descend into non-object at {name:?}"))
                })?;
                current = object
                    .entry(name.clone())
                    .or_insert_with(|| Value::Object(Default::default()));
            }
            Step::Entry { list, keys } => {
                let object = current.as_object_mut().ok_or_else(|| {
                    Error::Shape(format!("cannot descend into non-object at {list:?}"))
                })?;
                let slot = object
                    .entry(list.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if slot.is_null() {
                    *slot = Value::Array(Vec::new());
                }
                let array = slot
                    .as_array_mut()
                    .ok_or_else(|| Error::Shape(format!("{list:?} is not an array")))?;

                match unique_match(array, keys) {
                    Ok(index) => current = &mut array[index],
                    // The entry does not exist: the list is in place, stop.
                    Err(Error::Empty) => return Ok(()),
                    Err(err) => return Err(err),
                }
            }
        }
    }
    Ok(())
}

/// Replace `node` with `value`, preserving the node's type: an object
/// replaced from a list payload takes the payload's single entry.
fn replace_node(node: &mut Value, value: Value) -> Result<(), Error> {
    if node.is_object() && value.is_array() {
        *node = single_list_entry(value)?;
    } else {
        *node = value;
    }
    Ok(())
}

fn single_list_entry(value: Value) -> Result<Value, Error> {
    match value {
        Value::Array(mut entries) if entries.len() == 1 => {
            Ok(entries.pop().expect("length checked above"))
        }
        _ => Err(Error::Shape(
            "list payload must contain exactly one entry".to_string(),
        )),
    }
}

/// Stamp the reserved metadata keys. Called with the store lock held, after
/// every successful mutation.
fn touch(document: &mut Value) {
    let object = document
        .as_object_mut()
        .expect("datastore root is always an object");
    object.insert(
        LAST_MODIFIED_KEY.to_string(),
        Value::String(chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
    );
    object.insert(
        ETAG_KEY.to_string(),
        Value::String(format!("\"{}\"", uuid::Uuid::new_v4())),
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn node_path(network: &str, node: &str) -> Path {
        Path::root()
            .child("ietf-network:networks")
            .entry(
                "network",
                vec![KeyMatch::new(
                    "network-id",
                    KeyValue::String(network.to_string()),
                )],
            )
            .entry(
                "node",
                vec![KeyMatch::new("node-id", KeyValue::String(node.to_string()))],
            )
    }

    fn seeded() -> Store {
        Store::with_document(json!({
            "ietf-network:networks": {
                "network": [
                    {"network-id": "n1", "node": [{"node-id": "nA", "rank": 1}]},
                ],
            },
        }))
        .unwrap()
    }

    #[test]
    fn test_put_then_get_roundtrip() {
        let store = seeded();
        let path = node_path("n1", "nA");
        let etag_before = store.etag();

        let created = store
            .put(&path, json!([{"node-id": "nA", "rank": 2}]))
            .unwrap();
        assert!(!created);

        let (value, parent_is_array) = store.get(&path).unwrap();
        assert_eq!(value, json!({"node-id": "nA", "rank": 2}));
        assert!(parent_is_array);

        let etag_after = store.etag();
        assert!(etag_after.is_some());
        assert_ne!(etag_before, etag_after);
        assert!(store.last_modified().is_some());
    }

    #[test]
    fn test_put_appends_missing_list_entry() {
        let store = seeded();
        let path = node_path("n1", "nB");

        let created = store.put(&path, json!([{"node-id": "nB"}])).unwrap();
        assert!(created);

        let (value, _) = store.get(&path).unwrap();
        assert_eq!(value, json!({"node-id": "nB"}));
    }

    #[test]
    fn test_put_missing_intermediate_entry_is_empty() {
        let store = seeded();
        let path = node_path("n9", "nA");
        assert!(matches!(
            store.put(&path, json!([{"node-id": "nA"}])),
            Err(Error::Empty),
        ));
    }

    #[test]
    fn test_post_duplicate_is_data_exists() {
        let store = seeded();
        let parent = Path::root().child("ietf-network:networks").entry(
            "network",
            vec![KeyMatch::new("network-id", KeyValue::String("n1".into()))],
        );
        let keys = vec!["node-id".to_string()];

        let appended = store
            .post(&parent, json!([{"node-id": "nB"}]), "node", &keys)
            .unwrap();
        assert_eq!(appended, "node=nB");

        assert!(matches!(
            store.post(&parent, json!([{"node-id": "nB"}]), "node", &keys),
            Err(Error::DataExists),
        ));
    }

    #[test]
    fn test_post_delete_get_is_empty() {
        let store = seeded();
        let parent = Path::root().child("ietf-network:networks").entry(
            "network",
            vec![KeyMatch::new("network-id", KeyValue::String("n1".into()))],
        );
        store
            .post(
                &parent,
                json!([{"node-id": "nC"}]),
                "node",
                &["node-id".to_string()],
            )
            .unwrap();

        let path = node_path("n1", "nC");
        store.delete(&path).unwrap();
        assert!(matches!(store.get(&path), Err(Error::Empty)));
    }

    #[test]
    fn test_post_missing_parent_is_not_found() {
        let store = seeded();
        let parent = Path::root().child("ietf-network:networks").entry(
            "network",
            vec![KeyMatch::new("network-id", KeyValue::String("n9".into()))],
        );
        assert!(matches!(
            store.post(
                &parent,
                json!([{"node-id": "nA"}]),
                "node",
                &["node-id".to_string()],
            ),
            Err(Error::KeyPathNotFound),
        ));
    }

    #[test]
    fn test_post_object_onto_null_is_not_a_conflict() {
        let store = Store::with_document(json!({"root": {"te": null}})).unwrap();
        let parent = Path::root().child("root");
        store
            .post(&parent, json!({"enabled": true}), "te", &[])
            .unwrap();
        let (value, _) = store.get(&Path::root().child("root").child("te")).unwrap();
        assert_eq!(value, json!({"enabled": true}));
    }

    #[test]
    fn test_post_object_onto_existing_conflicts() {
        let store = Store::with_document(json!({"root": {"te": {"enabled": false}}})).unwrap();
        let parent = Path::root().child("root");
        assert!(matches!(
            store.post(&parent, json!({"enabled": true}), "te", &[]),
            Err(Error::DataExists),
        ));
    }

    #[test]
    fn test_post_composite_key_append_identifier() {
        let store = Store::with_document(json!({"ex:things": {"thing": []}})).unwrap();
        let parent = Path::root().child("ex:things");
        let appended = store
            .post(
                &parent,
                json!([{"id": 42, "name": "foo,bar"}]),
                "thing",
                &["id".to_string(), "name".to_string()],
            )
            .unwrap();
        assert_eq!(appended, "thing=42,foo%2Cbar");
    }

    #[test]
    fn test_patch_is_shallow_per_key() {
        let store = Store::with_document(json!({
            "config": {"kept": 1, "replaced": {"deep": true}},
        }))
        .unwrap();
        let path = Path::root().child("config");
        let etag_before = store.etag();

        store
            .patch(&path, json!({"replaced": {"other": 2}, "added": "x"}))
            .unwrap();

        let (value, _) = store.get(&path).unwrap();
        // `kept` is preserved, `replaced` is overwritten wholesale (no deep
        // merge), `added` is new.
        assert_eq!(
            value,
            json!({"kept": 1, "replaced": {"other": 2}, "added": "x"}),
        );
        assert_ne!(store.etag(), etag_before);
    }

    #[test]
    fn test_patch_missing_target_is_not_found() {
        let store = seeded();
        assert!(matches!(
            store.patch(&node_path("n1", "nZ"), json!([{"rank": 9}])),
            Err(Error::KeyPathNotFound),
        ));
    }

    #[test]
    fn test_numeric_key_matches_either_storage_form() {
        let store = Store::with_document(json!({
            "things": {"thing": [{"id": "42", "name": "stored-as-string"}]},
            "others": {"thing": [{"id": 42, "name": "stored-as-number"}]},
        }))
        .unwrap();

        for root in ["things", "others"] {
            let path = Path::root().child(root).entry(
                "thing",
                vec![KeyMatch::new("id", KeyValue::Integer(42))],
            );
            let (value, _) = store.get(&path).unwrap();
            assert!(value.get("name").is_some(), "no match under {root}");
        }
    }

    #[test]
    fn test_duplicate_key_tuple_is_not_unique() {
        let store = Store::with_document(json!({
            "things": {"thing": [{"id": 1}, {"id": 1}]},
        }))
        .unwrap();
        let path = Path::root()
            .child("things")
            .entry("thing", vec![KeyMatch::new("id", KeyValue::Integer(1))]);
        assert!(matches!(store.get(&path), Err(Error::NotUnique)));
    }

    #[test]
    fn test_ensure_path_stops_at_missing_entry() {
        let store = Store::new();
        let path = node_path("n1", "nA");
        store.ensure_path(&path).unwrap();

        // The intermediate objects and the `network` array exist, but no
        // element was invented for network=n1.
        let (networks, _) = store
            .get(&Path::root().child("ietf-network:networks"))
            .unwrap();
        assert_eq!(networks, json!({"network": []}));
    }

    #[test]
    fn test_etags_are_unique_across_mutations() {
        let store = seeded();
        let path = Path::root().child("config");
        let mut etags = std::collections::HashSet::new();

        for round in 0..10 {
            store.put(&path, json!({"round": round})).unwrap();
            etags.insert(store.etag().unwrap());
        }
        assert_eq!(etags.len(), 10);
    }

    #[test]
    fn test_save_and_load_preserve_key_order() {
        let store = Store::with_document(json!({
            "zebra": 1,
            "apple": 2,
            "mango": {"z": 1, "a": 2},
        }))
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("database.json");
        store.save(&file).unwrap();

        let reloaded = Store::load(&file).unwrap();
        assert_eq!(
            serde_json::to_string(&reloaded.document()).unwrap(),
            serde_json::to_string(&store.document()).unwrap(),
        );
    }

    #[test]
    fn test_load_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.document(), json!({}));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let store = seeded();
        assert!(matches!(
            store.delete(&node_path("n1", "nZ")),
            Err(Error::KeyPathNotFound),
        ));
    }
}
