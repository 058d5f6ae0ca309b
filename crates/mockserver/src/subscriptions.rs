//! The subscription center: allocates subscription ids, remembers which
//! object types each subscription listens for, owns the SSE brokers, and
//! fans change notifications out to every matching connection.

use crate::sse::{Broker, ClientConn};
use anyhow::Context;
use restconf::{EditOperation, Notification, ObjectType, Subscription};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub struct SubscriptionCenter {
    counter: AtomicU32,
    inner: Mutex<Inner>,
    sidecar: PathBuf,
}

struct Inner {
    subscriptions: BTreeMap<u32, BTreeSet<ObjectType>>,
    brokers: HashMap<u32, Arc<Broker>>,
}

/// The on-disk shape of `subscriptions.json`.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    #[serde(rename = "Counter")]
    counter: u32,
    #[serde(rename = "Subscriptions")]
    subscriptions: BTreeMap<String, BTreeSet<ObjectType>>,
}

impl SubscriptionCenter {
    /// Restore the subscription table from its sidecar file; a missing file
    /// yields an empty center. Open connections never survive a restart.
    pub fn load(sidecar: PathBuf) -> anyhow::Result<SubscriptionCenter> {
        let (counter, subscriptions) = match std::fs::read(&sidecar) {
            Ok(bytes) => {
                let persisted: Sidecar = serde_json::from_slice(&bytes)
                    .with_context(|| format!("failed to parse {:?}", sidecar))?;
                let subscriptions = persisted
                    .subscriptions
                    .into_iter()
                    .map(|(id, types)| {
                        let id = id
                            .parse::<u32>()
                            .with_context(|| format!("bad subscription id {id:?}"))?;
                        Ok((id, types))
                    })
                    .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
                (persisted.counter, subscriptions)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => (0, BTreeMap::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {:?}", sidecar))
            }
        };

        Ok(SubscriptionCenter {
            counter: AtomicU32::new(counter),
            inner: Mutex::new(Inner {
                subscriptions,
                brokers: HashMap::new(),
            }),
            sidecar,
        })
    }

    /// Allocate a subscription over the deduplicated set of requested
    /// object types. Ids are strictly increasing and never reused within a
    /// process lifetime.
    pub fn subscribe(&self, subscriptions: &[Subscription]) -> anyhow::Result<u32> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let object_types: BTreeSet<ObjectType> = subscriptions
            .iter()
            .map(|subscription| subscription.object_type_info)
            .collect();

        let mut inner = self.lock();
        inner.subscriptions.insert(id, object_types);
        inner.brokers.insert(id, Broker::new());
        self.persist(&inner)?;
        Ok(id)
    }

    /// The object-type set of `id`, if it exists.
    pub fn get(&self, id: u32) -> Option<BTreeSet<ObjectType>> {
        self.lock().subscriptions.get(&id).cloned()
    }

    /// Remove a subscription and close its broker. Returns false when the
    /// id is unknown.
    pub fn delete(&self, id: u32) -> anyhow::Result<bool> {
        let mut inner = self.lock();
        if inner.subscriptions.remove(&id).is_none() {
            return Ok(false);
        }
        if let Some(broker) = inner.brokers.remove(&id) {
            broker.close();
        }
        self.persist(&inner)?;
        Ok(true)
    }

    /// Open a new SSE client connection on subscription `id`, or None when
    /// the id is unknown. The broker is allocated lazily: a restored
    /// subscription gets one on its first connection.
    pub fn connect(&self, id: u32) -> Option<ClientConn> {
        let mut inner = self.lock();
        if !inner.subscriptions.contains_key(&id) {
            return None;
        }
        let broker = inner.brokers.entry(id).or_insert_with(Broker::new).clone();
        Some(broker.subscribe())
    }

    /// Fan one change event out to every subscription listening for its
    /// object type. Each subscription's notification is serialized once and
    /// shared across its connections. Returns the number of connections
    /// written to.
    pub fn send_all(
        &self,
        object_type: ObjectType,
        operation: EditOperation,
        ids: &[String],
        value: Option<serde_json::Value>,
    ) -> usize {
        let Some(target) = object_type.target_url(ids) else {
            tracing::error!(%object_type, ?ids, "no notification target for object type");
            return 0;
        };

        // Collect receivers under the lock, write to sockets outside it.
        let recipients: Vec<(u32, Arc<Broker>)> = {
            let inner = self.lock();
            inner
                .subscriptions
                .iter()
                .filter(|(_, object_types)| object_types.contains(&object_type))
                .filter_map(|(id, _)| {
                    inner.brokers.get(id).map(|broker| (*id, broker.clone()))
                })
                .collect()
        };

        let mut delivered = 0;
        for (id, broker) in recipients {
            let notification =
                Notification::push_change_update(id, operation, target.clone(), value.clone());
            let payload: Arc<str> = match serde_json::to_string(&notification) {
                Ok(payload) => Arc::from(payload),
                Err(error) => {
                    tracing::error!(?error, "failed to serialize notification");
                    continue;
                }
            };
            delivered += broker.publish(&payload);
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("subscription lock poisoned")
    }

    /// Write the sidecar file. Called synchronously under the table lock.
    fn persist(&self, inner: &Inner) -> anyhow::Result<()> {
        let sidecar = Sidecar {
            counter: self.counter.load(Ordering::SeqCst),
            subscriptions: inner
                .subscriptions
                .iter()
                .map(|(id, types)| (id.to_string(), types.clone()))
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&sidecar)?;
        std::fs::write(&self.sidecar, bytes)
            .with_context(|| format!("failed to persist {:?}", self.sidecar))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn subscription(object_type: &str) -> Subscription {
        serde_json::from_value(json!({
            "topic": "resources",
            "object-type-info": object_type,
        }))
        .unwrap()
    }

    fn center(dir: &tempfile::TempDir) -> SubscriptionCenter {
        SubscriptionCenter::load(dir.path().join("subscriptions.json")).unwrap()
    }

    #[test]
    fn test_ids_are_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let center = center(&dir);

        let first = center.subscribe(&[subscription("NODE")]).unwrap();
        let second = center.subscribe(&[subscription("LINK")]).unwrap();
        assert_eq!((first, second), (1, 2));

        // Deleting does not free the id for reuse.
        assert!(center.delete(second).unwrap());
        let third = center.subscribe(&[subscription("TP")]).unwrap();
        assert_eq!(third, 3);
    }

    #[test]
    fn test_object_types_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let center = center(&dir);
        let id = center
            .subscribe(&[
                subscription("NODE"),
                subscription("NODE"),
                subscription("LINK"),
            ])
            .unwrap();

        let types = center.get(id).unwrap();
        assert_eq!(types.len(), 2);
        assert!(types.contains(&ObjectType::Node));
        assert!(types.contains(&ObjectType::Link));
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let center = center(&dir);
            center.subscribe(&[subscription("NODE")]).unwrap();
            center.subscribe(&[subscription("TTP")]).unwrap();
        }

        let raw: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("subscriptions.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["Counter"], 2);
        assert_eq!(raw["Subscriptions"]["1"], json!(["NODE"]));

        // The table (and the counter) survive a restart.
        let restored = center(&dir);
        assert_eq!(restored.get(1).unwrap().len(), 1);
        let next = restored.subscribe(&[subscription("LINK")]).unwrap();
        assert_eq!(next, 3);
    }

    #[test]
    fn test_delete_unknown_is_false() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!center(&dir).delete(9999).unwrap());
    }

    #[tokio::test]
    async fn test_send_all_reaches_matching_subscriptions_only() {
        let dir = tempfile::tempdir().unwrap();
        let center = center(&dir);

        let node_sub = center.subscribe(&[subscription("NODE")]).unwrap();
        let link_sub = center.subscribe(&[subscription("LINK")]).unwrap();

        let mut node_conn = center.connect(node_sub).unwrap();
        let mut link_conn = center.connect(link_sub).unwrap();

        let delivered = center.send_all(
            ObjectType::Node,
            EditOperation::Create,
            &["n1".to_string(), "nC".to_string()],
            Some(json!({"node-id": "nC"})),
        );
        assert_eq!(delivered, 1);

        let payload = node_conn.recv().await.unwrap();
        let notification: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let update =
            &notification["ietf-restconf:notification"]["ietf-yang-push:push-change-update"];
        assert_eq!(update["subscription-id"], node_sub);

        let edit = &update["datastore-changes"]["ietf-yang-patch:yang-patch"]["edit"][0];
        assert_eq!(edit["operation"], "create");
        assert_eq!(
            edit["target"],
            "/restconf/data/ietf-network:networks/network=n1/node=nC",
        );

        // The LINK subscriber saw nothing.
        drop(center);
        assert_eq!(link_conn.recv().await, None);
    }

    #[test]
    fn test_connect_unknown_subscription() {
        let dir = tempfile::tempdir().unwrap();
        assert!(center(&dir).connect(42).is_none());
    }
}
