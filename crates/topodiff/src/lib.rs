//! Compares two snapshots of the topology datastore and emits one change
//! event per keyed entry that was created, updated, or deleted.
//!
//! The walk is YANG-topology-aware: networks are matched by `network-id`,
//! and within each matched pair the node, termination-point,
//! tunnel-termination-point, and link collections are compared by their
//! respective key leaves. A malformed entry (one whose key leaf is missing
//! or non-scalar) halts the walk of the collection it appears in; other
//! collections are unaffected.

use restconf::{EditOperation, ObjectType};
use serde_json::Value;

const NETWORKS: &str = "ietf-network:networks";
const TERMINATION_POINT: &str = "ietf-network-topology:termination-point";
const TE: &str = "ietf-te-topology:te";
const TUNNEL_TERMINATION_POINT: &str = "tunnel-termination-point";
const LINK: &str = "ietf-network-topology:link";

/// One detected change, tagged with the object type and the positional id
/// tuple needed to rebuild the RESTCONF target URL. `value` holds the
/// current snapshot's entry for creates and updates, and is None for
/// deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub object_type: ObjectType,
    pub operation: EditOperation,
    pub ids: Vec<String>,
    pub value: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
enum WalkError {
    #[error("entry {index} has no usable key leaf {key:?}")]
    BadKey { index: usize, key: String },
}

/// Diff `prior` against `current`, producing all change events.
pub fn diff(prior: &Value, current: &Value) -> Vec<ChangeEvent> {
    let mut out = Vec::new();

    let prior_networks = collection(prior.get(NETWORKS), "network");
    let current_networks = collection(current.get(NETWORKS), "network");

    for prior_network in prior_networks {
        let network_id = match entry_id(prior_network, "network-id") {
            Some(id) => id,
            None => {
                tracing::error!("prior network entry has no network-id, halting network walk");
                break;
            }
        };
        // Only networks present in both snapshots are compared.
        let Some(current_network) = current_networks.iter().find(|network| {
            entry_id(network, "network-id").as_deref() == Some(network_id.as_str())
        }) else {
            continue;
        };

        diff_nodes(&mut out, prior_network, current_network, &network_id);

        if let Err(error) = diff_collection(
            &mut out,
            ObjectType::Link,
            collection(Some(prior_network), LINK),
            collection(Some(current_network), LINK),
            "link-id",
            &[network_id.clone()],
        ) {
            tracing::error!(%error, %network_id, "halting link comparison");
        }
    }

    out
}

/// Compare the node collections of one matched network pair, including each
/// matched node's termination points and tunnel termination points.
fn diff_nodes(out: &mut Vec<ChangeEvent>, prior_network: &Value, current_network: &Value, network_id: &str) {
    let prior_nodes = collection(Some(prior_network), "node");
    let current_nodes = collection(Some(current_network), "node");

    let pairing = match pair_by_key(prior_nodes, current_nodes, "node-id") {
        Ok(pairing) => pairing,
        Err(error) => {
            tracing::error!(%error, network_id, "halting node comparison");
            return;
        }
    };

    for (node_id, _) in &pairing.deleted {
        out.push(ChangeEvent {
            object_type: ObjectType::Node,
            operation: EditOperation::Delete,
            ids: vec![network_id.to_string(), node_id.clone()],
            value: None,
        });
    }

    for (node_id, prior_node, current_node) in &pairing.matched {
        let node_ids = [network_id.to_string(), node_id.clone()];

        if let Err(error) = diff_collection(
            out,
            ObjectType::TerminationPoint,
            collection(Some(prior_node), TERMINATION_POINT),
            collection(Some(current_node), TERMINATION_POINT),
            "tp-id",
            &node_ids,
        ) {
            tracing::error!(%error, network_id, %node_id, "halting termination-point comparison");
        }

        if let Err(error) = diff_collection(
            out,
            ObjectType::TunnelTerminationPoint,
            collection(prior_node.get(TE), TUNNEL_TERMINATION_POINT),
            collection(current_node.get(TE), TUNNEL_TERMINATION_POINT),
            "tunnel-tp-id",
            &node_ids,
        ) {
            tracing::error!(
                %error, network_id, %node_id,
                "halting tunnel-termination-point comparison",
            );
        }

        // tp/ttp differences were already reported above; the node itself is
        // updated only if it differs with them excised.
        if excise_endpoints(prior_node) != excise_endpoints(current_node) {
            out.push(ChangeEvent {
                object_type: ObjectType::Node,
                operation: EditOperation::Update,
                ids: node_ids.to_vec(),
                value: Some((*current_node).clone()),
            });
        }
    }

    for (node_id, current_node) in &pairing.created {
        out.push(ChangeEvent {
            object_type: ObjectType::Node,
            operation: EditOperation::Create,
            ids: vec![network_id.to_string(), node_id.clone()],
            value: Some((*current_node).clone()),
        });
    }
}

/// Compare one flat keyed collection, emitting deletes and updates in prior
/// order and then creates in current order.
fn diff_collection(
    out: &mut Vec<ChangeEvent>,
    object_type: ObjectType,
    prior: &[Value],
    current: &[Value],
    key: &str,
    base_ids: &[String],
) -> Result<(), WalkError> {
    let pairing = pair_by_key(prior, current, key)?;

    let with_id = |id: &str| {
        let mut ids = base_ids.to_vec();
        ids.push(id.to_string());
        ids
    };

    for (id, _) in &pairing.deleted {
        out.push(ChangeEvent {
            object_type,
            operation: EditOperation::Delete,
            ids: with_id(id),
            value: None,
        });
    }
    for (id, prior_entry, current_entry) in &pairing.matched {
        if prior_entry != current_entry {
            out.push(ChangeEvent {
                object_type,
                operation: EditOperation::Update,
                ids: with_id(id),
                value: Some((*current_entry).clone()),
            });
        }
    }
    for (id, current_entry) in &pairing.created {
        out.push(ChangeEvent {
            object_type,
            operation: EditOperation::Create,
            ids: with_id(id),
            value: Some((*current_entry).clone()),
        });
    }
    Ok(())
}

struct Pairing<'v> {
    /// Prior-order entries absent from current.
    deleted: Vec<(String, &'v Value)>,
    /// Prior-order entries present in both snapshots.
    matched: Vec<(String, &'v Value, &'v Value)>,
    /// Current-order entries absent from prior.
    created: Vec<(String, &'v Value)>,
}

fn pair_by_key<'v>(
    prior: &'v [Value],
    current: &'v [Value],
    key: &str,
) -> Result<Pairing<'v>, WalkError> {
    let prior_ids = keyed(prior, key)?;
    let current_ids = keyed(current, key)?;

    let mut pairing = Pairing {
        deleted: Vec::new(),
        matched: Vec::new(),
        created: Vec::new(),
    };

    for (id, prior_entry) in &prior_ids {
        match current_ids.iter().find(|(current_id, _)| current_id == id) {
            Some((_, current_entry)) => {
                pairing
                    .matched
                    .push((id.clone(), *prior_entry, *current_entry))
            }
            None => pairing.deleted.push((id.clone(), *prior_entry)),
        }
    }
    for (id, current_entry) in &current_ids {
        if !prior_ids.iter().any(|(prior_id, _)| prior_id == id) {
            pairing.created.push((id.clone(), *current_entry));
        }
    }
    Ok(pairing)
}

fn keyed<'v>(entries: &'v [Value], key: &str) -> Result<Vec<(String, &'v Value)>, WalkError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            entry_id(entry, key)
                .map(|id| (id, entry))
                .ok_or_else(|| WalkError::BadKey {
                    index,
                    key: key.to_string(),
                })
        })
        .collect()
}

/// The string form of an entry's key leaf, or None if missing or non-scalar.
fn entry_id(entry: &Value, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn collection<'v>(parent: Option<&'v Value>, key: &str) -> &'v [Value] {
    parent
        .and_then(|parent| parent.get(key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// A copy of the node with its termination-point and
/// tunnel-termination-point collections removed.
fn excise_endpoints(node: &Value) -> Value {
    let mut node = node.clone();
    if let Some(object) = node.as_object_mut() {
        object.shift_remove(TERMINATION_POINT);
        if let Some(te) = object.get_mut(TE).and_then(Value::as_object_mut) {
            te.shift_remove(TUNNEL_TERMINATION_POINT);
        }
    }
    node
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn snapshot(networks: Value) -> Value {
        json!({"ietf-network:networks": {"network": networks}})
    }

    fn summary(events: &[ChangeEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| {
                format!(
                    "{} {} {}",
                    event.object_type,
                    event.operation,
                    event.ids.join("/"),
                )
            })
            .collect()
    }

    #[test]
    fn test_identical_snapshots_produce_no_events() {
        let doc = snapshot(json!([
            {
                "network-id": "n1",
                "node": [
                    {
                        "node-id": "nA",
                        "ietf-network-topology:termination-point": [{"tp-id": "tp0"}],
                        "ietf-te-topology:te": {
                            "tunnel-termination-point": [{"tunnel-tp-id": "ttp0"}],
                        },
                    },
                ],
                "ietf-network-topology:link": [{"link-id": "l1"}],
            },
        ]));
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_node_create_carries_full_value() {
        let prior = snapshot(json!([
            {"network-id": "n1", "node": [{"node-id": "nA"}]},
        ]));
        let current = snapshot(json!([
            {"network-id": "n1", "node": [{"node-id": "nA"}, {"node-id": "nC", "rank": 3}]},
        ]));

        let events = diff(&prior, &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].object_type, ObjectType::Node);
        assert_eq!(events[0].operation, EditOperation::Create);
        assert_eq!(events[0].ids, vec!["n1", "nC"]);
        assert_eq!(events[0].value, Some(json!({"node-id": "nC", "rank": 3})));
    }

    #[test]
    fn test_event_order_within_topic() {
        // Deletes and updates follow the prior snapshot's iteration order,
        // then creates follow the current snapshot's order.
        let prior = snapshot(json!([
            {"network-id": "n1", "node": [
                {"node-id": "a"},
                {"node-id": "b"},
                {"node-id": "c", "rank": 1},
            ]},
        ]));
        let current = snapshot(json!([
            {"network-id": "n1", "node": [
                {"node-id": "e"},
                {"node-id": "c", "rank": 2},
                {"node-id": "d"},
            ]},
        ]));

        insta::assert_debug_snapshot!(summary(&diff(&prior, &current)), @r###"
        [
            "NODE delete n1/a",
            "NODE delete n1/b",
            "NODE update n1/c",
            "NODE create n1/e",
            "NODE create n1/d",
        ]
        "###);
    }

    #[test]
    fn test_tp_change_does_not_update_node() {
        let prior = snapshot(json!([
            {"network-id": "n1", "node": [
                {
                    "node-id": "nA",
                    "ietf-network-topology:termination-point": [{"tp-id": "tp0", "up": true}],
                },
            ]},
        ]));
        let current = snapshot(json!([
            {"network-id": "n1", "node": [
                {
                    "node-id": "nA",
                    "ietf-network-topology:termination-point": [
                        {"tp-id": "tp0", "up": false},
                        {"tp-id": "tp1"},
                    ],
                },
            ]},
        ]));

        insta::assert_debug_snapshot!(summary(&diff(&prior, &current)), @r###"
        [
            "TP update n1/nA/tp0",
            "TP create n1/nA/tp1",
        ]
        "###);
    }

    #[test]
    fn test_ttp_events_and_node_update() {
        let prior = snapshot(json!([
            {"network-id": "n1", "node": [
                {
                    "node-id": "nA",
                    "rank": 1,
                    "ietf-te-topology:te": {
                        "te-node-id": "1.1.1.1",
                        "tunnel-termination-point": [{"tunnel-tp-id": "ttp0"}],
                    },
                },
            ]},
        ]));
        let current = snapshot(json!([
            {"network-id": "n1", "node": [
                {
                    "node-id": "nA",
                    "rank": 2,
                    "ietf-te-topology:te": {
                        "te-node-id": "1.1.1.1",
                        "tunnel-termination-point": [],
                    },
                },
            ]},
        ]));

        // The ttp delete is its own event; the rank change still marks the
        // node updated after excision.
        insta::assert_debug_snapshot!(summary(&diff(&prior, &current)), @r###"
        [
            "TTP delete n1/nA/ttp0",
            "NODE update n1/nA",
        ]
        "###);
    }

    #[test]
    fn test_link_events() {
        let prior = snapshot(json!([
            {"network-id": "n1", "ietf-network-topology:link": [
                {"link-id": "l1", "source": "a"},
            ]},
        ]));
        let current = snapshot(json!([
            {"network-id": "n1", "ietf-network-topology:link": [
                {"link-id": "l1", "source": "b"},
                {"link-id": "l2"},
            ]},
        ]));

        insta::assert_debug_snapshot!(summary(&diff(&prior, &current)), @r###"
        [
            "LINK update n1/l1",
            "LINK create n1/l2",
        ]
        "###);
    }

    #[test]
    fn test_unmatched_networks_are_skipped() {
        let prior = snapshot(json!([
            {"network-id": "gone", "node": [{"node-id": "nA"}]},
        ]));
        let current = snapshot(json!([
            {"network-id": "new", "node": [{"node-id": "nB"}]},
        ]));
        assert!(diff(&prior, &current).is_empty());
    }

    #[test]
    fn test_bad_key_halts_only_its_topic() {
        let prior = snapshot(json!([
            {
                "network-id": "n1",
                "node": [{"node-id": "nA"}, {"rank": 2}],
                "ietf-network-topology:link": [{"link-id": "l1"}],
            },
        ]));
        let current = snapshot(json!([
            {
                "network-id": "n1",
                "node": [],
                "ietf-network-topology:link": [],
            },
        ]));

        // The malformed node entry suppresses the node topic entirely, but
        // the link topic still reports its delete.
        insta::assert_debug_snapshot!(summary(&diff(&prior, &current)), @r###"
        [
            "LINK delete n1/l1",
        ]
        "###);
    }
}
