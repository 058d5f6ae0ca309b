//! The yang-push notification envelope delivered over SSE streams.

use serde::Serialize;

/// The edit operation carried by a yang-patch edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for EditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EditOperation::Create => "create",
            EditOperation::Update => "update",
            EditOperation::Delete => "delete",
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Notification {
    #[serde(rename = "ietf-restconf:notification")]
    pub notification: NotificationBody,
}

#[derive(Debug, Serialize)]
pub struct NotificationBody {
    #[serde(rename = "eventTime")]
    pub event_time: String,
    #[serde(rename = "ietf-yang-push:push-change-update")]
    pub push_change_update: PushChangeUpdate,
}

#[derive(Debug, Serialize)]
pub struct PushChangeUpdate {
    #[serde(rename = "subscription-id")]
    pub subscription_id: u32,
    #[serde(rename = "datastore-changes")]
    pub datastore_changes: DatastoreChanges,
}

#[derive(Debug, Serialize)]
pub struct DatastoreChanges {
    #[serde(rename = "ietf-yang-patch:yang-patch")]
    pub yang_patch: YangPatch,
}

#[derive(Debug, Serialize)]
pub struct YangPatch {
    #[serde(rename = "patch-id")]
    pub patch_id: String,
    pub edit: Vec<Edit>,
}

#[derive(Debug, Serialize)]
pub struct Edit {
    #[serde(rename = "edit-id")]
    pub edit_id: String,
    pub operation: EditOperation,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Notification {
    /// Assemble a single-edit push-change-update for `subscription_id`.
    /// The event time is stamped now, in UTC with millisecond precision.
    pub fn push_change_update(
        subscription_id: u32,
        operation: EditOperation,
        target: impl Into<String>,
        value: Option<serde_json::Value>,
    ) -> Notification {
        Notification {
            notification: NotificationBody {
                event_time: chrono::Utc::now()
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                push_change_update: PushChangeUpdate {
                    subscription_id,
                    datastore_changes: DatastoreChanges {
                        yang_patch: YangPatch {
                            patch_id: uuid::Uuid::new_v4().to_string(),
                            edit: vec![Edit {
                                edit_id: "0".to_string(),
                                operation,
                                target: target.into(),
                                value,
                            }],
                        },
                    },
                },
            },
        }
    }
}
