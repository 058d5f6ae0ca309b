//! Request and response bodies of the ietf-subscribed-notifications
//! operations.

use super::ObjectType;
use serde::{Deserialize, Serialize};

/// The only notification encoding this server can produce.
pub const ENCODE_JSON: &str = "ietf-subscribed-notifications:encode-json";

pub const TOPIC_RESOURCES: &str = "resources";
pub const TOPIC_SERVICES: &str = "services";

#[derive(Debug, Deserialize)]
pub struct EstablishSubscriptionRequest {
    #[serde(rename = "ietf-subscribed-notifications:input")]
    pub input: EstablishSubscriptionInput,
}

#[derive(Debug, Deserialize)]
pub struct EstablishSubscriptionInput {
    #[serde(default)]
    pub encoding: String,
    pub subscriptions: SubscriptionSet,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionSet {
    pub subscription: Vec<Subscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub topic: String,
    #[serde(rename = "object-type-info")]
    pub object_type_info: ObjectType,
}

#[derive(Debug, Serialize)]
pub struct EstablishSubscriptionResponse {
    #[serde(rename = "ietf-subscribed-notifications:output")]
    pub output: EstablishSubscriptionOutput,
}

#[derive(Debug, Serialize)]
pub struct EstablishSubscriptionOutput {
    pub id: u32,
}

impl EstablishSubscriptionResponse {
    pub fn new(id: u32) -> EstablishSubscriptionResponse {
        EstablishSubscriptionResponse {
            output: EstablishSubscriptionOutput { id },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteSubscriptionRequest {
    #[serde(rename = "ietf-subscribed-notifications:input")]
    pub input: DeleteSubscriptionInput,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSubscriptionInput {
    pub id: u32,
}
