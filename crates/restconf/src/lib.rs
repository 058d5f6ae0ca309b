//! The RESTCONF wire vocabulary shared by the request pipeline and the
//! subscription machinery: error envelopes, object-type filters with their
//! notification target URLs, subscription operation bodies, yang-push
//! notifications, and the compiler from RESTCONF URL paths to datastore path
//! expressions.

pub mod compile;
pub mod errors;
pub mod notification;
pub mod object_type;
pub mod subscription;

pub use compile::{compile, CompileError};
pub use errors::{ErrorType, Errors, RestconfError};
pub use notification::{Edit, EditOperation, Notification};
pub use object_type::ObjectType;
pub use subscription::{
    DeleteSubscriptionRequest, EstablishSubscriptionRequest, EstablishSubscriptionResponse,
    Subscription, ENCODE_JSON,
};

/// The media type of every RESTCONF request and response body.
pub const YANG_DATA_JSON: &str = "application/yang-data+json; charset=UTF-8";
