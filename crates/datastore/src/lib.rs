//! The in-memory datastore behind the RESTCONF mock: a JSON document
//! manipulated through path expressions with list-key predicates, plus the
//! `@@last-modified` / `@@etag` metadata RESTCONF responses are built from.

pub mod path;
pub mod store;

pub use path::{KeyMatch, KeyValue, Path, Step};
pub use store::{Error, Store};

/// Reserved top-level key holding the RFC 1123 timestamp of the last mutation.
pub const LAST_MODIFIED_KEY: &str = "@@last-modified";
/// Reserved top-level key holding the quoted-UUID entity tag of the document.
pub const ETAG_KEY: &str = "@@etag";
