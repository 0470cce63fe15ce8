//! Wire messages exchanged between peers
//!
//! Values travel between peers as length-delimited, field-tagged protobuf
//! messages. The schema is:
//!
//! ```protobuf
//! message GetRequest {
//!   string group = 1;
//!   string key = 2;
//! }
//!
//! message GetResponse {
//!   bytes value = 1;
//!   optional double minute_qps = 2;
//!   // field 3 reserved for expiry
//! }
//! ```

use bytes::Bytes;
use prost::Message;

/// Request for one key, addressed to the key's owning peer
#[derive(Clone, PartialEq, Message)]
pub struct GetRequest {
    /// Name of the group the key belongs to
    #[prost(string, tag = "1")]
    pub group: String,

    /// The key being fetched
    #[prost(string, tag = "2")]
    pub key: String,
}

/// Response carrying the value for one key
#[derive(Clone, PartialEq, Message)]
pub struct GetResponse {
    /// The value bytes
    #[prost(bytes = "bytes", tag = "1")]
    pub value: Bytes,

    /// Requests per minute observed by the owner for this key, when the
    /// owner reports it
    #[prost(double, optional, tag = "2")]
    pub minute_qps: Option<f64>,
    // Field 3 is reserved for entry expiry.
}
