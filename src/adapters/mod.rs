//! External resource adapters
//!
//! One adapter per external system. Each exposes an idempotent `ensure`
//! (get-or-create) and, where the controller cleans up, a `delete` that
//! treats an absent object as success.

mod notification;
mod relay;
mod topic;

pub use notification::{NotificationAdapter, NotificationTarget};
pub use relay::{make_relay, KubeRelayApi, RelayAdapter, RelayApi};
pub use topic::{generate_topic_id, TopicAdapter, TOPIC_PREFIX};
