//! The `client -> relay` messages this client sends.
//!
//!  - `["EVENT", event_JSON]`: publishes a comment.
//!  - `["REQ", subscription_id, filters_JSON...]`: requests stored comments
//!    and subscribes to new ones. Multiple filters are `||` conditions.
//!  - `["CLOSE", subscription_id]`: stops a previous subscription.

pub mod close;
pub mod event;
pub mod request;
