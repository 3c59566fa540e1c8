//! `relay -> client` messages understood by the pool.
//!
//!  - `["EVENT", subscription_id, event_JSON]`: an event matching a subscription.
//!  - `["EOSE", subscription_id]`: end of stored events for a subscription.
//!  - `["NOTICE", message]`: human readable message.
//!  - `["OK", event_id, accepted, message]`: answer to a published event.

pub mod eose;
pub mod event;
pub mod notice;
pub mod ok;
