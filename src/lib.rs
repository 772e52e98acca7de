//! Bridges RSS/Atom/JSON feeds into signed-message identities.
//!
//! A feed URL is negotiated to its canonical feed URL ([`feed::FeedNegotiator`]),
//! fetched and parsed once per process ([`feed::FeedCache`]), given a
//! deterministic key pair ([`identity::derive`]) and rendered as unsigned
//! profile and note events ([`events`]). [`bridge::Bridge`] wires these together
//! with the optional [`storage`] feed registry.

pub mod bridge;
pub mod config;
pub mod events;
pub mod feed;
pub mod identity;
pub mod storage;
pub mod util;
