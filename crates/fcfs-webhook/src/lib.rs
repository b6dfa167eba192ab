//! Signed webhook delivery: the HTTP adapter between the outbox dispatcher
//! and the integration target, plus the signature scheme receivers verify.

pub mod client;
pub mod signing;

pub use client::{classify_status, DeliveryOutcome, WebhookClient};
pub use signing::{sign, verify, REPLAY_WINDOW_SECS, SIGNATURE_PREFIX};
