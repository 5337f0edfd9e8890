//! Customer-facing delivery channels: browser web push and in-app
//! notification messages.

pub mod messages;
pub mod web_push;

pub use web_push::{broadcast, PushGateway, RecordingPushGateway, WebPushProvider};
