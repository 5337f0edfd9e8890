pub mod catalog;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod notification;
pub mod promotion;
pub mod subscription;

pub use config::AppConfig;
pub use error::{StorefrontError, StorefrontResult};
