#![warn(clippy::unwrap_used)]

pub mod flash_sale;

pub use flash_sale::{FlashSaleScheduler, FlashSaleTickReport};
