pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod hiring;
pub mod outbox;

pub use db::Store;
pub use error::{Entity, HiringError};
pub use hiring::Hiring;
