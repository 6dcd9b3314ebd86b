pub mod contacts;
pub mod conversations;
pub mod database;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod receipts;
pub mod refresh_tokens;
pub mod users;

mod error;
mod rows;

#[cfg(test)]
pub(crate) mod testutil;

pub use database::Database;
pub use error::StoreError;
pub use models::*;

pub type Result<T> = std::result::Result<T, StoreError>;
