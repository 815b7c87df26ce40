pub mod cache;
pub mod db;
pub mod generator;
pub mod memory;

pub use db::DbAdapter;
pub use generator::OpenAiCardGenerator;
pub use memory::{InMemoryRateLimiter, InMemorySessionStore, InMemoryStorage};
