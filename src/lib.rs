pub mod cache;
pub mod clock;
pub mod config;
pub mod error;

pub use cache::MusicCache;
pub use config::CacheConfig;
pub use error::CacheError;
