//! Outbound HTTP: the like-action API and the link shortener.

pub mod like_api;
pub mod shortener;

pub use like_api::LikeApiClient;
pub use shortener::ShortenerClient;
