pub mod auth;
pub mod error;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod sessions;
