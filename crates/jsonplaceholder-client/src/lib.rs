//! JSONPlaceholder Client
//!
//! Fetches posts and per-post comments from a JSONPlaceholder-style
//! collection service, caches them with a TTL and exposes live, debounced
//! search over the cached collections.

mod client;
mod error;
mod feed;
mod types;

pub use client::{AllPosts, JsonPlaceholderClient, PostComments};
pub use error::{PlaceholderError, Result};
pub use feed::SocialFeed;
pub use types::{Comment, Post};
