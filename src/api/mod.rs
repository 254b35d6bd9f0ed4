pub mod client;
pub mod source;

pub use client::PortalClient;
pub use source::{ApiError, LeaderboardFetch, PortalSource};
