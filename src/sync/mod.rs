pub mod leaderboard;
pub mod listeners;
pub mod notification;

pub use leaderboard::{LeaderboardSync, LeaderboardUpdate};
pub use listeners::{ListenerSet, Subscription};
pub use notification::{NotificationDelays, NotificationSync};
