pub mod api;
pub mod broadcast;
pub mod handlers;
pub mod leaderboard;
pub mod listener;
pub mod store;
