//! WebSocket module for feed connection management

mod client;
mod manager;
mod state;

pub use client::FeedClient;
pub use manager::ConnectionManager;
pub use state::ConnectionState;
