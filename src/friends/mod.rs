//! Friend Graph and Block Lists

pub mod service;

pub use service::FriendService;
