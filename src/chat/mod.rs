//! Chat Membership and Roles

pub mod service;

pub use service::ChatService;
