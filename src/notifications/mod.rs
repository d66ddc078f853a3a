//! Per-User Notifications

pub mod service;

pub use service::NotificationService;
