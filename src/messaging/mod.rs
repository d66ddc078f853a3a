//! Message Delivery and Fan-out

pub mod fanout;
pub mod service;

pub use fanout::Fanout;
pub use service::{MessageService, NewMessage};
