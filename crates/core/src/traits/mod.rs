pub mod message_queue;
pub mod repository;
pub mod vision;

pub use message_queue::*;
pub use repository::*;
pub use vision::*;
