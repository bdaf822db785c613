pub mod deque;
pub mod error;
pub mod raw;

pub use crate::deque::{Queue, QueueHandle};
pub use crate::error::QueueError;
pub use crate::raw::{FaultyAlloc, Global, RawAlloc};
