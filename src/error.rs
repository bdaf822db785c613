use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no queue instance")]
    Absent,

    #[error("queue is empty")]
    Empty,

    #[error("memory allocation of {size} bytes failed")]
    Alloc { size: usize },
}
