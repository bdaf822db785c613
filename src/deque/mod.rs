mod handle;
mod linked_queue;
mod merge_sort;

pub use self::handle::QueueHandle;
pub use self::linked_queue::Queue;
