use super::Queue;
use crate::error::QueueError;
use crate::raw::RawAlloc;

// Absent queue: mutations fail with `Absent`, size is zero, the rest are no-ops.
pub trait QueueHandle {
    fn insert_head(&mut self, value: &str) -> Result<(), QueueError>;

    fn insert_tail(&mut self, value: &str) -> Result<(), QueueError>;

    fn remove_head(&mut self, buf: Option<&mut [u8]>) -> Result<usize, QueueError>;

    fn size(&self) -> usize;

    fn reverse(&mut self);

    fn sort(&mut self);

    fn destroy(&mut self);
}

impl<A: RawAlloc> QueueHandle for Option<Queue<A>> {
    fn insert_head(&mut self, value: &str) -> Result<(), QueueError> {
        self.as_mut().ok_or(QueueError::Absent)?.insert_head(value)
    }

    fn insert_tail(&mut self, value: &str) -> Result<(), QueueError> {
        self.as_mut().ok_or(QueueError::Absent)?.insert_tail(value)
    }

    fn remove_head(&mut self, buf: Option<&mut [u8]>) -> Result<usize, QueueError> {
        self.as_mut().ok_or(QueueError::Absent)?.remove_head(buf)
    }

    fn size(&self) -> usize {
        self.as_ref().map_or(0, |q| q.len())
    }

    fn reverse(&mut self) {
        if let Some(q) = self {
            q.reverse()
        }
    }

    fn sort(&mut self) {
        if let Some(q) = self {
            q.sort()
        }
    }

    fn destroy(&mut self) {
        drop(self.take())
    }
}

#[cfg(test)]
mod test {
    use super::QueueHandle;
    use crate::deque::Queue;
    use crate::error::QueueError;
    use crate::raw::FaultyAlloc;

    #[test]
    fn test_absent_handle() {
        let mut handle: Option<Queue> = None;
        assert_eq!(handle.insert_head("a"), Err(QueueError::Absent));
        assert_eq!(handle.insert_tail("a"), Err(QueueError::Absent));
        let mut buf = [0u8; 4];
        assert_eq!(handle.remove_head(Some(&mut buf[..])), Err(QueueError::Absent));
        assert_eq!(buf, [0u8; 4]);
        assert_eq!(handle.size(), 0);
        handle.reverse();
        handle.sort();
        handle.destroy();
        assert!(handle.is_none());
    }

    #[test]
    fn test_present_handle() {
        let alloc = FaultyAlloc::new(0);
        let mut handle = Some(Queue::new_in(alloc.clone()));
        assert_eq!(handle.remove_head(None), Err(QueueError::Empty));
        assert_eq!(handle.size(), 0);

        handle.insert_tail("banana").unwrap();
        handle.insert_tail("apple").unwrap();
        handle.insert_head("cherry").unwrap();
        assert_eq!(handle.size(), 3);

        handle.sort();
        handle.reverse();

        let mut buf = [0u8; 16];
        let n = handle.remove_head(Some(&mut buf[..])).unwrap();
        assert_eq!(&buf[..n], b"cherry");
        let n = handle.remove_head(Some(&mut buf[..])).unwrap();
        assert_eq!(&buf[..n], b"banana");
        assert_eq!(handle.size(), 1);

        handle.destroy();
        assert_eq!(handle.size(), 0);
        assert_eq!(alloc.live_blocks(), 0);

        // destroying an absent handle is a no-op
        handle.destroy();
    }
}
