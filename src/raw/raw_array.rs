use super::RawAlloc;
use crate::error::QueueError;

use std::alloc::Layout;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

pub(crate) struct RawArray<T> {
    pub(crate) arr: NonNull<T>,
    pub(crate) cap: usize,
}

impl<T> RawArray<T> {
    pub(crate) fn try_alloc_in<A: RawAlloc>(capacity: usize, alloc: &A) -> Result<Self, QueueError> {
        assert!(size_of::<T>() != 0);

        if capacity == 0 {
            return Ok(Self {
                arr: NonNull::dangling(),
                cap: 0,
            });
        }

        let layout = Layout::array::<T>(capacity).map_err(|_| QueueError::Alloc {
            size: capacity.saturating_mul(size_of::<T>()),
        })?;

        let ptr = alloc.alloc(layout) as *mut T;
        let arr = NonNull::new(ptr).ok_or(QueueError::Alloc {
            size: layout.size(),
        })?;

        Ok(Self { arr, cap: capacity })
    }

    // cond: self was allocated by `alloc`
    pub(crate) unsafe fn dealloc_in<A: RawAlloc>(&mut self, alloc: &A) {
        if self.cap == 0 {
            return;
        }
        let layout = Layout::from_size_align_unchecked(self.cap * size_of::<T>(), align_of::<T>());
        alloc.dealloc(self.arr.as_ptr() as *mut u8, layout);
        self.arr = NonNull::dangling();
        self.cap = 0;
    }

    pub(crate) unsafe fn as_slice(&self) -> &[T] {
        std::slice::from_raw_parts(self.arr.as_ptr(), self.cap)
    }
}

impl RawArray<u8> {
    pub(crate) fn copy_in<A: RawAlloc>(bytes: &[u8], alloc: &A) -> Result<Self, QueueError> {
        let raw = Self::try_alloc_in(bytes.len(), alloc)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), raw.arr.as_ptr(), bytes.len());
        }
        Ok(raw)
    }
}
