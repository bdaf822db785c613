use super::merge_sort;
use crate::error::QueueError;
use crate::raw::{Global, RawAlloc, RawArray};

use std::alloc::Layout;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use tracing::{debug, trace};

pub(crate) type Link = Option<NonNull<Element>>;

pub(crate) struct Element {
    value: RawArray<u8>,
    pub(crate) next: Link,
}

impl Element {
    // On failure every block acquired so far has been released.
    pub(crate) fn alloc_in<A: RawAlloc>(value: &str, alloc: &A) -> Result<NonNull<Self>, QueueError> {
        let layout = Layout::new::<Element>();
        let ptr = NonNull::new(alloc.alloc(layout) as *mut Element).ok_or(QueueError::Alloc {
            size: layout.size(),
        })?;

        match RawArray::copy_in(value.as_bytes(), alloc) {
            Ok(value) => {
                unsafe { ptr.as_ptr().write(Self { value, next: None }) };
                Ok(ptr)
            }
            Err(err) => {
                unsafe { alloc.dealloc(ptr.as_ptr() as *mut u8, layout) };
                Err(err)
            }
        }
    }

    // cond: ptr came from `alloc_in` on the same allocator and is no longer reachable
    pub(crate) unsafe fn release<A: RawAlloc>(ptr: NonNull<Self>, alloc: &A) {
        (*ptr.as_ptr()).value.dealloc_in(alloc);
        alloc.dealloc(ptr.as_ptr() as *mut u8, Layout::new::<Element>());
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        unsafe { self.value.as_slice() }
    }

    pub(crate) fn value(&self) -> &str {
        // payloads are only ever copied from `&str`
        unsafe { std::str::from_utf8_unchecked(self.bytes()) }
    }
}

// Singly-linked queue of owned strings.
// `head` owns the chain; `tail` only points at the last element.
pub struct Queue<A: RawAlloc = Global> {
    head: Link,
    tail: Link,
    len: usize,
    alloc: A,
    _marker: PhantomData<Box<Element>>,
}

unsafe impl<A: RawAlloc + Send> Send for Queue<A> {}
unsafe impl<A: RawAlloc + Sync> Sync for Queue<A> {}

impl Queue {
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAlloc> Queue<A> {
    pub fn new_in(alloc: A) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            alloc,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn new_element(&self, value: &str) -> Result<NonNull<Element>, QueueError> {
        Element::alloc_in(value, &self.alloc).map_err(|err| {
            debug!(len = self.len, %err, "insertion rejected");
            err
        })
    }

    pub fn insert_head(&mut self, value: &str) -> Result<(), QueueError> {
        let mut ptr = self.new_element(value)?;
        unsafe { ptr.as_mut().next = self.head };
        if self.tail.is_none() {
            self.tail = Some(ptr);
        }
        self.head = Some(ptr);
        self.len += 1;
        trace!(len = self.len, "inserted at head");
        Ok(())
    }

    pub fn insert_tail(&mut self, value: &str) -> Result<(), QueueError> {
        let ptr = self.new_element(value)?;
        match self.tail {
            None => self.head = Some(ptr),
            Some(mut tail) => unsafe { tail.as_mut().next = Some(ptr) },
        }
        self.tail = Some(ptr);
        self.len += 1;
        trace!(len = self.len, "inserted at tail");
        Ok(())
    }

    fn unlink_head(&mut self) -> Option<NonNull<Element>> {
        let ptr = self.head?;
        self.head = unsafe { ptr.as_ref().next };
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(ptr)
    }

    // copies at most `buf.len() - 1` bytes plus a NUL; returns the bytes copied
    pub fn remove_head(&mut self, buf: Option<&mut [u8]>) -> Result<usize, QueueError> {
        let ptr = self.unlink_head().ok_or(QueueError::Empty)?;
        let copied = match buf {
            Some(buf) => copy_truncated(unsafe { ptr.as_ref().bytes() }, buf),
            None => 0,
        };
        unsafe { Element::release(ptr, &self.alloc) };
        trace!(len = self.len, "removed head");
        Ok(copied)
    }

    pub fn pop_front(&mut self) -> Option<String> {
        let ptr = self.unlink_head()?;
        let value = unsafe { ptr.as_ref().value().to_owned() };
        unsafe { Element::release(ptr, &self.alloc) };
        Some(value)
    }

    pub fn clear(&mut self) {
        let mut cur = self.head.take();
        self.tail = None;
        self.len = 0;
        while let Some(ptr) = cur {
            unsafe {
                cur = ptr.as_ref().next;
                Element::release(ptr, &self.alloc);
            }
        }
    }

    pub fn reverse(&mut self) {
        if self.len < 2 {
            return;
        }
        let mut prev: Link = None;
        let mut cur = self.head;
        while let Some(mut ptr) = cur {
            unsafe {
                let elem = ptr.as_mut();
                cur = elem.next;
                elem.next = prev;
            }
            prev = Some(ptr);
        }
        std::mem::swap(&mut self.head, &mut self.tail);
        trace!(len = self.len, "reversed");
    }

    // stable, byte-wise
    pub fn sort(&mut self) {
        if self.len < 2 {
            return;
        }
        let (head, tail) = unsafe { merge_sort::sort(self.head) };
        self.head = head;
        self.tail = tail;
        trace!(len = self.len, "sorted");
    }

    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            len: self.len,
            _marker: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert_eq!(self.len == 0, self.head.is_none());
        assert_eq!(self.len == 0, self.tail.is_none());

        let mut count = 0;
        let mut last = None;
        let mut cur = self.head;
        while let Some(ptr) = cur {
            count += 1;
            last = Some(ptr);
            cur = unsafe { ptr.as_ref().next };
        }
        assert_eq!(count, self.len);
        assert_eq!(last, self.tail);
        if let Some(tail) = self.tail {
            assert!(unsafe { tail.as_ref().next.is_none() });
        }
    }
}

fn copy_truncated(src: &[u8], buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }
    let n = src.len().min(buf.len() - 1);
    buf[..n].copy_from_slice(&src[..n]);
    buf[n] = 0;
    n
}

impl<A: RawAlloc> Drop for Queue<A> {
    fn drop(&mut self) {
        self.clear()
    }
}

impl<A: RawAlloc> fmt::Debug for Queue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ------------------------------------------
// begin: Iter

pub(crate) struct Iter<'a> {
    next: Link,
    len: usize,
    _marker: PhantomData<&'a Element>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;
    fn next(&mut self) -> Option<&'a str> {
        let ptr = self.next?;
        let elem = unsafe { &*ptr.as_ptr() };
        self.next = elem.next;
        self.len -= 1;
        Some(elem.value())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl ExactSizeIterator for Iter<'_> {
    fn len(&self) -> usize {
        self.len
    }
}

impl FusedIterator for Iter<'_> {}

// end: Iter
// ------------------------------------------


// proptest doesn't run under miri with default config
#[cfg(all(not(miri), test))]
mod proptests {
    use super::Queue;
    use crate::raw::FaultyAlloc;

    use std::collections::VecDeque;

    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        InsertHead(String),
        InsertTail(String),
        RemoveHead(usize),
        Reverse,
        Sort,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => "[a-c]{0,3}".prop_map(Op::InsertHead),
            3 => "[a-c]{0,3}".prop_map(Op::InsertTail),
            2 => (0usize..5).prop_map(Op::RemoveHead),
            1 => Just(Op::Reverse),
            1 => Just(Op::Sort),
        ]
    }

    proptest! {
        #[test]
        fn matches_model(ops in proptest::collection::vec(op(), 0..64)) {
            let alloc = FaultyAlloc::new(0);
            let mut q = Queue::new_in(alloc.clone());
            let mut model = VecDeque::new();

            for op in &ops {
                match op {
                    Op::InsertHead(s) => {
                        q.insert_head(s).unwrap();
                        model.push_front(s.clone());
                    }
                    Op::InsertTail(s) => {
                        q.insert_tail(s).unwrap();
                        model.push_back(s.clone());
                    }
                    Op::RemoveHead(cap) => {
                        let mut buf = vec![0u8; *cap];
                        match model.pop_front() {
                            None => prop_assert!(q.remove_head(Some(&mut buf[..])).is_err()),
                            Some(s) => {
                                let n = q.remove_head(Some(&mut buf[..])).unwrap();
                                if *cap == 0 {
                                    prop_assert_eq!(n, 0);
                                } else {
                                    prop_assert_eq!(n, s.len().min(cap - 1));
                                    prop_assert_eq!(&buf[..n], &s.as_bytes()[..n]);
                                    prop_assert_eq!(buf[n], 0);
                                }
                            }
                        }
                    }
                    Op::Reverse => {
                        q.reverse();
                        model = model.into_iter().rev().collect();
                    }
                    Op::Sort => {
                        q.sort();
                        model.make_contiguous().sort();
                    }
                }
                q.check_invariants();
                prop_assert_eq!(q.len(), model.len());
                prop_assert!(q.iter().eq(model.iter().map(String::as_str)));
            }

            drop(q);
            prop_assert_eq!(alloc.live_blocks(), 0);
        }

        #[test]
        fn sort_orders_and_keeps_values(values in proptest::collection::vec(".{0,8}", 0..128)) {
            let mut q = Queue::new();
            for v in &values {
                q.insert_tail(v).unwrap();
            }
            q.sort();
            q.check_invariants();

            let mut expected = values.clone();
            expected.sort();
            prop_assert!(q.iter().eq(expected.iter().map(String::as_str)));

            let sorted: Vec<String> = q.iter().map(str::to_owned).collect();
            q.sort();
            prop_assert!(q.iter().eq(sorted.iter().map(String::as_str)));
        }

        #[test]
        fn random_failures_never_leak(
            seed in any::<u64>(),
            values in proptest::collection::vec("[a-z]{0,6}", 0..64),
        ) {
            let alloc = FaultyAlloc::new(seed);
            alloc.set_fail_percent(30);
            let mut q = Queue::new_in(alloc.clone());
            let mut inserted = 0;
            for (i, v) in values.iter().enumerate() {
                let res = if i % 2 == 0 { q.insert_head(v) } else { q.insert_tail(v) };
                if res.is_ok() {
                    inserted += 1;
                }
                q.check_invariants();
            }
            prop_assert_eq!(q.len(), inserted);
            q.sort();
            q.reverse();
            q.check_invariants();
            drop(q);
            prop_assert_eq!(alloc.live_blocks(), 0);
        }
    }
}
