use super::linked_queue::{Element, Link};

use std::ptr::NonNull;

// Sorts the chain starting at `head` by byte-wise value order and returns
// its new head and tail. Equal values keep their relative order.
// cond: the chain is terminated and owned by the caller
pub(crate) unsafe fn sort(head: Link) -> (Link, Link) {
    let head = sort_chain(head);
    (head, last(head))
}

unsafe fn sort_chain(head: Link) -> Link {
    let first = match head {
        Some(ptr) if ptr.as_ref().next.is_some() => ptr,
        _ => return head,
    };
    let back = split(first);
    merge(sort_chain(head), sort_chain(back))
}

// Cuts the chain after its midpoint and returns the detached back half.
// cond: the chain holds at least two elements
unsafe fn split(head: NonNull<Element>) -> Link {
    let mut slow = head;
    let mut fast = head.as_ref().next;
    while let Some(ptr) = fast {
        fast = ptr.as_ref().next;
        if let Some(ptr) = fast {
            fast = ptr.as_ref().next;
            slow = match slow.as_ref().next {
                Some(next) => next,
                None => break,
            };
        }
    }
    (*slow.as_ptr()).next.take()
}

unsafe fn merge(mut left: Link, mut right: Link) -> Link {
    let mut head: Link = None;
    let mut slot: *mut Link = &mut head;
    loop {
        let taken = match (left, right) {
            (Some(l), Some(r)) => {
                // left wins ties
                if r.as_ref().bytes() < l.as_ref().bytes() {
                    right = r.as_ref().next;
                    r
                } else {
                    left = l.as_ref().next;
                    l
                }
            }
            (rest, None) | (None, rest) => {
                *slot = rest;
                return head;
            }
        };
        *slot = Some(taken);
        slot = &mut (*taken.as_ptr()).next;
    }
}

unsafe fn last(head: Link) -> Link {
    let mut cur = head?;
    while let Some(next) = cur.as_ref().next {
        cur = next;
    }
    Some(cur)
}
