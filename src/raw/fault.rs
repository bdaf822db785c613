use super::{Global, RawAlloc};

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

struct State {
    rng: RefCell<StdRng>,
    fail_percent: Cell<u32>,
    budget: Cell<Option<usize>>,
    live: Cell<usize>,
}

// Fails a share of requests and counts blocks not yet returned.
// Clones share state.
#[derive(Clone)]
pub struct FaultyAlloc {
    state: Rc<State>,
}

impl FaultyAlloc {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Rc::new(State {
                rng: RefCell::new(StdRng::seed_from_u64(seed)),
                fail_percent: Cell::new(0),
                budget: Cell::new(None),
                live: Cell::new(0),
            }),
        }
    }

    pub fn fail_percent(&self) -> u32 {
        self.state.fail_percent.get()
    }

    pub fn set_fail_percent(&self, percent: u32) {
        self.state.fail_percent.set(percent.min(100));
    }

    // `Some(n)`: the next n requests succeed, every later one fails
    pub fn set_budget(&self, budget: Option<usize>) {
        self.state.budget.set(budget);
    }

    pub fn live_blocks(&self) -> usize {
        self.state.live.get()
    }

    fn should_fail(&self) -> bool {
        match self.state.budget.get() {
            Some(0) => return true,
            Some(n) => self.state.budget.set(Some(n - 1)),
            None => {}
        }
        match self.fail_percent() {
            0 => false,
            p => self.state.rng.borrow_mut().gen_range(0..100) < p,
        }
    }
}

unsafe impl RawAlloc for FaultyAlloc {
    fn alloc(&self, layout: Layout) -> *mut u8 {
        if self.should_fail() {
            debug!(size = layout.size(), "injected allocation failure");
            return std::ptr::null_mut();
        }
        let ptr = Global.alloc(layout);
        if !ptr.is_null() {
            self.state.live.set(self.live_blocks() + 1);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.state.live.set(self.live_blocks() - 1);
        Global.dealloc(ptr, layout)
    }
}
