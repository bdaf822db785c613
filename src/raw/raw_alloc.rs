use std::alloc::Layout;

// cond: `alloc` returns null or a block valid for `layout`; `dealloc`
// accepts any block `alloc` returned, with the same layout
pub unsafe trait RawAlloc {
    fn alloc(&self, layout: Layout) -> *mut u8;

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Global;

unsafe impl RawAlloc for Global {
    fn alloc(&self, layout: Layout) -> *mut u8 {
        // cond: callers never request zero-sized layouts
        unsafe { std::alloc::alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        std::alloc::dealloc(ptr, layout)
    }
}
