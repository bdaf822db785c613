mod fault;
mod raw_alloc;
mod raw_array;

pub use self::fault::FaultyAlloc;
pub use self::raw_alloc::{Global, RawAlloc};
pub(crate) use self::raw_array::RawArray;
