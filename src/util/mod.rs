pub mod cache_padded;
pub mod spin;

pub use cache_padded::CachePadded;
pub use spin::SpinLock;
