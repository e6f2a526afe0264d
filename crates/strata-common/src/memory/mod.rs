//! Reference-counted tensor memory.
//!
//! # Architecture
//!
//! ```text
//! BlockPool ──allocate──▶ RefCountedBlock<T> ◀── TensorSegment<T> (one release on dispose)
//!    ▲                         │             ◀── BlockHandle<T>   (clone = acquire, drop = release)
//!    └──── recycle on count → 0 ┘
//! ```
//!
//! A block starts with a reference count of zero and must be acquired
//! before use. The acquire/release pair that brings the count back to zero
//! returns the storage to the pool and invalidates the block for good.
//!
//! Debug builds keep a registry of live allocation ids so leaks can be
//! reported at shutdown with [`report_leaks`].

mod block;
mod leak;
mod pool;
mod segment;

pub use block::{BlockHandle, RefCountedBlock, TensorElement};
pub use leak::{outstanding_allocations, report_leaks};
pub use pool::{BlockPool, PoolStats};
pub use segment::TensorSegment;
