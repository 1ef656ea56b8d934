//! Cooperative task scheduler and one-shot result slot (spec.md §2
//! component 4): `ThreadPool` plus `Promise`/`Future`.

pub mod future;
pub mod pool;

pub use future::{new_promise_future, Future, Promise};
pub use pool::ThreadPool;
