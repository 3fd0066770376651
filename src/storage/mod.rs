pub mod atomic;

pub use atomic::{atomic_write, atomic_write_async};
