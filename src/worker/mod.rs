mod pool;
mod task;

pub use pool::{WorkerContext, WorkerPool};
