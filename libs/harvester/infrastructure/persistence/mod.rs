pub mod queue;

pub use queue::{
    LogWriteErrors, PersistenceError, PersistenceQueue, QueueConfig, QueueStats, Store,
    StoreError, StoreErrorListener, DEFAULT_CAPACITY, DEFAULT_LOW_WATER,
};
