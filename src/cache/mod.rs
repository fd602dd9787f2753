mod refresh;
mod tracker;

pub use refresh::{CacheError, RefreshCache, MAX_REFRESH_PERIOD};
pub use tracker::LoopTracker;
