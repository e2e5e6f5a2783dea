mod entry;
pub mod keys;
mod query_cache;
pub(crate) mod refresh;

pub use keys::{CacheKey, LogsKey, QueryKey, ServersKey, StatusKey, SubscriptionKey};
pub use query_cache::QueryCache;
pub use refresh::Query;
