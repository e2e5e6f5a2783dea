// ── Cache keys ──
//
// Each cached entity has a runtime name (`QueryKey`) used for
// invalidation broadcasts, and a zero-sized marker type binding that name
// to its value type at compile time.

use crate::model::{LogBuffer, Server, Status, SubscriptionInfo};

/// Runtime name of a cached entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum QueryKey {
    Status,
    Logs,
    Servers,
    Subscription,
}

mod sealed {
    pub trait Sealed {}
}

/// Compile-time binding of a [`QueryKey`] to the type stored under it.
///
/// Sealed: the cache downcasts entries by key, so every key must map to
/// exactly one value type.
pub trait CacheKey: sealed::Sealed + Send + Sync + 'static {
    type Value: Send + Sync + 'static;
    const KEY: QueryKey;
}

/// `status`: whole-object replace.
#[derive(Debug, Clone, Copy)]
pub struct StatusKey;

/// `logs`: bounded, append-only from the push channel.
#[derive(Debug, Clone, Copy)]
pub struct LogsKey;

/// `servers`: patched per id.
#[derive(Debug, Clone, Copy)]
pub struct ServersKey;

/// `subscription`: whole-object replace.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionKey;

macro_rules! cache_key {
    ($marker:ty, $value:ty, $key:expr) => {
        impl sealed::Sealed for $marker {}
        impl CacheKey for $marker {
            type Value = $value;
            const KEY: QueryKey = $key;
        }
    };
}

cache_key!(StatusKey, Status, QueryKey::Status);
cache_key!(LogsKey, LogBuffer, QueryKey::Logs);
cache_key!(ServersKey, Vec<Server>, QueryKey::Servers);
cache_key!(SubscriptionKey, SubscriptionInfo, QueryKey::Subscription);

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn keys_have_lowercase_names() {
        let names: Vec<String> = QueryKey::iter().map(|k| k.to_string()).collect();
        assert_eq!(names, ["status", "logs", "servers", "subscription"]);
        assert_eq!("servers".parse::<QueryKey>().ok(), Some(QueryKey::Servers));
    }
}
