mod rate_limit;

pub use rate_limit::{
    RateLimitSnapshot,
    SNAPSHOT_TTL_SECS,
    delete_expired_rate_limits,
    delete_rate_limit,
    get_rate_limit,
    list_rate_limits,
    upsert_rate_limit,
};
