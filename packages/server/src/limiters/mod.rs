//! In-memory, per-key gating primitives.
//!
//! Every limiter here is process-local and non-persistent: state lives in a
//! `DashMap` singleton owned by the limiter, keyed by a caller-supplied
//! string. Nothing here coordinates across processes — in a multi-process
//! deployment each process enforces its own share of the limit.

pub mod concurrency;
pub mod cooldown;
pub mod count;
pub mod rate;
pub mod user_block;

pub use concurrency::ConcurrencyLimiter;
pub use cooldown::CooldownLimiter;
pub use count::CountLimiter;
pub use rate::RateLimiter;
pub use user_block::UserBlockLimiter;
