mod blocklist;
mod rate_limit;

pub use blocklist::Blocklist;
pub use rate_limit::{Admission, RateLimiter};
