mod loader;
mod root;
mod security;
mod timeout;

pub use loader::load_from_path;
pub use root::Config;
pub use security::RateLimitConfig;
pub use timeout::TimeoutConfig;
