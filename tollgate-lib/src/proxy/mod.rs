mod classify;
mod context;
mod dns;
mod forward;
mod rewrite;
mod server;
mod tunnel;
mod worker;

pub use classify::{classify, RequestInfo};
pub use context::ProxyContext;
pub use rewrite::rewrite_request;
pub use server::run;
