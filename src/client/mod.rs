//! Rating source clients.

mod http;
mod memory;
mod rate_limiter;
mod source;

pub use http::*;
pub use memory::*;
pub use rate_limiter::*;
pub use source::*;
