//! Worker pool pieces: the club worker and run observers.

mod observer;
mod worker;

pub use observer::*;
pub use worker::*;
