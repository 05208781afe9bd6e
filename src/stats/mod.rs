//! Statistics: history analysis, ranking and group percentiles.

mod history;
mod percentile;
mod ranking;

pub use history::*;
pub use percentile::*;
pub use ranking::*;
