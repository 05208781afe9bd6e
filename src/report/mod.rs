//! Output records and report files.

mod assembler;
mod writer;

pub use assembler::*;
pub use writer::*;
