//! Utility modules

pub mod masks;
pub use masks::*;

#[cfg(test)]
mod tests;
