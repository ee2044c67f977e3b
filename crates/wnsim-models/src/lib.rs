#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod geometry;
pub mod mobility;
pub mod propagation;

#[cfg(test)]
mod tests;
