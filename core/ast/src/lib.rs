#![warn(clippy::pedantic)]
//! Syntax tree of the Practical language as produced by the parser and
//! consumed, read-only, by semantic analysis.
pub mod builder;
pub mod nodes;
