//! Command modules for the labflow CLI.

pub mod compile;
pub mod run;
