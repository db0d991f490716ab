//! CLI subcommands.

pub mod common;
pub mod fetch;
pub mod lookup;
pub mod merge;
pub mod run;
pub mod select;
