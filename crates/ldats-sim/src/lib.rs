//! Command implementations behind the `ldats-sim` binary.

pub mod commands;
pub mod table;

pub use table::load_table;
