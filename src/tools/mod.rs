//! Functions invoked by the subcommands.

pub mod create;
pub mod info;
