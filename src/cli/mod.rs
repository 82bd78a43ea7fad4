//! CLI subcommand implementations for the Magpie binary.

pub mod doctor;
pub mod fetch_cmd;
pub mod status_cmd;
