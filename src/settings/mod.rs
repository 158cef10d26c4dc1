//! Layered TOML settings plus the command line that selects them.
//! See `bin/settings_demo.rs` for a binary that prints the loaded values.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
