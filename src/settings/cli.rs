use super::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    /// Path to a settings file (TOML).
    #[arg(long)]
    pub settings: Option<String>,
    /// Prefix searched for in the demo walkthrough.
    #[arg(long, default_value = "bo")]
    pub search: String,
}
