use wayfarer::settings::*;

fn main() {
    // Load settings from the default location
    match parse_settings(None) {
        Ok(settings) => println!("Loaded settings: {:?}", settings),
        Err(e) => println!("Default settings unavailable: {e}"),
    }

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    // Attempt to load from a custom path
    // $ cargo run --bin settings_demo -- --settings=settings/dev.toml
    let cli = Cli::parse();
    match parse_settings(cli.settings.as_deref()) {
        Ok(settings) => println!("Loaded settings: {:?}", settings),
        Err(e) => println!("Failed to load settings: {e}"),
    }
}
