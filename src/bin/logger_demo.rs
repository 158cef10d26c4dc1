use wayfarer::logger::*;
use wayfarer::settings::Log;

fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap()?;
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!("bootstrap info log");

    let log = Log {
        filter: "debug".to_string(),
    };
    logger.reload_from_settings(&log)?;
    trace!("session trace log");
    debug!("session debug log");
    info!("session info log");

    // an invalid directive is rejected and the previous filter stays
    let bad = Log {
        filter: "wayfarer=loud".to_string(),
    };
    if let Err(e) = logger.reload_from_settings(&bad) {
        warn!("rejected filter: {e}");
    }
    debug!("still at debug");

    Ok(())
}
