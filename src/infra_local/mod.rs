mod alert_sink_recording;
mod alert_sink_tracing;
mod auth_provider_memory;
mod remote_store_memory;

pub use alert_sink_recording::*;
pub use alert_sink_tracing::*;
pub use auth_provider_memory::*;
pub use remote_store_memory::*;
