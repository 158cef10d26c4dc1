// backend

mod remote_store;
mod store_tx;

pub use remote_store::*;
pub use store_tx::*;

// session

mod alert_sink;
mod auth_provider;

pub use alert_sink::*;
pub use auth_provider::*;
