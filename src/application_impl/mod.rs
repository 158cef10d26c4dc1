mod client_cache;
mod community_session;
mod mutation_executor;
mod subscription_manager;

pub use client_cache::*;
pub use community_session::*;
pub use mutation_executor::*;
pub use subscription_manager::*;
