mod community_service;

pub use community_service::*;
