mod document;
mod friend;
mod mutation;
mod snapshot;
mod user;

pub use document::*;
pub use friend::*;
pub use mutation::*;
pub use snapshot::*;
pub use user::*;
