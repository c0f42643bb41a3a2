pub mod id;
pub mod protocol;

pub use id::{PrefixedId, SessionId};
pub use protocol::{ServerLine, DEFAULT_PORT};
