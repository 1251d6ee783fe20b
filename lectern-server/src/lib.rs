pub mod error;
pub mod lecture;
pub mod room;
pub mod signaling;

pub use error::*;
pub use lecture::*;
pub use room::*;
pub use signaling::*;
