pub mod chat;
pub mod error;
pub mod link;
pub mod media;
pub mod session;
pub mod transport;

pub use chat::*;
pub use error::*;
pub use link::*;
pub use media::*;
pub use session::*;
pub use transport::*;
