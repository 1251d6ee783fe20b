mod command;
mod registry;
mod room;

pub use command::*;
pub use registry::*;
pub use room::*;
