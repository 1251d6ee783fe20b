
pub use harness::*;
pub use member::*;
