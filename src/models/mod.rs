pub mod change;
pub mod diagnostics;
pub mod health;
pub mod messages;
pub mod participant;

pub use change::*;
pub use diagnostics::*;
pub use health::*;
pub use messages::*;
pub use participant::*;
