//! Response Core
//!
//! Selection and pacing for one persona. The selector decides what to say
//! and whom to answer; the scheduler decides when to say it.

pub mod scheduler;
pub mod selector;
pub mod state;

pub use scheduler::{Clock, DispatchOutcome, FixedClock, LocalClock, Scheduler};
pub use selector::{PickedMessage, ResponseSelector, Selection};
pub use state::{status_line, PersonaState};
