pub mod controller;
pub mod state;
pub mod tally;

pub use controller::{PhaseController, TimerSnapshot};
pub use state::{format_clock, Phase, TimerState};
pub use tally::ActivityTally;
