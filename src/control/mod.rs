//! Control runs: auto-start, stop-all, settings sync and stack updates

pub mod autostart;
pub mod guard;
pub mod updates;

pub use autostart::{autostart_action, AutoStartAction, AutoStartController, ControlReport};
pub use guard::{FlightGuard, SingleFlight};
pub use updates::StackUpdater;
