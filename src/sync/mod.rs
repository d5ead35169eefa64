//! Live stack inventory and background status polling

pub mod inventory;
pub mod poller;

pub use inventory::{image_matches, index_by_name, ResolveStats, StackInventory};
pub use poller::{BackgroundPoller, SweepReport};
