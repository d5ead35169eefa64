//! Domain types shared by the cache, reconciliation and control layers

pub mod settings;
pub mod stack;
pub mod update;

pub use settings::{IgnoredImage, StackSettings, UNASSIGNED_PRIORITY};
pub use stack::{ContainerAction, ContainerDto, ImageStatus, StackAction, StackDto, STACK_LABEL};
pub use update::{StackUpdateStatus, UpdateState};
