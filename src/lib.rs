//! Closed-loop vehicle path editing and visualization.
//!
//! A path is an ordered, cyclic list of waypoint nodes with a derived curve
//! threaded through them. This crate keeps visualization and collision
//! geometry for those curves incrementally up to date for observers that have
//! asked to see them, and runs the authoritative/proxy edit protocol for
//! creating, moving, re-speeding and removing nodes.
//!
//! Rendering, collision volumes, screen-space picking and the network
//! transport are external capabilities; hosts plug them in through the traits
//! in [`render`] and [`paths::path_remote`].

pub mod data;
pub mod events;
pub mod helpers;
pub mod paths;
pub mod render;

pub use data::Settings;
pub use events::{PathEvent, PathEvents};
pub use paths::path_structs::{
    NetMode, NodeId, ObserverId, ObserverState, PathEditError, PathId, PathSegmentHit,
    PathVisualizationFlags, SegmentKey,
};
pub use paths::path_subsystem::PathSubsystem;
pub use paths::paths::{PathContainer, PathManager, PathNode};
