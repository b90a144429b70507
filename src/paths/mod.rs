pub mod path_editor;
pub mod path_remote;
pub mod path_structs;
pub mod path_subsystem;
pub mod path_visualization;
pub mod paths;
pub mod segment_visualization;
pub mod spline;
pub mod visualization_tracker;
