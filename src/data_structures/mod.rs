//! Viewer data structures: models, textures, scene graphs, and instances.
//!
//! - `model` contains mesh and material definitions, GPU resources for 3D models
//! - `texture` contains the GPU texture wrapper and creation utilities
//! - `geometry` builds procedural meshes such as the cube
//! - `instance` holds per-instance transformation data
//! - `scene_graph` enables hierarchical scene organization
//! - `skin` holds joint matrices for skeletal meshes

pub mod geometry;
pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod skin;
pub mod texture;
