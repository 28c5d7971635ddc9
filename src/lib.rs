//! bumplefish
//!
//! An interactive 3D viewer that shows either a spinning cube or a textured,
//! animated fish. It runs in a native window or, compiled to `wasm32`, on a
//! browser canvas. The fish reacts to the mouse wheel, touch drags and to the
//! scroll position of the page around the canvas.
//!
//! High-level modules
//! - `camera`: camera, projection, uniforms and optional orbit controls
//! - `config`: every tunable of the viewer with stock defaults
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `controls`: wheel, scroll and touch handlers that move the model
//! - `data_structures`: meshes, materials, textures, instances and the scene graph
//! - `flow`: the event loop and the `GraphicsFlow` trait scenes implement
//! - `page`: page scroll tracking (DOM on the web, emulated natively)
//! - `pipelines`: the model pipeline and its light
//! - `resources`: glTF, texture and animation loading
//! - `render`: render composition
//! - `viewers`: the cube and fish scenes
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod controls;
pub mod data_structures;
pub mod flow;
pub mod page;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod viewers;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use config::{SceneKind, ViewerConfig};
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Shows `scene` ("cube" or "fish") on the canvas with id `canvas`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start(scene: &str) -> Result<(), JsValue> {
    let scene: SceneKind = scene
        .parse()
        .map_err(|e: anyhow::Error| JsValue::from_str(&e.to_string()))?;
    flow::run(
        viewers::constructors_for(scene),
        ViewerConfig::for_scene(scene),
    )
    .map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}
