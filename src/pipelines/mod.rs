//! Render pipelines and the GPU resources they bind.
//!
//! - `basic` draws textured, optionally lit models
//! - `light` holds the light uniform shared by all draws

pub mod basic;
pub mod light;

/// All pipelines the viewer renders with.
#[derive(Debug)]
pub struct Pipelines {
    pub basic: wgpu::RenderPipeline,
}
