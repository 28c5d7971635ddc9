//! The two scenes the viewer can show.
//!
//! Both are plain [`GraphicsFlow`](crate::flow::GraphicsFlow)s without shared
//! state or custom events, so they run as `GraphicsFlow<(), ()>`.

use crate::{config::SceneKind, flow::FlowConsturctor};

pub mod cube;
pub mod fish;

pub use cube::CubeViewer;
pub use fish::FishViewer;

/// The flows that make up `scene`.
pub fn constructors_for(scene: SceneKind) -> Vec<FlowConsturctor<(), ()>> {
    match scene {
        SceneKind::Cube => vec![cube::constructor()],
        SceneKind::Fish => vec![fish::constructor()],
    }
}
