use cgmath::Vector3;
use instant::Duration;
use winit::event::WindowEvent;

use crate::{
    config::hex_to_linear,
    context::{Context, InitContext},
    controls::ModelPose,
    data_structures::{
        geometry,
        instance::Instance,
        model::{Material, MaterialUniform, Mesh, Model},
        scene_graph::{ModelNode, SceneNode},
        texture::Texture,
    },
    flow::{FlowConsturctor, GraphicsFlow, Out},
    render::Render,
    resources::texture::material_layout,
};

/// A flat coloured cube spinning around its X and Y axes.
pub struct CubeViewer {
    node: Option<ModelNode>,
    pose: ModelPose,
    spin_per_frame: f32,
}

impl CubeViewer {
    pub fn new(ctx: &InitContext) -> Self {
        let node = match build_cube(ctx) {
            Ok(node) => Some(node),
            Err(e) => {
                log::error!("Could not create the cube: {:#}", e);
                None
            }
        };
        Self {
            node,
            pose: ModelPose::new([0.0; 3], [0.0; 3]),
            spin_per_frame: ctx.viewer.cube.spin_per_frame,
        }
    }

    pub fn pose(&self) -> &ModelPose {
        &self.pose
    }

    fn spin(&mut self) {
        self.pose.rotation += Vector3::new(self.spin_per_frame, self.spin_per_frame, 0.0);
    }
}

fn build_cube(ctx: &InitContext) -> anyhow::Result<ModelNode> {
    let config = &ctx.viewer.cube;
    let (vertices, indices) = geometry::cube(config.size);
    let mesh = Mesh::new(&ctx.device, "cube", &vertices, &indices, 0);

    let texture = Texture::create_solid([255; 4], "cube", &ctx.device, &ctx.queue)?;
    let layout = material_layout(&ctx.device);
    let material = Material::new(
        &ctx.device,
        "cube",
        texture,
        MaterialUniform::new(hex_to_linear(config.colour), true),
        &layout,
    );

    let model = Model {
        meshes: vec![mesh],
        materials: vec![material],
    };
    Ok(ModelNode::from_model(None, &ctx.device, model))
}

pub fn constructor() -> FlowConsturctor<(), ()> {
    Box::new(|ctx: InitContext| {
        Box::pin(async move { Box::new(CubeViewer::new(&ctx)) as Box<dyn GraphicsFlow<(), ()>> })
    })
}

impl GraphicsFlow<(), ()> for CubeViewer {
    fn on_init(&mut self, _ctx: &mut Context, _state: &mut ()) -> Out<(), ()> {
        Out::Empty
    }

    fn on_update(&mut self, ctx: &Context, _state: &mut (), _dt: Duration) -> Out<(), ()> {
        self.spin();
        if let Some(node) = &mut self.node {
            node.set_local_transform(Instance::from(&self.pose));
            node.update_world_transforms(&Instance::default());
            node.write_to_buffers(&ctx.queue);
        }
        Out::Empty
    }

    fn on_window_events(&mut self, _ctx: &Context, _state: &mut (), _event: &WindowEvent) -> Out<(), ()> {
        Out::Empty
    }

    fn on_render(&self) -> Render<'_> {
        match &self.node {
            Some(node) => Render::Defaults(node.get_render()),
            None => Render::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spins_on_x_and_y_every_frame() {
        let mut viewer = CubeViewer {
            node: None,
            pose: ModelPose::new([0.0; 3], [0.0; 3]),
            spin_per_frame: 0.01,
        };
        for _ in 0..3 {
            viewer.spin();
        }
        assert!((viewer.pose().rotation.x - 0.03).abs() < 1e-6);
        assert!((viewer.pose().rotation.y - 0.03).abs() < 1e-6);
        assert_eq!(viewer.pose().rotation.z, 0.0);
        assert!(viewer.on_render().is_empty());
    }
}
