//! The bumplefish: a glTF model that swims along with the page.
//!
//! The model is loaded while the flow is constructed. Its animation clips
//! all play in a loop. Mouse wheel, touch drags and page scrolling move and
//! rotate it, and after every such change the camera turns to face it again.

use cgmath::{EuclideanSpace, Point3};
use instant::Duration;
use winit::event::{TouchPhase, WindowEvent};

use crate::{
    config::{AnimationClock, ViewerConfig},
    context::{Context, InitContext},
    controls::{ModelPose, ScrollSync, TouchDrag, WheelNudge},
    data_structures::{
        instance::Instance,
        scene_graph::{ContainerNode, SceneNode, apply_patches, traverse_mut, update_skins},
    },
    flow::{FlowConsturctor, GraphicsFlow, Out},
    page::{PageEvent, dom_delta_y},
    render::Render,
    resources::{
        animation::AnimationMixer,
        load_model_gltf,
        texture::{load_texture, material_layout},
    },
};

pub struct FishViewer {
    root: Option<Box<dyn SceneNode>>,
    mixer: AnimationMixer,
    pose: ModelPose,
    clock: AnimationClock,
    wheel: WheelNudge,
    scroll: ScrollSync,
    touch: TouchDrag,
}

impl FishViewer {
    /// A viewer without a model. Input is tracked but moves nothing.
    pub fn empty(viewer: &ViewerConfig) -> Self {
        Self {
            root: None,
            mixer: AnimationMixer::new(Vec::new()),
            pose: ModelPose::new(viewer.fish.position, viewer.fish.rotation),
            clock: viewer.fish.clock,
            wheel: WheelNudge::new(&viewer.wheel),
            scroll: ScrollSync::new(&viewer.scroll),
            touch: TouchDrag::new(&viewer.touch),
        }
    }

    /// Wraps `model` in a node that carries the pose, so animations that
    /// target the model's own root node do not fight with the input handlers.
    pub fn with_model(viewer: &ViewerConfig, model: Box<dyn SceneNode>, mixer: AnimationMixer) -> Self {
        let mut root = ContainerNode::new(None);
        root.add_child(model);
        let mut fish = Self::empty(viewer);
        fish.root = Some(Box::new(root));
        fish.mixer = mixer;
        fish.sync_root();
        fish
    }

    pub async fn load(ctx: InitContext) -> Self {
        let config = &ctx.viewer.fish;
        let loaded = match load_model_gltf(&config.model, &ctx.device, &ctx.queue).await {
            Ok(loaded) => loaded,
            Err(e) => {
                log::error!(
                    "Could not load {} (models are read from the assets directory): {:#}",
                    config.model,
                    e
                );
                return Self::empty(&ctx.viewer);
            }
        };
        log::info!(
            "Loaded {} with {} animation clip(s)",
            config.model,
            loaded.clips.len()
        );

        let mut mixer = AnimationMixer::new(loaded.clips);
        mixer.play_all();
        let mut fish = Self::with_model(&ctx.viewer, loaded.root, mixer);

        if let Some(texture_name) = &config.texture_override {
            match load_texture(texture_name, &ctx.device, &ctx.queue, None).await {
                Ok(texture) => {
                    let layout = material_layout(&ctx.device);
                    fish.for_each_node(&mut |node: &mut dyn SceneNode| {
                        for material in node.get_materials_mut() {
                            material.set_diffuse(&ctx.device, texture.clone(), &layout);
                        }
                    });
                }
                Err(e) => log::warn!(
                    "Keeping the model's own textures, {} failed to load: {:#}",
                    texture_name,
                    e
                ),
            }
        }
        fish
    }

    pub fn has_model(&self) -> bool {
        self.root.is_some()
    }

    pub fn pose(&self) -> &ModelPose {
        &self.pose
    }

    fn for_each_node(&mut self, f: &mut dyn FnMut(&mut dyn SceneNode)) {
        if let Some(root) = &mut self.root {
            traverse_mut(root.as_mut(), f);
        }
    }

    fn sync_root(&mut self) {
        if let Some(root) = &mut self.root {
            root.set_local_transform(Instance::from(&self.pose));
            root.update_world_transforms(&Instance::default());
            update_skins(root.as_mut());
        }
    }

    /// Returns true if the model moved.
    fn nudge(&mut self, delta_y: f32) -> bool {
        if !self.has_model() {
            return false;
        }
        self.wheel.apply(&mut self.pose, delta_y);
        true
    }

    fn follow_scroll(&mut self, fraction: f32) -> bool {
        if !self.has_model() {
            return false;
        }
        self.scroll.apply(&mut self.pose, fraction);
        true
    }

    fn look_at_model(&self) -> Out<(), ()> {
        let target = Point3::from_vec(self.pose.position);
        Out::Configure(Box::new(move |ctx: &mut Context| ctx.look_at(target)))
    }

    /// Moves the model for wheel and touch input and asks the camera to follow.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> Out<(), ()> {
        let moved = match event {
            WindowEvent::MouseWheel { delta, .. } => self.nudge(dom_delta_y(delta)),
            // a touch may start before the model is there, moving needs one
            WindowEvent::Touch(touch) if touch.phase == TouchPhase::Moved && !self.has_model() => false,
            WindowEvent::Touch(touch) => self.touch.handle_touch(&mut self.pose, touch),
            _ => false,
        };
        if moved { self.look_at_model() } else { Out::Empty }
    }

    pub fn handle_page_event(&mut self, event: &PageEvent) -> Out<(), ()> {
        let PageEvent::Scrolled(metrics) = event;
        if self.follow_scroll(metrics.fraction()) {
            self.look_at_model()
        } else {
            Out::Empty
        }
    }
}

pub fn constructor() -> FlowConsturctor<(), ()> {
    Box::new(|ctx: InitContext| {
        Box::pin(async move { Box::new(FishViewer::load(ctx).await) as Box<dyn GraphicsFlow<(), ()>> })
    })
}

impl GraphicsFlow<(), ()> for FishViewer {
    fn on_init(&mut self, ctx: &mut Context, _state: &mut ()) -> Out<(), ()> {
        if let Some(root) = &mut self.root {
            root.write_to_buffers(&ctx.queue);
        }
        Out::Empty
    }

    fn on_update(&mut self, ctx: &Context, _state: &mut (), dt: Duration) -> Out<(), ()> {
        let Some(root) = &mut self.root else {
            return Out::Empty;
        };
        let patches = self.mixer.update(self.clock.step(dt));
        apply_patches(root.as_mut(), &patches);
        self.sync_root();
        if let Some(root) = &mut self.root {
            root.write_to_buffers(&ctx.queue);
        }
        Out::Empty
    }

    fn on_window_events(&mut self, _ctx: &Context, _state: &mut (), event: &WindowEvent) -> Out<(), ()> {
        self.handle_window_event(event)
    }

    fn on_page_events(&mut self, _ctx: &Context, _state: &mut (), event: &PageEvent) -> Out<(), ()> {
        self.handle_page_event(event)
    }

    fn on_render(&self) -> Render<'_> {
        match &self.root {
            Some(root) => root.as_ref().into(),
            None => Render::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector3};
    use winit::{
        dpi::PhysicalPosition,
        event::{DeviceId, MouseScrollDelta, Touch},
    };

    use super::*;
    use crate::page::ScrollMetrics;

    fn device() -> DeviceId {
        unsafe { DeviceId::dummy() }
    }

    fn touch(phase: TouchPhase, x: f64, y: f64) -> WindowEvent {
        WindowEvent::Touch(Touch {
            device_id: device(),
            phase,
            location: PhysicalPosition::new(x, y),
            force: None,
            id: 0,
        })
    }

    fn wheel(lines: f32) -> WindowEvent {
        WindowEvent::MouseWheel {
            device_id: device(),
            delta: MouseScrollDelta::LineDelta(0.0, lines),
            phase: TouchPhase::Moved,
        }
    }

    fn scrolled(offset: f32) -> PageEvent {
        PageEvent::Scrolled(ScrollMetrics::new(offset, 1800.0, 600.0))
    }

    fn assert_near(actual: Vector3<f32>, expected: Vector3<f32>) {
        assert!((actual - expected).magnitude() < 1e-5, "{:?} != {:?}", actual, expected);
    }

    fn fish() -> FishViewer {
        let viewer = ViewerConfig::default();
        FishViewer::with_model(&viewer, Box::new(ContainerNode::new(Some(0))), AnimationMixer::new(Vec::new()))
    }

    #[test]
    fn starts_in_the_configured_pose() {
        let fish = fish();
        assert_eq!(fish.pose(), &ModelPose::new([0.0; 3], [0.5, 1.5, 0.0]));
        let root = fish.root.as_ref().map(|root| root.get_world_transform().position);
        assert_eq!(root, Some(Vector3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn input_is_ignored_without_a_model() {
        let mut fish = FishViewer::empty(&ViewerConfig::default());
        assert!(!fish.nudge(100.0));
        assert!(!fish.follow_scroll(0.5));
        assert_eq!(fish.pose(), &ModelPose::new([0.0; 3], [0.5, 1.5, 0.0]));
        assert!(fish.on_render().is_empty());
    }

    #[test]
    fn wheel_and_scroll_move_the_model() {
        let mut fish = fish();
        assert!(fish.nudge(100.0));
        assert!((fish.pose().position - Vector3::new(0.1, 0.1, 0.1)).magnitude() < 1e-6);

        assert!(fish.follow_scroll(1.0));
        assert!((fish.pose().position - Vector3::new(10.0, 5.0, -10.0)).magnitude() < 1e-5);
    }

    #[test]
    fn root_follows_the_pose() {
        let mut fish = fish();
        fish.follow_scroll(0.5);
        fish.sync_root();
        let position = fish
            .root
            .as_ref()
            .map(|root| root.get_world_transform().position)
            .unwrap_or(Vector3::new(0.0, 0.0, 0.0));
        assert!((position - Vector3::new(5.0, 2.5, -5.0)).magnitude() < 1e-5);
    }

    #[test]
    fn camera_looks_at_the_model_after_moving() {
        let mut fish = fish();
        fish.nudge(100.0);
        assert!(matches!(fish.look_at_model(), Out::Configure(_)));
    }

    #[test]
    fn touch_started_before_the_model_is_still_tracked() {
        let mut fish = FishViewer::empty(&ViewerConfig::default());
        assert!(matches!(fish.handle_window_event(&touch(TouchPhase::Started, 100.0, 100.0)), Out::Empty));
        assert!(fish.touch.is_active());
        assert!(matches!(fish.handle_window_event(&touch(TouchPhase::Moved, 110.0, 120.0)), Out::Empty));
        assert_eq!(fish.pose(), &ModelPose::new([0.0; 3], [0.5, 1.5, 0.0]));
        fish.handle_window_event(&touch(TouchPhase::Ended, 110.0, 120.0));
        assert!(!fish.touch.is_active());
    }

    #[test]
    fn touch_drag_moves_the_model_and_the_camera() {
        let mut fish = fish();
        assert!(matches!(fish.handle_window_event(&touch(TouchPhase::Started, 100.0, 100.0)), Out::Empty));
        let out = fish.handle_window_event(&touch(TouchPhase::Moved, 110.0, 120.0));
        assert!(matches!(out, Out::Configure(_)));
        assert_near(fish.pose().position, Vector3::new(0.1, -0.2, 0.3));
        assert_near(fish.pose().rotation, Vector3::new(0.6, 1.55, 0.0));
    }

    #[test]
    fn each_wheel_event_steps_by_a_tenth() {
        let mut fish = fish();
        // winit lines up are a DOM delta below zero
        assert!(matches!(fish.handle_window_event(&wheel(1.0)), Out::Configure(_)));
        assert_near(fish.pose().position, Vector3::new(-0.1, -0.1, -0.1));
        fish.handle_window_event(&wheel(-1.0));
        fish.handle_window_event(&wheel(-1.0));
        assert_near(fish.pose().position, Vector3::new(0.1, 0.1, 0.1));
    }

    #[test]
    fn wheel_after_scrolling_steps_from_the_scrolled_pose() {
        let mut fish = fish();
        fish.handle_page_event(&scrolled(600.0));
        let before = fish.pose().position;
        fish.handle_window_event(&wheel(-1.0));
        assert_near(fish.pose().position - before, Vector3::new(0.1, 0.1, 0.1));
    }

    #[test]
    fn page_scroll_moves_the_model_and_the_camera() {
        let mut fish = fish();
        assert!(matches!(fish.handle_page_event(&scrolled(600.0)), Out::Configure(_)));
        assert_near(fish.pose().position, Vector3::new(5.0, 2.5, -5.0));
        assert_near(
            fish.pose().rotation,
            Vector3::new(std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2, 0.0),
        );

        let mut empty = FishViewer::empty(&ViewerConfig::default());
        assert!(matches!(empty.handle_page_event(&scrolled(600.0)), Out::Empty));
    }
}
