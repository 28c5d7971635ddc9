//! Input handlers that move the model.
//!
//! Each handler mutates a [`ModelPose`] proportionally to an input delta.
//! The pose keeps Euler angles so that handlers can add to single axes; it is
//! converted to an [`Instance`] when written to the scene graph.

use cgmath::{Quaternion, Rad, Rotation3, Vector3};
use winit::event::{Touch, TouchPhase};

use crate::{
    config::{ScrollConfig, TouchConfig, WheelConfig},
    data_structures::instance::Instance,
};

/// Position plus Euler rotation in radians, applied in X, Y, Z order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPose {
    pub position: Vector3<f32>,
    pub rotation: Vector3<f32>,
}

impl ModelPose {
    pub fn new(position: [f32; 3], rotation: [f32; 3]) -> Self {
        Self {
            position: position.into(),
            rotation: rotation.into(),
        }
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        Quaternion::from_angle_x(Rad(self.rotation.x))
            * Quaternion::from_angle_y(Rad(self.rotation.y))
            * Quaternion::from_angle_z(Rad(self.rotation.z))
    }
}

impl From<&ModelPose> for Instance {
    fn from(pose: &ModelPose) -> Self {
        Instance {
            position: pose.position,
            rotation: pose.quaternion(),
            ..Default::default()
        }
    }
}

/// Steps the model along all three axes per wheel event; only the direction of the delta counts.
#[derive(Clone, Debug)]
pub struct WheelNudge {
    movement: f32,
    rotation: f32,
}

impl WheelNudge {
    pub fn new(config: &WheelConfig) -> Self {
        Self {
            movement: config.movement_factor * config.max_movement,
            rotation: config.rotation_factor,
        }
    }

    /// `delta_y` follows the DOM convention: positive when scrolling down.
    /// Anything else, including a zero delta from a horizontal-only wheel
    /// event, steps backwards.
    pub fn apply(&self, pose: &mut ModelPose, delta_y: f32) {
        let direction = if delta_y > 0.0 { 1.0 } else { -1.0 };
        pose.position += Vector3::new(1.0, 1.0, 1.0) * (direction * self.movement);
        pose.rotation += Vector3::new(1.0, 1.0, 1.0) * (direction * self.rotation);
    }
}

/// Maps the page scroll fraction onto an absolute pose.
#[derive(Clone, Debug)]
pub struct ScrollSync {
    position_scale: Vector3<f32>,
    rotation_scale: [f32; 2],
}

impl ScrollSync {
    pub fn new(config: &ScrollConfig) -> Self {
        Self {
            position_scale: config.position_scale.into(),
            rotation_scale: config.rotation_scale,
        }
    }

    /// Overwrites the position and the X/Y rotation. The Z rotation is kept.
    pub fn apply(&self, pose: &mut ModelPose, fraction: f32) {
        pose.position = self.position_scale * fraction;
        pose.rotation.x = self.rotation_scale[0] * fraction;
        pose.rotation.y = self.rotation_scale[1] * fraction;
    }
}

/// Follows a single touch finger and moves the model by the distance travelled.
#[derive(Clone, Debug)]
pub struct TouchDrag {
    movement_speed: f32,
    rotation_speed: f32,
    finger: Option<u64>,
    last: (f32, f32),
}

impl TouchDrag {
    pub fn new(config: &TouchConfig) -> Self {
        Self {
            movement_speed: config.movement_speed,
            rotation_speed: config.rotation_speed,
            finger: None,
            last: (0.0, 0.0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.finger.is_some()
    }

    /// Starts tracking `finger` unless another finger is already tracked.
    pub fn start(&mut self, finger: u64, x: f32, y: f32) {
        if self.finger.is_none() {
            self.finger = Some(finger);
            self.last = (x, y);
        }
    }

    /// Applies the movement since the last sample of the tracked finger.
    pub fn moved(&mut self, pose: &mut ModelPose, finger: u64, x: f32, y: f32) -> bool {
        if self.finger != Some(finger) {
            return false;
        }
        let dx = x - self.last.0;
        let dy = y - self.last.1;
        pose.position.x += dx * self.movement_speed;
        pose.position.y -= dy * self.movement_speed;
        pose.position.z += (dx + dy) * self.movement_speed;
        pose.rotation.x += dy * self.rotation_speed;
        pose.rotation.y += dx * self.rotation_speed;
        self.last = (x, y);
        true
    }

    pub fn end(&mut self, finger: u64) {
        if self.finger == Some(finger) {
            self.finger = None;
        }
    }

    /// Dispatches a winit touch. Returns true if the pose changed.
    pub fn handle_touch(&mut self, pose: &mut ModelPose, touch: &Touch) -> bool {
        let (x, y) = (touch.location.x as f32, touch.location.y as f32);
        match touch.phase {
            TouchPhase::Started => {
                self.start(touch.id, x, y);
                false
            }
            TouchPhase::Moved => self.moved(pose, touch.id, x, y),
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.end(touch.id);
                false
            }
        }
    }
}
