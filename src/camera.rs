//! Perspective camera, projection and orbit controls.
//!
//! The camera is stored as a position plus yaw/pitch so that "look at" and
//! orbiting only have to recompute two angles. [`Projection`] owns the
//! aspect ratio and is resized by the engine whenever the surface changes.

use std::f32::consts::{FRAC_PI_2, PI};

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, perspective};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::config::OrbitConfig;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f32>,
    yaw: Rad<f32>,
    pitch: Rad<f32>,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
        }
    }

    /// Unit vector the camera is looking along.
    pub fn forward(&self) -> Vector3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
    }

    /// Turns the camera towards `target` without moving it.
    ///
    /// Does nothing when the target coincides with the camera position.
    pub fn look_at(&mut self, target: Point3<f32>) {
        let dir = target - self.position;
        if dir.magnitude2() <= f32::EPSILON {
            return;
        }
        let horizontal = (dir.x * dir.x + dir.z * dir.z).sqrt();
        self.yaw = Rad(dir.z.atan2(dir.x));
        self.pitch = Rad(dir.y.atan2(horizontal).clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2));
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }
}

#[derive(Debug, Clone)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Orbits the camera around a target on left mouse drag.
///
/// The camera offset from the target is kept in spherical coordinates.
/// Drag input accumulates into a pending delta that is consumed by
/// [`OrbitControls::update`]; with damping only a fraction of the delta is
/// applied per frame and the rest decays.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub enabled: bool,
    pub target: Point3<f32>,
    enable_damping: bool,
    damping_factor: f32,
    enable_zoom: bool,
    rotate_speed: f32,
    zoom_speed: f32,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
    viewport_height: f32,
    delta_theta: f32,
    delta_phi: f32,
    zoom_scale: f32,
}

impl OrbitControls {
    pub fn new(config: &OrbitConfig) -> Self {
        Self {
            enabled: config.enabled,
            target: Point3::new(0.0, 0.0, 0.0),
            enable_damping: config.enable_damping,
            damping_factor: config.damping_factor,
            enable_zoom: config.enable_zoom,
            rotate_speed: config.rotate_speed,
            zoom_speed: config.zoom_speed,
            dragging: false,
            last_cursor: None,
            viewport_height: 1.0,
            delta_theta: 0.0,
            delta_phi: 0.0,
            zoom_scale: 1.0,
        }
    }

    pub fn resize(&mut self, height: u32) {
        self.viewport_height = height.max(1) as f32;
    }

    /// Feeds a pointer move in pixels.
    pub fn drag(&mut self, dx: f32, dy: f32) {
        let full_turn = 2.0 * PI * self.rotate_speed / self.viewport_height;
        self.delta_theta -= dx * full_turn;
        self.delta_phi -= dy * full_turn;
    }

    /// Positive `amount` zooms in.
    pub fn zoom(&mut self, amount: f32) {
        if !self.enable_zoom || amount == 0.0 {
            return;
        }
        let step = 0.95f32.powf(self.zoom_speed);
        if amount > 0.0 {
            self.zoom_scale *= step;
        } else {
            self.zoom_scale /= step;
        }
    }

    pub fn handle_window_events(&mut self, event: &WindowEvent) {
        if !self.enabled {
            return;
        }
        match event {
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.dragging = *state == ElementState::Pressed;
                if !self.dragging {
                    self.last_cursor = None;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.dragging {
                    if let Some((x, y)) = self.last_cursor {
                        self.drag((position.x - x) as f32, (position.y - y) as f32);
                    }
                    self.last_cursor = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                self.zoom(scroll);
            }
            _ => (),
        }
    }

    /// Applies pending rotation and zoom to `camera` and points it at the target.
    pub fn update(&mut self, camera: &mut Camera) {
        if !self.enabled {
            return;
        }
        let offset = camera.position - self.target;
        let mut radius = offset.magnitude();
        if radius <= f32::EPSILON {
            return;
        }
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        let factor = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.delta_theta * factor;
        phi += self.delta_phi * factor;
        phi = phi.clamp(0.000001, PI - 0.000001);
        radius *= self.zoom_scale;

        let sin_phi = phi.sin();
        let offset = Vector3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        camera.position = self.target + offset;
        camera.look_at(self.target);

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
        }
        self.zoom_scale = 1.0;
    }
}

/// Camera state plus the GPU objects that feed it to the shaders.
#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controls: OrbitControls,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}
