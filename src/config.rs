//! Viewer configuration.
//!
//! [`ViewerConfig`] bundles every tunable of the two viewer scenes: camera
//! frustum, lights, per-input motion factors and asset locations. The
//! defaults reproduce the stock look of the viewer, so most callers only
//! ever use `ViewerConfig::default()` and tweak single fields.

use std::{f32::consts::PI, fmt, str::FromStr};

/// Which scene the viewer shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SceneKind {
    /// A unit cube spinning around its X and Y axes.
    Cube,
    /// The textured, animated fish model driven by wheel, scroll and touch.
    #[default]
    Fish,
}

impl FromStr for SceneKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cube" => Ok(SceneKind::Cube),
            "fish" | "bumplefish" => Ok(SceneKind::Fish),
            other => Err(anyhow::anyhow!(
                "unknown scene '{}', expected 'cube' or 'fish'",
                other
            )),
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneKind::Cube => f.write_str("cube"),
            SceneKind::Fish => f.write_str("fish"),
        }
    }
}

/// How far the animation mixer advances per rendered frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationClock {
    /// Advance by a constant number of seconds each frame, independent of frame time.
    Fixed(f32),
    /// Advance by the real time elapsed since the previous frame.
    Elapsed,
}

impl AnimationClock {
    pub fn step(&self, dt: instant::Duration) -> f32 {
        match self {
            AnimationClock::Fixed(step) => *step,
            AnimationClock::Elapsed => dt.as_secs_f32(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub fovy_degrees: f32,
    pub znear: f32,
    pub zfar: f32,
    pub position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fovy_degrees: 75.0,
            znear: 0.1,
            zfar: 1000.0,
            position: [0.0, 0.0, 5.0],
        }
    }
}

#[derive(Clone, Debug)]
pub struct LightConfig {
    pub position: [f32; 3],
    pub colour: u32,
    pub intensity: f32,
    pub ambient: u32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            position: [10.0, 10.0, 10.0],
            colour: 0xffffff,
            intensity: 1.0,
            ambient: 0x404040,
        }
    }
}

/// Orbit controls map a mouse drag to a camera orbit around the origin.
#[derive(Clone, Debug)]
pub struct OrbitConfig {
    pub enabled: bool,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_zoom: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enable_damping: true,
            damping_factor: 0.25,
            enable_zoom: false,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CubeConfig {
    pub colour: u32,
    pub size: f32,
    /// Radians added to the X and Y rotation every frame.
    pub spin_per_frame: f32,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            colour: 0x44aa88,
            size: 1.0,
            spin_per_frame: 0.01,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FishConfig {
    /// Model path relative to the asset root.
    pub model: String,
    /// Texture that replaces the map of every mesh material once the model is loaded.
    pub texture_override: Option<String>,
    pub position: [f32; 3],
    /// Euler angles (XYZ order) in radians.
    pub rotation: [f32; 3],
    pub clock: AnimationClock,
}

impl Default for FishConfig {
    fn default() -> Self {
        Self {
            model: "bumplefish/untitled.gltf".to_string(),
            texture_override: Some("bumplefish/gltf_embedded_0.png".to_string()),
            position: [0.0, 0.0, 0.0],
            rotation: [0.5, 1.5, 0.0],
            clock: AnimationClock::Fixed(0.01),
        }
    }
}

/// Wheel nudges move the model a fixed step per notch, only the sign of the delta counts.
#[derive(Clone, Debug)]
pub struct WheelConfig {
    pub movement_factor: f32,
    pub max_movement: f32,
    pub rotation_factor: f32,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            movement_factor: 0.1,
            max_movement: 1.0,
            rotation_factor: 0.01,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TouchConfig {
    pub movement_speed: f32,
    pub rotation_speed: f32,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            movement_speed: 0.01,
            rotation_speed: 0.005,
        }
    }
}

/// Page scroll sets the pose absolutely: `value = scale * scroll_fraction`.
#[derive(Clone, Debug)]
pub struct ScrollConfig {
    pub position_scale: [f32; 3],
    /// Scales for the X and Y rotation. Z rotation is left alone.
    pub rotation_scale: [f32; 2],
    /// Height of the emulated page in viewport heights (native only).
    pub virtual_pages: f32,
    /// Whether the canvas swallows wheel and touch events (web only). The
    /// page behind the canvas only scrolls when this is off.
    pub canvas_captures_input: bool,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            position_scale: [10.0, 5.0, -10.0],
            rotation_scale: [PI, PI],
            virtual_pages: 3.0,
            canvas_captures_input: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ViewerConfig {
    pub scene: SceneKind,
    pub clear_colour: u32,
    pub camera: CameraConfig,
    pub light: LightConfig,
    pub orbit: OrbitConfig,
    pub cube: CubeConfig,
    pub fish: FishConfig,
    pub wheel: WheelConfig,
    pub touch: TouchConfig,
    pub scroll: ScrollConfig,
}

impl ViewerConfig {
    pub fn for_scene(scene: SceneKind) -> Self {
        Self {
            scene,
            ..Default::default()
        }
    }
}

/// Converts a `0xRRGGBB` sRGB colour into linear RGBA floats.
pub fn hex_to_linear(hex: u32) -> [f32; 4] {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xff) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    [channel(16), channel(8), channel(0), 1.0]
}

pub fn hex_to_wgpu_colour(hex: u32) -> wgpu::Color {
    let [r, g, b, a] = hex_to_linear(hex);
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: a as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scene_names() {
        assert_eq!("cube".parse::<SceneKind>().unwrap(), SceneKind::Cube);
        assert_eq!(" Fish ".parse::<SceneKind>().unwrap(), SceneKind::Fish);
        assert_eq!("BUMPLEFISH".parse::<SceneKind>().unwrap(), SceneKind::Fish);
        assert!("teapot".parse::<SceneKind>().is_err());
    }

    #[test]
    fn defaults_match_stock_viewer() {
        let config = ViewerConfig::default();
        assert_eq!(config.camera.fovy_degrees, 75.0);
        assert_eq!(config.camera.position, [0.0, 0.0, 5.0]);
        assert_eq!(config.fish.rotation, [0.5, 1.5, 0.0]);
        assert_eq!(config.fish.clock, AnimationClock::Fixed(0.01));
        assert!(!config.orbit.enabled);
        assert!(!config.orbit.enable_zoom);
        assert!(!config.scroll.canvas_captures_input, "the page must stay scrollable");
    }

    #[test]
    fn fixed_clock_ignores_frame_time() {
        let clock = AnimationClock::Fixed(0.01);
        assert_eq!(clock.step(instant::Duration::from_millis(250)), 0.01);
        let clock = AnimationClock::Elapsed;
        assert!((clock.step(instant::Duration::from_millis(250)) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn converts_hex_to_linear() {
        assert_eq!(hex_to_linear(0xffffff), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(hex_to_linear(0x000000), [0.0, 0.0, 0.0, 1.0]);
        let [r, g, b, _] = hex_to_linear(0x44aa88);
        assert!(r < g && b < g);
        assert!((g - 0.402).abs() < 0.01);
    }
}
