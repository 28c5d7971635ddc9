//! Keyframe animation: clips loaded from glTF and the mixer that plays them.
//!
//! A clip is a set of channels, each animating one property (translation,
//! rotation or scale) of one node. [`AnimationMixer::update`] advances all
//! playing clips and samples them into [`TransformPatch`]es that the scene
//! graph writes into node transforms.

use std::{
    collections::BTreeMap,
    ops::{Add, Mul},
};

use cgmath::{InnerSpace, Quaternion, Vector3, VectorSpace};

use crate::data_structures::instance::Instance;

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
    /// Morph target weights and anything else the scene graph cannot apply.
    Other,
}

impl Keyframes {
    /// Number of stored entries. Cubic spline channels store three per keyframe.
    fn len(&self) -> usize {
        match self {
            Keyframes::Translation(v) | Keyframes::Scale(v) => v.len(),
            Keyframes::Rotation(v) => v.len(),
            Keyframes::Other => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Hermite spline; each keyframe is stored as (in-tangent, value, out-tangent).
    CubicSpline,
}

impl Interpolation {
    fn entries_per_keyframe(self) -> usize {
        match self {
            Interpolation::CubicSpline => 3,
            Interpolation::Step | Interpolation::Linear => 1,
        }
    }
}

impl From<gltf::animation::Interpolation> for Interpolation {
    fn from(value: gltf::animation::Interpolation) -> Self {
        match value {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        }
    }
}

/// Sampled values for one node. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformPatch {
    pub translation: Option<Vector3<f32>>,
    pub rotation: Option<Quaternion<f32>>,
    pub scale: Option<Vector3<f32>>,
}

impl TransformPatch {
    pub fn apply(&self, instance: &mut Instance) {
        if let Some(translation) = self.translation {
            instance.position = translation;
        }
        if let Some(rotation) = self.rotation {
            instance.rotation = rotation;
        }
        if let Some(scale) = self.scale {
            instance.scale = scale;
        }
    }

    fn merge(&mut self, other: TransformPatch) {
        self.translation = other.translation.or(self.translation);
        self.rotation = other.rotation.or(self.rotation);
        self.scale = other.scale.or(self.scale);
    }
}

#[derive(Clone, Debug)]
pub struct Channel {
    pub node: usize,
    pub interpolation: Interpolation,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
}

impl Channel {
    pub fn new(
        node: usize,
        interpolation: Interpolation,
        timestamps: Vec<f32>,
        keyframes: Keyframes,
    ) -> Self {
        let count = keyframes.len() / interpolation.entries_per_keyframe();
        if count != timestamps.len() {
            log::warn!(
                "Channel for node {} has {} timestamps but {} keyframes; extra entries are ignored.",
                node,
                timestamps.len(),
                count
            );
        }
        Self {
            node,
            interpolation,
            timestamps,
            keyframes,
        }
    }

    pub fn duration(&self) -> f32 {
        self.timestamps.last().copied().unwrap_or(0.0)
    }

    /// The keyframes around `time`.
    fn locate(&self, time: f32) -> Option<Segment> {
        let count = self.keyframes.len() / self.interpolation.entries_per_keyframe();
        let len = self.timestamps.len().min(count);
        if len == 0 {
            return None;
        }
        let ts = &self.timestamps[..len];
        let hold = |idx: usize| Segment {
            prev: idx,
            next: idx,
            factor: 0.0,
            span: 0.0,
        };
        if time <= ts[0] {
            return Some(hold(0));
        }
        if time >= ts[len - 1] {
            return Some(hold(len - 1));
        }
        let next = ts.partition_point(|&t| t <= time);
        let prev = next - 1;
        let span = ts[next] - ts[prev];
        let factor = if span > 0.0 {
            (time - ts[prev]) / span
        } else {
            0.0
        };
        match self.interpolation {
            Interpolation::Step => Some(hold(prev)),
            Interpolation::Linear | Interpolation::CubicSpline => Some(Segment {
                prev,
                next,
                factor,
                span,
            }),
        }
    }

    pub fn sample(&self, time: f32) -> TransformPatch {
        let Some(segment) = self.locate(time) else {
            return TransformPatch::default();
        };
        let cubic = self.interpolation == Interpolation::CubicSpline;
        match &self.keyframes {
            Keyframes::Translation(v) if cubic => TransformPatch {
                translation: Some(segment.hermite(v)),
                ..Default::default()
            },
            Keyframes::Translation(v) => TransformPatch {
                translation: Some(v[segment.prev].lerp(v[segment.next], segment.factor)),
                ..Default::default()
            },
            Keyframes::Rotation(v) if cubic => TransformPatch {
                rotation: Some(segment.hermite(v).normalize()),
                ..Default::default()
            },
            Keyframes::Rotation(v) => TransformPatch {
                rotation: Some(slerp_shortest(v[segment.prev], v[segment.next], segment.factor)),
                ..Default::default()
            },
            Keyframes::Scale(v) if cubic => TransformPatch {
                scale: Some(segment.hermite(v)),
                ..Default::default()
            },
            Keyframes::Scale(v) => TransformPatch {
                scale: Some(v[segment.prev].lerp(v[segment.next], segment.factor)),
                ..Default::default()
            },
            Keyframes::Other => TransformPatch::default(),
        }
    }
}

/// Two neighbouring keyframes, how far `time` is between them and their distance in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Segment {
    prev: usize,
    next: usize,
    factor: f32,
    span: f32,
}

impl Segment {
    /// Cubic Hermite interpolation over (in-tangent, value, out-tangent) triples.
    fn hermite<T>(&self, v: &[T]) -> T
    where
        T: Copy + Add<Output = T> + Mul<f32, Output = T>,
    {
        let value = |k: usize| v[3 * k + 1];
        if self.prev == self.next {
            return value(self.prev);
        }
        let out_tangent = v[3 * self.prev + 2];
        let in_tangent = v[3 * self.next];
        let s = self.factor;
        let (s2, s3) = (s * s, s * s * s);
        value(self.prev) * (2.0 * s3 - 3.0 * s2 + 1.0)
            + out_tangent * ((s3 - 2.0 * s2 + s) * self.span)
            + value(self.next) * (-2.0 * s3 + 3.0 * s2)
            + in_tangent * ((s3 - s2) * self.span)
    }
}

fn slerp_shortest(a: Quaternion<f32>, b: Quaternion<f32>, t: f32) -> Quaternion<f32> {
    if t <= 0.0 {
        return a;
    }
    let b = if a.dot(b) < 0.0 { -b } else { b };
    if t >= 1.0 {
        return b;
    }
    a.slerp(b, t).normalize()
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
    pub duration: f32,
}

impl AnimationClip {
    pub fn new(name: String, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .map(Channel::duration)
            .fold(0.0f32, f32::max);
        Self {
            name,
            channels,
            duration,
        }
    }
}

#[derive(Clone, Debug)]
struct ClipAction {
    time: f32,
    playing: bool,
}

/// Plays animation clips on a loaded model. Playing clips loop forever.
#[derive(Clone, Debug, Default)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    actions: Vec<ClipAction>,
}

impl AnimationMixer {
    pub fn new(clips: Vec<AnimationClip>) -> Self {
        let actions = clips
            .iter()
            .map(|_| ClipAction {
                time: 0.0,
                playing: false,
            })
            .collect();
        Self { clips, actions }
    }

    /// Starts the clip with the given name. Returns false if there is none.
    pub fn play(&mut self, name: &str) -> bool {
        match self.clips.iter().position(|clip| clip.name == name) {
            Some(idx) => {
                self.actions[idx].playing = true;
                true
            }
            None => false,
        }
    }

    pub fn play_all(&mut self) {
        self.actions.iter_mut().for_each(|action| action.playing = true);
    }

    /// Local time of the clip at `idx`, if it exists.
    pub fn time(&self, idx: usize) -> Option<f32> {
        self.actions.get(idx).map(|action| action.time)
    }

    /// Advances every playing clip by `dt` seconds and samples all of their channels.
    ///
    /// Patches of several clips targeting the same node are merged, later
    /// clips winning per property. The result is ordered by node index.
    pub fn update(&mut self, dt: f32) -> Vec<(usize, TransformPatch)> {
        let mut patches: BTreeMap<usize, TransformPatch> = BTreeMap::new();
        for (clip, action) in self.clips.iter().zip(self.actions.iter_mut()) {
            if !action.playing {
                continue;
            }
            action.time += dt;
            if clip.duration > 0.0 {
                action.time = action.time.rem_euclid(clip.duration);
            } else {
                action.time = 0.0;
            }
            for channel in &clip.channels {
                patches
                    .entry(channel.node)
                    .or_default()
                    .merge(channel.sample(action.time));
            }
        }
        patches.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Rotation3};

    fn translation_channel(interpolation: Interpolation) -> Channel {
        Channel::new(
            3,
            interpolation,
            vec![0.0, 1.0, 2.0],
            Keyframes::Translation(vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(2.0, 0.0, 0.0),
                Vector3::new(2.0, 4.0, 0.0),
            ]),
        )
    }

    #[test]
    fn linear_sampling_interpolates() {
        let channel = translation_channel(Interpolation::Linear);
        assert_eq!(channel.sample(0.5).translation, Some(Vector3::new(1.0, 0.0, 0.0)));
        assert_eq!(channel.sample(1.5).translation, Some(Vector3::new(2.0, 2.0, 0.0)));
    }

    #[test]
    fn sampling_clamps_outside_the_keyframes() {
        let channel = translation_channel(Interpolation::Linear);
        assert_eq!(channel.sample(-1.0).translation, Some(Vector3::new(0.0, 0.0, 0.0)));
        assert_eq!(channel.sample(9.0).translation, Some(Vector3::new(2.0, 4.0, 0.0)));
    }

    #[test]
    fn step_sampling_holds_previous_value() {
        let channel = translation_channel(Interpolation::Step);
        assert_eq!(channel.sample(0.99).translation, Some(Vector3::new(0.0, 0.0, 0.0)));
        assert_eq!(channel.sample(1.0).translation, Some(Vector3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn cubic_spline_follows_the_tangents() {
        let spline = |out_tangent: f32| {
            Channel::new(
                0,
                Interpolation::CubicSpline,
                vec![0.0, 1.0],
                Keyframes::Scale(vec![
                    Vector3::new(9.0, 9.0, 9.0),
                    Vector3::new(1.0, 1.0, 1.0),
                    Vector3::new(out_tangent, 0.0, 0.0),
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(3.0, 3.0, 3.0),
                    Vector3::new(9.0, 9.0, 9.0),
                ]),
            )
        };
        let scale_x = |channel: &Channel, time: f32| channel.sample(time).scale.map(|s| s.x).unwrap_or(f32::NAN);

        // flat tangents ease in and out instead of moving at a constant rate
        let flat = spline(0.0);
        assert!((scale_x(&flat, 0.25) - 1.3125).abs() < 1e-5);
        assert!((scale_x(&flat, 0.5) - 2.0).abs() < 1e-5);
        assert_eq!(scale_x(&flat, 0.0), 1.0);
        assert_eq!(scale_x(&flat, 1.0), 3.0);

        let steep = spline(4.0);
        assert!((scale_x(&steep, 0.5) - 2.5).abs() < 1e-5);
        assert_eq!(steep.duration(), 1.0);
    }

    #[test]
    fn rotation_takes_the_short_way() {
        let a = Quaternion::from_angle_y(Deg(10.0));
        // same orientation as 30 degrees but on the far side of the hypersphere
        let b = -Quaternion::from_angle_y(Deg(30.0));
        let channel = Channel::new(0, Interpolation::Linear, vec![0.0, 1.0], Keyframes::Rotation(vec![a, b]));
        let mid = channel.sample(0.5).rotation.unwrap();
        let expected = Quaternion::from_angle_y(Deg(20.0));
        assert!(mid.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn empty_channels_sample_nothing() {
        let channel = Channel::new(0, Interpolation::Linear, vec![], Keyframes::Other);
        assert_eq!(channel.sample(0.3), TransformPatch::default());
    }

    #[test]
    fn mixer_loops_playing_clips() {
        let clip = AnimationClip::new("Swim".to_string(), vec![translation_channel(Interpolation::Linear)]);
        assert_eq!(clip.duration, 2.0);
        let mut mixer = AnimationMixer::new(vec![clip]);

        assert!(mixer.update(0.5).is_empty(), "nothing plays before play()");
        mixer.play_all();
        let patches = mixer.update(0.5);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, 3);
        assert_eq!(patches[0].1.translation, Some(Vector3::new(1.0, 0.0, 0.0)));

        mixer.update(2.0);
        assert!((mixer.time(0).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mixer_merges_channels_per_node() {
        let rotation = Channel::new(
            3,
            Interpolation::Linear,
            vec![0.0, 1.0],
            Keyframes::Rotation(vec![Quaternion::from_angle_z(Deg(0.0)); 2]),
        );
        let clip = AnimationClip::new(
            "Idle".to_string(),
            vec![translation_channel(Interpolation::Linear), rotation],
        );
        let mut mixer = AnimationMixer::new(vec![clip]);
        assert!(mixer.play("Idle"));
        assert!(!mixer.play("Jump"));

        let patches = mixer.update(0.25);
        assert_eq!(patches.len(), 1);
        assert!(patches[0].1.translation.is_some());
        assert!(patches[0].1.rotation.is_some());
        assert!(patches[0].1.scale.is_none());
    }

    #[test]
    fn patch_only_overrides_sampled_fields() {
        let mut instance = Instance::from(Vector3::new(1.0, 2.0, 3.0));
        TransformPatch {
            scale: Some(Vector3::new(2.0, 2.0, 2.0)),
            ..Default::default()
        }
        .apply(&mut instance);
        assert_eq!(instance.position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(instance.scale, Vector3::new(2.0, 2.0, 2.0));
    }
}
