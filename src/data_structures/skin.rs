//! Skeletal skinning.
//!
//! A skinned mesh is bent by a set of joint nodes. Every frame each joint's
//! world transform is turned into a joint matrix in the mesh node's own space,
//! `inverse(mesh_world) * joint_world * inverse_bind`, and the vertex shader
//! blends up to four of them per vertex. Meshes without a skin upload a
//! disabled uniform so every draw binds the same layout.

use std::collections::HashMap;

use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;

/// Joints a single skin may have. Keeps the uniform within WebGL2 limits.
pub const MAX_JOINTS: usize = 64;

/// Joint node indices plus the matrices that move vertices into each joint's space.
#[derive(Clone, Debug, PartialEq)]
pub struct Skin {
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Matrix4<f32>>,
}

impl Skin {
    /// Fails if the skin has more joints than the shader can hold. Missing
    /// inverse bind matrices default to identity.
    pub fn new(joints: Vec<usize>, mut inverse_bind_matrices: Vec<Matrix4<f32>>) -> anyhow::Result<Self> {
        if joints.len() > MAX_JOINTS {
            anyhow::bail!("skin has {} joints, at most {} are supported", joints.len(), MAX_JOINTS);
        }
        inverse_bind_matrices.resize(joints.len(), Matrix4::identity());
        Ok(Self {
            joints,
            inverse_bind_matrices,
        })
    }

    /// Joint matrices relative to the skinned node. Joints whose node is not in
    /// `worlds` keep their bind pose.
    pub fn joint_matrices(
        &self,
        mesh_world: &Matrix4<f32>,
        worlds: &HashMap<usize, Matrix4<f32>>,
    ) -> Vec<Matrix4<f32>> {
        let to_mesh = mesh_world.invert().unwrap_or_else(Matrix4::identity);
        self.joints
            .iter()
            .zip(&self.inverse_bind_matrices)
            .map(|(joint, inverse_bind)| match worlds.get(joint) {
                Some(joint_world) => to_mesh * *joint_world * *inverse_bind,
                None => Matrix4::identity(),
            })
            .collect()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinUniform {
    joints: [[[f32; 4]; 4]; MAX_JOINTS],
    enabled: u32,
    _padding: [u32; 3],
}

impl SkinUniform {
    pub fn disabled() -> Self {
        Self {
            joints: [Matrix4::<f32>::identity().into(); MAX_JOINTS],
            enabled: 0,
            _padding: [0; 3],
        }
    }

    pub fn from_matrices(matrices: &[Matrix4<f32>]) -> Self {
        let mut uniform = Self::disabled();
        for (slot, matrix) in uniform.joints.iter_mut().zip(matrices) {
            *slot = (*matrix).into();
        }
        uniform.enabled = 1;
        uniform
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }
}

pub fn skin_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("skin_bind_group_layout"),
    })
}

/// The GPU side of a node's skin.
#[derive(Debug)]
pub struct SkinResources {
    pub uniform: SkinUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl SkinResources {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform = SkinUniform::disabled();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Skin Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &skin_layout(device),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("skin_bind_group"),
        });
        Self {
            uniform,
            buffer,
            bind_group,
        }
    }

    pub fn write(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, InnerSpace, Matrix4, SquareMatrix, Vector3, Vector4};

    fn close(a: Matrix4<f32>, b: Matrix4<f32>) -> bool {
        let a: [[f32; 4]; 4] = a.into();
        let b: [[f32; 4]; 4] = b.into();
        a.iter().flatten().zip(b.iter().flatten()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn bind_pose_gives_identity_joints() {
        let joint_world = Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0));
        let skin = Skin::new(vec![3], vec![joint_world.invert().unwrap()]).unwrap();
        let worlds = HashMap::from([(3, joint_world)]);
        let matrices = skin.joint_matrices(&Matrix4::identity(), &worlds);
        assert!(close(matrices[0], Matrix4::identity()));
    }

    #[test]
    fn joint_motion_is_relative_to_the_mesh_node() {
        let bind = Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0));
        let skin = Skin::new(vec![1], vec![bind.invert().unwrap()]).unwrap();
        // the whole model moved by +5 X and the joint turned 90 degrees
        let offset = Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0));
        let joint_world = offset * bind * Matrix4::from_angle_z(Deg(90.0));
        let worlds = HashMap::from([(1, joint_world)]);

        let matrices = skin.joint_matrices(&offset, &worlds);
        // a vertex one unit along +X from the joint swings onto +Y
        let vertex = matrices[0] * Vector4::new(1.0, 2.0, 0.0, 1.0);
        assert!((vertex - Vector4::new(0.0, 3.0, 0.0, 1.0)).magnitude() < 1e-5);
    }

    #[test]
    fn missing_inverse_binds_default_to_identity() {
        let skin = Skin::new(vec![0, 1], Vec::new()).unwrap();
        assert_eq!(skin.inverse_bind_matrices, vec![Matrix4::identity(); 2]);
        let matrices = skin.joint_matrices(&Matrix4::identity(), &HashMap::new());
        assert!(matrices.iter().all(|m| close(*m, Matrix4::identity())));
    }

    #[test]
    fn too_many_joints_are_rejected() {
        assert!(Skin::new((0..MAX_JOINTS + 1).collect(), Vec::new()).is_err());
        assert!(Skin::new((0..MAX_JOINTS).collect(), Vec::new()).is_ok());
    }

    #[test]
    fn uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<SkinUniform>(), MAX_JOINTS * 64 + 16);
        assert!(!SkinUniform::disabled().is_enabled());
        assert!(SkinUniform::from_matrices(&[Matrix4::identity()]).is_enabled());
    }
}
