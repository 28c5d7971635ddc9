//! Scene graph and hierarchical scene organization.
//!
//! A loaded model is a tree of [`SceneNode`]s. Each node owns a local
//! transform and caches its world transform, which is recomputed top-down by
//! [`SceneNode::update_world_transforms`]. Nodes created from glTF keep their
//! source node index so animation channels and skins can find them again.

use std::collections::HashMap;

use cgmath::Matrix4;
use log::warn;
use wgpu::{Device, util::DeviceExt};

use crate::{
    data_structures::{
        instance::{Instance, InstanceRaw},
        model::{self, Material},
        skin::{Skin, SkinResources, SkinUniform},
    },
    render::{Instanced, Render},
    resources::animation::TransformPatch,
};

pub trait SceneNode {
    /// Index of the glTF node this scene node was created from, if any.
    fn node_index(&self) -> Option<usize>;

    fn get_local_transform(&self) -> &Instance;

    fn set_local_transform(&mut self, instance: Instance);

    fn get_world_transform(&self) -> &Instance;

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>>;

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>>;

    fn add_child(&mut self, child: Box<dyn SceneNode>);

    /// Recomputes `world = parent * local` for this node and all descendants.
    fn update_world_transforms(&mut self, parents_world_transform: &Instance);

    /// Uploads world transforms of this node and all descendants.
    fn write_to_buffers(&mut self, queue: &wgpu::Queue);

    /// Recomputes this node's joint matrices from the joints' world matrices.
    fn update_skin(&mut self, _joint_worlds: &HashMap<usize, Matrix4<f32>>) {}

    /// Materials drawn by this node itself (not its children).
    fn get_materials_mut(&mut self) -> &mut [Material];

    fn get_render(&self) -> Vec<Instanced<'_>>;
}

/// Calls `f` on `node` and then on every descendant, depth first.
pub fn traverse_mut(node: &mut dyn SceneNode, f: &mut dyn FnMut(&mut dyn SceneNode)) {
    f(node);
    for child in node.get_children_mut().iter_mut() {
        traverse_mut(child.as_mut(), f);
    }
}

pub fn find_by_index_mut(node: &mut dyn SceneNode, index: usize) -> Option<&mut dyn SceneNode> {
    if node.node_index() == Some(index) {
        return Some(node);
    }
    node.get_children_mut()
        .iter_mut()
        .find_map(|child| find_by_index_mut(child.as_mut(), index))
}

/// World matrices of every node in the tree that came from glTF, by node index.
pub fn world_matrices(node: &dyn SceneNode) -> HashMap<usize, Matrix4<f32>> {
    fn collect(node: &dyn SceneNode, worlds: &mut HashMap<usize, Matrix4<f32>>) {
        if let Some(index) = node.node_index() {
            worlds.insert(index, node.get_world_transform().to_matrix());
        }
        for child in node.get_children() {
            collect(child.as_ref(), worlds);
        }
    }
    let mut worlds = HashMap::new();
    collect(node, &mut worlds);
    worlds
}

/// Poses every skin in the tree. Call after the world transforms are up to date.
pub fn update_skins(root: &mut dyn SceneNode) {
    let worlds = world_matrices(root);
    traverse_mut(root, &mut |node: &mut dyn SceneNode| node.update_skin(&worlds));
}

/// Writes sampled animation values into the local transforms of the targeted nodes.
///
/// Patches for node indices that are not part of the tree are skipped.
pub fn apply_patches(root: &mut dyn SceneNode, patches: &[(usize, TransformPatch)]) {
    for (index, patch) in patches {
        match find_by_index_mut(root, *index) {
            Some(node) => {
                let mut local = node.get_local_transform().clone();
                patch.apply(&mut local);
                node.set_local_transform(local);
            }
            None => warn!("Animation targets node {} which is not in the scene.", index),
        }
    }
}

impl<'a> From<&'a dyn SceneNode> for Render<'a> {
    fn from(sn: &'a dyn SceneNode) -> Self {
        Render::Defaults(sn.get_render())
    }
}

/// A transform-only node that groups its children.
pub struct ContainerNode {
    pub children: Vec<Box<dyn SceneNode>>,
    node_index: Option<usize>,
    local: Instance,
    world: Instance,
}

impl ContainerNode {
    pub fn new(node_index: Option<usize>) -> Self {
        Self {
            children: vec![],
            node_index,
            local: Instance::default(),
            world: Instance::default(),
        }
    }
}

impl SceneNode for ContainerNode {
    fn node_index(&self) -> Option<usize> {
        self.node_index
    }

    fn get_local_transform(&self) -> &Instance {
        &self.local
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.local = instance;
    }

    fn get_world_transform(&self) -> &Instance {
        &self.world
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.children.push(child);
    }

    fn update_world_transforms(&mut self, parents_world_transform: &Instance) {
        self.world = parents_world_transform * &self.local;
        for child in self.children.iter_mut() {
            child.update_world_transforms(&self.world);
        }
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue) {
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue));
    }

    fn get_materials_mut(&mut self) -> &mut [Material] {
        &mut []
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .collect()
    }
}

/// A node that draws a model with its own world transform, optionally bent by a skin.
pub struct ModelNode {
    children: Vec<Box<dyn SceneNode>>,
    instance_buffer: wgpu::Buffer,
    node_index: Option<usize>,
    local: Instance,
    world: Instance,
    model: model::Model,
    skin: Option<Skin>,
    skin_resources: SkinResources,
}

impl ModelNode {
    pub fn from_model(node_index: Option<usize>, device: &Device, model: model::Model) -> Self {
        let world = Instance::default();
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: bytemuck::cast_slice(&[world.to_raw()]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            children: vec![],
            instance_buffer,
            node_index,
            local: Instance::default(),
            world,
            model,
            skin: None,
            skin_resources: SkinResources::new(device),
        }
    }

    pub fn with_skin(mut self, skin: Skin) -> Self {
        self.skin = Some(skin);
        self
    }
}

impl SceneNode for ModelNode {
    fn node_index(&self) -> Option<usize> {
        self.node_index
    }

    fn get_local_transform(&self) -> &Instance {
        &self.local
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.local = instance;
    }

    fn get_world_transform(&self) -> &Instance {
        &self.world
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.children.push(child);
    }

    fn update_world_transforms(&mut self, parents_world_transform: &Instance) {
        self.world = parents_world_transform * &self.local;
        for child in self.children.iter_mut() {
            child.update_world_transforms(&self.world);
        }
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue) {
        let raw: [InstanceRaw; 1] = [self.world.to_raw()];
        queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&raw));
        if self.skin.is_some() {
            self.skin_resources.write(queue);
        }
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue));
    }

    fn update_skin(&mut self, joint_worlds: &HashMap<usize, Matrix4<f32>>) {
        if let Some(skin) = &self.skin {
            let matrices = skin.joint_matrices(&self.world.to_matrix(), joint_worlds);
            self.skin_resources.uniform = SkinUniform::from_matrices(&matrices);
        }
    }

    fn get_materials_mut(&mut self) -> &mut [Material] {
        &mut self.model.materials
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .chain([Instanced {
                instance: &self.instance_buffer,
                model: &self.model,
                skin: &self.skin_resources.bind_group,
                amount: 1,
            }])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, InnerSpace, Quaternion, Rotation3, Vector3};

    fn container(index: usize, position: [f32; 3]) -> Box<ContainerNode> {
        let mut node = ContainerNode::new(Some(index));
        node.set_local_transform(Instance::from(Vector3::from(position)));
        Box::new(node)
    }

    #[test]
    fn world_transforms_compose_down_the_tree() {
        let mut root = container(0, [1.0, 0.0, 0.0]);
        root.local.rotation = Quaternion::from_angle_z(Deg(90.0));
        let mut child = container(1, [1.0, 0.0, 0.0]);
        child.add_child(container(2, [0.0, 0.0, 3.0]));
        root.add_child(child);

        root.update_world_transforms(&Instance::default());

        let child = &root.get_children()[0];
        let grandchild = &child.get_children()[0];
        // the child's +X offset is rotated onto +Y by the root
        assert!((child.get_world_transform().position - Vector3::new(1.0, 1.0, 0.0)).magnitude() < 1e-5);
        assert!((grandchild.get_world_transform().position - Vector3::new(1.0, 1.0, 3.0)).magnitude() < 1e-5);
    }

    #[test]
    fn finds_nodes_by_gltf_index() {
        let mut root = container(0, [0.0; 3]);
        let mut child = container(4, [0.0; 3]);
        child.add_child(container(7, [2.0, 0.0, 0.0]));
        root.add_child(child);

        let found = find_by_index_mut(root.as_mut(), 7).map(|n| n.get_local_transform().position);
        assert_eq!(found, Some(Vector3::new(2.0, 0.0, 0.0)));
        assert!(find_by_index_mut(root.as_mut(), 3).is_none());
    }

    #[test]
    fn patches_only_touch_sampled_channels() {
        let mut root = container(0, [0.0; 3]);
        root.add_child(container(1, [5.0, 0.0, 0.0]));
        let patch = TransformPatch {
            rotation: Some(Quaternion::from_angle_y(Deg(45.0))),
            ..Default::default()
        };

        apply_patches(root.as_mut(), &[(1, patch), (9, TransformPatch::default())]);

        let node = root.get_children()[0].get_local_transform();
        assert_eq!(node.position, Vector3::new(5.0, 0.0, 0.0));
        assert_eq!(node.rotation, Quaternion::from_angle_y(Deg(45.0)));
    }

    #[test]
    fn traversal_visits_every_node() {
        let mut root = container(0, [0.0; 3]);
        let mut child = container(1, [0.0; 3]);
        child.add_child(container(2, [0.0; 3]));
        root.add_child(child);
        root.add_child(container(3, [0.0; 3]));

        let mut visited = Vec::new();
        traverse_mut(root.as_mut(), &mut |node: &mut dyn SceneNode| {
            visited.push(node.node_index())
        });
        assert_eq!(visited, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn world_matrices_are_keyed_by_gltf_index() {
        let mut root = ContainerNode::new(None);
        let mut hip = container(2, [0.0, 1.0, 0.0]);
        hip.add_child(container(5, [0.0, 0.0, 2.0]));
        root.add_child(hip);
        root.set_local_transform(Instance::from(Vector3::new(3.0, 0.0, 0.0)));
        root.update_world_transforms(&Instance::default());

        let worlds = world_matrices(&root);
        assert_eq!(worlds.len(), 2, "nodes without an index are left out");
        assert_eq!(worlds[&5].w.truncate(), Vector3::new(3.0, 1.0, 2.0));
    }
}
