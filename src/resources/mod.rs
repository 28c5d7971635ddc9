use std::io::{BufReader, Cursor};

use anyhow::{Context as _, bail};
use log::{debug, warn};

use crate::{
    data_structures::{
        instance::Instance,
        model::{self, MaterialUniform, ModelVertex},
        scene_graph::{ContainerNode, ModelNode, SceneNode},
        skin::Skin,
        texture::Texture,
    },
    resources::{
        animation::{AnimationClip, Channel, Keyframes},
        texture::{load_binary, load_texture, material_layout},
    },
};

/**
 * This module contains all logic for loading meshes, textures and animations from external files.
 */
pub mod animation;
pub mod texture;

/// A glTF scene turned into a scene graph plus the animation clips that drive it.
pub struct LoadedModel {
    pub root: Box<dyn SceneNode>,
    pub clips: Vec<AnimationClip>,
}

/// Resolves `uri` against the directory of `file_name`, both relative to the asset root.
fn relative_to(file_name: &str, uri: &str) -> String {
    match file_name.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, uri),
        None => uri.to_string(),
    }
}

fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

fn mime_extension(mime_type: &str) -> Option<&str> {
    mime_type.split('/').next_back()
}

pub async fn load_model_gltf(
    file_name: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<LoadedModel> {
    let gltf_text = load_binary(file_name).await?;
    let gltf_cursor = Cursor::new(gltf_text);
    let gltf_reader = BufReader::new(gltf_cursor);
    let gltf = gltf::Gltf::from_reader(gltf_reader)
        .with_context(|| format!("{} is not a valid glTF file", file_name))?;

    // Load buffers
    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    for buffer in gltf.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => match gltf.blob.as_deref() {
                Some(blob) => blob.to_vec(),
                None => bail!("{} references a binary chunk it does not contain", file_name),
            },
            gltf::buffer::Source::Uri(uri) if is_data_uri(uri) => {
                gltf::buffer::Data::from_source(buffer.source(), None)?.0
            }
            gltf::buffer::Source::Uri(uri) => load_binary(&relative_to(file_name, uri)).await?,
        };
        buffer_data.push(data);
    }

    let clips = load_clips(&gltf, &buffer_data);

    // Load materials; the last entry is the fallback for primitives without one
    let layout = material_layout(device);
    let mut materials = Vec::new();
    for material in gltf.materials() {
        let pbr = material.pbr_metallic_roughness();
        let name = material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} material {:?}", file_name, material.index()));
        let diffuse_texture = match pbr.base_color_texture() {
            Some(info) => {
                if info.tex_coord() != 0 {
                    warn!("Material {} uses texture coordinate set {}, only set 0 is read.", name, info.tex_coord());
                }
                load_image(info.texture().source(), file_name, &buffer_data, device, queue).await?
            }
            None => Texture::create_solid([255; 4], &name, device, queue)?,
        };
        let uniform = MaterialUniform::new(pbr.base_color_factor(), false);
        materials.push(model::Material::new(device, &name, diffuse_texture, uniform, &layout));
    }
    let fallback = materials.len();
    materials.push(model::Material::new(
        device,
        "default material",
        Texture::create_solid([255; 4], "default material", device, queue)?,
        MaterialUniform::new([1.0; 4], false),
        &layout,
    ));

    let scene = match gltf.default_scene().or_else(|| gltf.scenes().next()) {
        Some(scene) => scene,
        None => bail!("{} contains no scene", file_name),
    };
    let mut models = Vec::new();
    for node in scene.nodes() {
        models.push(to_scene_node(node, &buffer_data, device, &materials, fallback)?);
    }

    let root = if models.len() == 1 {
        models.remove(0)
    } else {
        let mut root_node = ContainerNode::new(None);
        root_node.children = models;
        Box::new(root_node)
    };
    debug!("Loaded {} with {} animation clip(s)", file_name, clips.len());

    Ok(LoadedModel { root, clips })
}

async fn load_image(
    gltf_image: gltf::Image<'_>,
    file_name: &str,
    buffer_data: &[Vec<u8>],
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<Texture> {
    match gltf_image.source() {
        gltf::image::Source::View { view, mime_type } => {
            let start = view.offset();
            let end = start + view.length();
            let bytes = buffer_data
                .get(view.buffer().index())
                .and_then(|buffer| buffer.get(start..end))
                .with_context(|| format!("image view {} is out of bounds", view.index()))?;
            Texture::from_bytes(device, queue, bytes, file_name, mime_extension(mime_type))
        }
        gltf::image::Source::Uri { uri, .. } if is_data_uri(uri) => {
            let data = gltf::image::Data::from_source(gltf_image.source(), None, &[])?;
            let img = match data.format {
                gltf::image::Format::R8G8B8A8 => image::RgbaImage::from_raw(data.width, data.height, data.pixels)
                    .map(image::DynamicImage::ImageRgba8),
                gltf::image::Format::R8G8B8 => image::RgbImage::from_raw(data.width, data.height, data.pixels)
                    .map(image::DynamicImage::ImageRgb8),
                gltf::image::Format::R8 => image::GrayImage::from_raw(data.width, data.height, data.pixels)
                    .map(image::DynamicImage::ImageLuma8),
                other => bail!("embedded image format {:?} is not supported", other),
            };
            let img = img.context("embedded image has fewer pixels than its size")?;
            Texture::from_image(device, queue, &img, Some(file_name))
        }
        gltf::image::Source::Uri { uri, mime_type } => {
            load_texture(
                &relative_to(file_name, uri),
                device,
                queue,
                mime_type.and_then(mime_extension),
            )
            .await
        }
    }
}

fn load_clips(gltf: &gltf::Gltf, buffer_data: &[Vec<u8>]) -> Vec<AnimationClip> {
    let mut clips = Vec::new();
    for animation in gltf.animations() {
        let mut channels = Vec::new();
        for channel in animation.channels() {
            let reader = channel.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
            let timestamps: Vec<f32> = match reader.read_inputs() {
                Some(inputs) => inputs.collect(),
                None => {
                    warn!("No timestamps found in animation channel {}", channel.index());
                    Vec::new()
                }
            };
            let keyframes = match reader.read_outputs() {
                Some(gltf::animation::util::ReadOutputs::Translations(translations)) => {
                    Keyframes::Translation(translations.map(Into::into).collect())
                }
                Some(gltf::animation::util::ReadOutputs::Rotations(rotations)) => {
                    Keyframes::Rotation(rotations.into_f32().map(Into::into).collect())
                }
                Some(gltf::animation::util::ReadOutputs::Scales(scales)) => {
                    Keyframes::Scale(scales.map(Into::into).collect())
                }
                Some(gltf::animation::util::ReadOutputs::MorphTargetWeights(_)) => {
                    warn!("Morph target animations are not supported, channel {} is ignored.", channel.index());
                    Keyframes::Other
                }
                None => {
                    warn!("No keyframes found in animation channel {}", channel.index());
                    Keyframes::Other
                }
            };
            channels.push(Channel::new(
                channel.target().node().index(),
                channel.sampler().interpolation().into(),
                timestamps,
                keyframes,
            ));
        }
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Animation {}", animation.index()));
        clips.push(AnimationClip::new(name, channels));
    }
    clips
}

fn load_skin(skin: gltf::Skin, buffer_data: &[Vec<u8>]) -> anyhow::Result<Skin> {
    let joints = skin.joints().map(|joint| joint.index()).collect();
    let reader = skin.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
    let inverse_bind_matrices = match reader.read_inverse_bind_matrices() {
        Some(matrices) => matrices.map(Into::into).collect(),
        None => Vec::new(),
    };
    Skin::new(joints, inverse_bind_matrices).with_context(|| format!("skin {} cannot be drawn", skin.index()))
}

fn to_scene_node(
    node: gltf::scene::Node,
    buffer_data: &[Vec<u8>],
    device: &wgpu::Device,
    materials: &[model::Material],
    fallback_material: usize,
) -> anyhow::Result<Box<dyn SceneNode>> {
    let mut scene_node: Box<dyn SceneNode> = match node.mesh() {
        Some(mesh) => {
            let mesh_name = mesh.name().unwrap_or("unknown_mesh");
            let mut meshes = Vec::new();
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    warn!("Primitive {} of {} is not a triangle list and is skipped.", primitive.index(), mesh_name);
                    continue;
                }
                let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));

                let mut vertices: Vec<ModelVertex> = match reader.read_positions() {
                    Some(positions) => positions
                        .map(|position| ModelVertex {
                            position,
                            ..Default::default()
                        })
                        .collect(),
                    None => {
                        warn!("Primitive {} of {} has no positions and is skipped.", primitive.index(), mesh_name);
                        continue;
                    }
                };
                if let Some(normals) = reader.read_normals() {
                    vertices
                        .iter_mut()
                        .zip(normals)
                        .for_each(|(vertex, normal)| vertex.normal = normal);
                }
                if let Some(tex_coords) = reader.read_tex_coords(0).map(|v| v.into_f32()) {
                    vertices
                        .iter_mut()
                        .zip(tex_coords)
                        .for_each(|(vertex, tex_coord)| vertex.tex_coords = tex_coord);
                }
                if let Some(joints) = reader.read_joints(0).map(|v| v.into_u16()) {
                    vertices
                        .iter_mut()
                        .zip(joints)
                        .for_each(|(vertex, indices)| vertex.joints = indices.map(u32::from));
                }
                if let Some(weights) = reader.read_weights(0).map(|v| v.into_f32()) {
                    vertices
                        .iter_mut()
                        .zip(weights)
                        .for_each(|(vertex, weights)| vertex.weights = weights);
                }

                let indices: Vec<u32> = match reader.read_indices() {
                    Some(indices) => indices.into_u32().collect(),
                    None => (0..vertices.len() as u32).collect(),
                };
                let material = primitive
                    .material()
                    .index()
                    .filter(|idx| *idx < fallback_material)
                    .unwrap_or(fallback_material);
                meshes.push(model::Mesh::new(device, mesh_name, &vertices, &indices, material));
            }
            let model = model::Model {
                meshes,
                materials: materials.to_vec(),
            };
            let model_node = ModelNode::from_model(Some(node.index()), device, model);
            match node.skin() {
                Some(skin) => Box::new(model_node.with_skin(load_skin(skin, buffer_data)?)),
                None => Box::new(model_node),
            }
        }
        None => Box::new(ContainerNode::new(Some(node.index()))),
    };
    let (position, rotation, scale) = node.transform().decomposed();
    scene_node.set_local_transform(Instance {
        position: position.into(),
        rotation: rotation.into(),
        scale: scale.into(),
    });
    for child in node.children() {
        let child_node = to_scene_node(child, buffer_data, device, materials, fallback_material)?;
        scene_node.add_child(child_node);
    }

    Ok(scene_node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_resolve_next_to_the_model() {
        assert_eq!(relative_to("bumplefish/untitled.gltf", "scene.bin"), "bumplefish/scene.bin");
        assert_eq!(relative_to("untitled.gltf", "scene.bin"), "scene.bin");
    }

    #[test]
    fn mime_types_map_to_extensions() {
        assert_eq!(mime_extension("image/png"), Some("png"));
        assert_eq!(mime_extension("jpeg"), Some("jpeg"));
        assert!(is_data_uri("data:application/octet-stream;base64,AAAA"));
        assert!(!is_data_uri("scene.bin"));
    }
}
