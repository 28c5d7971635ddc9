//! Procedural geometry.

use crate::data_structures::model::ModelVertex;

/// An axis-aligned box centred on the origin with edge length `size`.
///
/// Every face has its own four vertices so normals stay flat, giving 24
/// vertices and 36 counter-clockwise indices.
pub fn cube(size: f32) -> (Vec<ModelVertex>, Vec<u32>) {
    let h = size / 2.0;
    // normal, then the face's right and up axes (right x up == normal)
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let corners: [([f32; 2], [f32; 2]); 4] = [
        ([-1.0, -1.0], [0.0, 1.0]),
        ([1.0, -1.0], [1.0, 1.0]),
        ([1.0, 1.0], [1.0, 0.0]),
        ([-1.0, 1.0], [0.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, right, up) in faces {
        let base = vertices.len() as u32;
        for ([u, v], tex_coords) in corners {
            let position = [0, 1, 2].map(|i| (normal[i] + right[i] * u + up[i] * v) * h);
            vertices.push(ModelVertex {
                position,
                tex_coords,
                normal,
                ..Default::default()
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector3};

    #[test]
    fn cube_has_flat_faces() {
        let (vertices, indices) = cube(1.0);
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
        for v in &vertices {
            assert!((Vector3::from(v.normal).magnitude() - 1.0).abs() < 1e-6);
            assert!(v.position.iter().all(|c| c.abs() == 0.5));
        }
    }

    #[test]
    fn triangles_wind_outwards() {
        let (vertices, indices) = cube(2.0);
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vector3::from(vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let expected = Vector3::from(vertices[tri[0] as usize].normal);
            assert!((face_normal - expected).magnitude() < 1e-5);
        }
    }
}
