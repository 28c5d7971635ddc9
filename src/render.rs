//! Render composition.
//!
//! Flows describe what they want drawn each frame with a [`Render`]. The
//! engine flattens the tree into one batch for the model pipeline.

use crate::data_structures::model::Model;

/// A model together with the instance buffer holding its world transform(s)
/// and the joint matrices that bend it.
#[derive(Clone)]
pub struct Instanced<'a> {
    pub instance: &'a wgpu::Buffer,
    pub model: &'a Model,
    pub skin: &'a wgpu::BindGroup,
    pub amount: usize,
}

/// Specifies how a flow should be rendered.
///
/// - `None` renders nothing
/// - `Defaults(Vec<Instanced>)` renders a batch of instanced models
/// - `Composed(Vec<Render>)` recursively renders several renders
pub enum Render<'a> {
    None,
    Defaults(Vec<Instanced<'a>>),
    Composed(Vec<Render<'a>>),
}

impl<'a> Render<'a> {
    /// Collects every instanced model into `basics`.
    pub(crate) fn flatten_into(self, basics: &mut Vec<Instanced<'a>>) {
        match self {
            Render::Defaults(mut vec) => basics.append(&mut vec),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.flatten_into(basics)),
            Render::None => (),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Render::None => true,
            Render::Defaults(vec) => vec.is_empty(),
            Render::Composed(renders) => renders.iter().all(Render::is_empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_empty_renders_are_empty() {
        let render: Render<'_> = Render::Composed(vec![
            Render::None,
            Render::Defaults(Vec::new()),
            Render::Composed(vec![Render::None]),
        ]);
        assert!(render.is_empty());
        assert!(Render::None.is_empty());
    }
}
