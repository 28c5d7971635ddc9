use bumplefish::{SceneKind, ViewerConfig, flow, viewers};

fn main() -> anyhow::Result<()> {
    let scene = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<SceneKind>()?,
        None => SceneKind::default(),
    };
    flow::run(viewers::constructors_for(scene), ViewerConfig::for_scene(scene))
}
