#![cfg(feature = "integration-tests")]

use bumplefish::{
    config::ViewerConfig,
    context::Context,
    flow::ImageTestResult,
    viewers::fish,
};

use crate::common::test_utils::{Frame, centre_pixel, run_image_test, to_rgba};

mod common;

// A small red quad bound to a single bone two units to the right. The quad's
// own node sits below the origin, which a skinned mesh must ignore.
#[test]
fn should_draw_skinned_meshes_at_their_joints() {
    let mut viewer = ViewerConfig::default();
    viewer.fish.model = "tests/skinned_quad.gltf".to_string();
    viewer.fish.texture_override = None;
    viewer.fish.rotation = [0.0; 3];

    run_image_test(
        fish::constructor(),
        viewer,
        |_: &mut Context| {},
        |frames: u32, ctx: &Context, texture: &Frame| {
            if frames < 3 {
                return Ok(ImageTestResult::Waiting);
            }
            let centre = to_rgba(ctx, centre_pixel(ctx, texture));

            // project the bone at (2, 0, 0) seen from (0, 0, 5) with a 75 degree field of view
            let (width, height) = (ctx.config.width as f32, ctx.config.height as f32);
            let half_extent = 5.0 * 37.5_f32.to_radians().tan() * width / height;
            let x = (width / 2.0 * (1.0 + 2.0 / half_extent)) as u32;
            let bone = to_rgba(ctx, *texture.get_pixel(x, ctx.config.height / 2));

            let red = |[r, g, b, _]: [u8; 4]| r > 100 && g < 30 && b < 30;
            if red(bone) && !red(centre) {
                Ok(ImageTestResult::Passed)
            } else {
                println!("pixel at the bone is {:?}, centre pixel is {:?}", bone, centre);
                Ok(ImageTestResult::Failed)
            }
        },
    );
}
