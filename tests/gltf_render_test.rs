#![cfg(feature = "integration-tests")]

use bumplefish::{
    config::ViewerConfig,
    context::Context,
    flow::ImageTestResult,
    viewers::fish,
};

use crate::common::test_utils::{Frame, centre_pixel, run_image_test, to_rgba};

mod common;

// A red quad facing the camera that turns around its normal.
#[test]
fn should_render_an_embedded_animated_gltf() {
    let mut viewer = ViewerConfig::default();
    viewer.fish.model = "tests/quad.gltf".to_string();
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
            let [r, g, b, _] = to_rgba(ctx, centre_pixel(ctx, texture));
            if r > 100 && g < 30 && b < 30 {
                Ok(ImageTestResult::Passed)
            } else {
                println!("centre pixel is {:?}", [r, g, b]);
                Ok(ImageTestResult::Failed)
            }
        },
    );
}
