#![cfg(feature = "integration-tests")]

use bumplefish::{
    config::ViewerConfig,
    context::Context,
    flow::ImageTestResult,
    viewers::fish,
};
use wgpu::Color;

use crate::common::test_utils::{Frame, run_image_test};

mod common;

// The fish viewer carries on without a model when the file is missing.
#[test]
fn should_render_clear_colour_without_a_model() {
    let mut viewer = ViewerConfig::default();
    viewer.fish.model = "does/not/exist.gltf".to_string();

    run_image_test(
        fish::constructor(),
        viewer,
        |ctx: &mut Context| ctx.clear_colour = Color::WHITE,
        |frames: u32, _: &Context, texture: &Frame| {
            if frames == 0 {
                return Ok(ImageTestResult::Waiting);
            }
            let white = image::Rgba([255, 255, 255, 255]);
            for pixel in texture.pixels() {
                assert_eq!(*pixel, white);
            }
            Ok(ImageTestResult::Passed)
        },
    );
}
