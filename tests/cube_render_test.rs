#![cfg(feature = "integration-tests")]

use bumplefish::{
    config::{SceneKind, ViewerConfig},
    context::Context,
    flow::ImageTestResult,
    viewers::cube,
};

use crate::common::test_utils::{Frame, centre_pixel, run_image_test, to_rgba};

mod common;

#[test]
fn should_render_the_cube_in_its_colour() {
    run_image_test(
        cube::constructor(),
        ViewerConfig::for_scene(SceneKind::Cube),
        |_: &mut Context| {},
        |frames: u32, ctx: &Context, texture: &Frame| {
            if frames < 3 {
                return Ok(ImageTestResult::Waiting);
            }
            // unlit 0x44aa88 on a black background
            let [r, g, b, _] = to_rgba(ctx, centre_pixel(ctx, texture));
            if g > r && g > b && g > 100 {
                Ok(ImageTestResult::Passed)
            } else {
                println!("centre pixel is {:?}", [r, g, b]);
                Ok(ImageTestResult::Failed)
            }
        },
    );
}
