#![cfg(feature = "integration-tests")]

use bumplefish::{
    WindowEvent,
    config::ViewerConfig,
    context::Context,
    flow::{FlowConsturctor, GraphicsFlow, ImageTestResult, Out},
    render::Render,
};
use wgpu::Color;

#[derive(Default)]
struct State {
    init_invocations: u32,
    update_invocations: u32,
    custom_events: u32,
    served: String,
}

enum Event {
    Ping,
}

struct Lifecycle;

impl GraphicsFlow<State, Event> for Lifecycle {
    fn on_init(&mut self, ctx: &mut Context, state: &mut State) -> Out<State, Event> {
        assert_eq!(state.init_invocations, 0);
        assert_eq!(state.update_invocations, 0);
        state.init_invocations += 1;
        // configured after on_init returns
        assert_eq!(ctx.clear_colour, Color::BLACK);
        Out::Configure(Box::new(|ctx: &mut Context| ctx.clear_colour = Color::BLUE))
    }

    fn on_update(&mut self, _: &Context, state: &mut State, _: instant::Duration) -> Out<State, Event> {
        assert_eq!(state.init_invocations, 1);
        state.update_invocations += 1;

        let serve_sencha: Box<dyn FnOnce(&mut State)> = Box::new(|state: &mut State| state.served.push('s'));
        let serve_mate: Box<dyn FnOnce(&mut State)> = Box::new(|state: &mut State| state.served.push('m'));
        match state.update_invocations {
            3 => Out::FutEvent(vec![Box::new(async move { Event::Ping })]),
            5 => Out::FutFn(vec![
                Box::new(async move { serve_sencha }),
                Box::new(async move { serve_mate }),
            ]),
            _ => Out::Empty,
        }
    }

    fn on_window_events(&mut self, _: &Context, _: &mut State, _: &WindowEvent) -> Out<State, Event> {
        Out::Empty
    }

    fn on_custom_events(&mut self, _: &Context, state: &mut State, event: Event) -> Option<Event> {
        match event {
            Event::Ping => {
                // the event is sent in the third update
                assert!(state.update_invocations >= 3);
                state.custom_events += 1;
                None
            }
        }
    }

    fn on_render(&self) -> Render<'_> {
        Render::None
    }

    fn render_to_texture(
        &self,
        ctx: &Context,
        state: &mut State,
        _: &mut image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>,
    ) -> Result<ImageTestResult, anyhow::Error> {
        assert_eq!(ctx.clear_colour, Color::BLUE);
        if state.update_invocations <= 6 {
            return Ok(ImageTestResult::Waiting);
        }
        assert_eq!(state.custom_events, 1);
        assert_eq!(state.served, "sm");
        Ok(ImageTestResult::Passed)
    }
}

#[test]
fn should_run_every_lifecycle_hook() {
    let constructor: FlowConsturctor<State, Event> =
        Box::new(|_| Box::pin(async move { Box::new(Lifecycle) as Box<dyn GraphicsFlow<_, _>> }));

    bumplefish::flow::run(vec![constructor], ViewerConfig::default())
        .expect("Failed to run flow for integration test.");
}
