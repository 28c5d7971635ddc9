use bumplefish::{
    config::ViewerConfig,
    context::{Context, InitContext},
    flow::{FlowConsturctor, GraphicsFlow, ImageTestResult, Out},
    page::PageEvent,
    render::Render,
};

pub(crate) type Frame = image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>;

pub(crate) type Validate = fn(u32, &Context, &Frame) -> Result<ImageTestResult, anyhow::Error>;

/// Wraps a viewer flow and checks every frame it renders.
///
/// `validate` gets the number of updates so far, so checks can wait until
/// the scene had time to settle.
pub(crate) struct Checked {
    inner: Box<dyn GraphicsFlow<(), ()>>,
    setup: fn(&mut Context),
    validate: Validate,
    frames: u32,
}

impl GraphicsFlow<(), ()> for Checked {
    fn on_init(&mut self, ctx: &mut Context, state: &mut ()) -> Out<(), ()> {
        (self.setup)(ctx);
        self.inner.on_init(ctx, state)
    }

    fn on_update(&mut self, ctx: &Context, state: &mut (), dt: instant::Duration) -> Out<(), ()> {
        self.frames += 1;
        self.inner.on_update(ctx, state, dt)
    }

    fn on_window_events(&mut self, ctx: &Context, state: &mut (), event: &bumplefish::WindowEvent) -> Out<(), ()> {
        self.inner.on_window_events(ctx, state, event)
    }

    fn on_page_events(&mut self, ctx: &Context, state: &mut (), event: &PageEvent) -> Out<(), ()> {
        self.inner.on_page_events(ctx, state, event)
    }

    fn on_render(&self) -> Render<'_> {
        self.inner.on_render()
    }

    fn render_to_texture(
        &self,
        ctx: &Context,
        _: &mut (),
        texture: &mut Frame,
    ) -> Result<ImageTestResult, anyhow::Error> {
        (self.validate)(self.frames, ctx, texture)
    }
}

/// Runs `constructor` in a window until `validate` passes or fails.
pub(crate) fn run_image_test(
    constructor: FlowConsturctor<(), ()>,
    viewer: ViewerConfig,
    setup: fn(&mut Context),
    validate: Validate,
) {
    let checked: FlowConsturctor<(), ()> = Box::new(move |ctx: InitContext| {
        Box::pin(async move {
            let inner = constructor(ctx).await;
            Box::new(Checked {
                inner,
                setup,
                validate,
                frames: 0,
            }) as Box<dyn GraphicsFlow<_, _>>
        })
    });

    bumplefish::flow::run(vec![checked], viewer).expect("Failed to run flow for integration test.");
}

/// The pixel in the middle of the visible part of the frame.
pub(crate) fn centre_pixel(ctx: &Context, frame: &Frame) -> image::Rgba<u8> {
    *frame.get_pixel(ctx.config.width / 2, ctx.config.height / 2)
}

/// Surface formats differ between platforms; BGRA frames are swapped to RGBA.
pub(crate) fn to_rgba(ctx: &Context, pixel: image::Rgba<u8>) -> [u8; 4] {
    let [a, b, c, d] = pixel.0;
    match ctx.config.format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => [c, b, a, d],
        _ => [a, b, c, d],
    }
}
