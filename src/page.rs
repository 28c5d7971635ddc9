//! Page scroll tracking.
//!
//! In the browser the viewer canvas sits on a scrollable page and the fish
//! follows the scroll position. [`listen_for_scroll`] forwards DOM scroll
//! events on wasm; natively there is no page, so [`VirtualPage`] emulates one
//! that is scrolled with the keyboard. The mouse wheel is left to the flows.

use winit::{
    event::{ElementState, MouseScrollDelta, WindowEvent},
    keyboard::{Key, NamedKey},
};

/// Pixels per wheel line and per arrow key press.
pub const LINE_HEIGHT: f32 = 40.0;

/// Scroll offset of the page and how far it can scroll at most.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollMetrics {
    /// Distance scrolled from the top, in pixels.
    pub offset: f32,
    /// Content height minus viewport height, in pixels.
    pub scrollable: f32,
}

impl ScrollMetrics {
    pub fn new(scroll_y: f32, scroll_height: f32, viewport_height: f32) -> Self {
        Self {
            offset: scroll_y,
            scrollable: scroll_height - viewport_height,
        }
    }

    /// How far down the page is scrolled, from 0 (top) to 1 (bottom).
    pub fn fraction(&self) -> f32 {
        if !(self.scrollable > 0.0) || !self.offset.is_finite() {
            return 0.0;
        }
        (self.offset / self.scrollable).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageEvent {
    Scrolled(ScrollMetrics),
}

/// A page `pages` viewport heights tall, scrolled by keys.
#[derive(Clone, Debug)]
pub struct VirtualPage {
    pages: f32,
    viewport_height: f32,
    offset: f32,
}

impl VirtualPage {
    pub fn new(pages: f32, viewport_height: u32) -> Self {
        Self {
            pages: pages.max(1.0),
            viewport_height: viewport_height as f32,
            offset: 0.0,
        }
    }

    pub fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics::new(
            self.offset,
            self.pages * self.viewport_height,
            self.viewport_height,
        )
    }

    fn max_offset(&self) -> f32 {
        (self.pages - 1.0) * self.viewport_height
    }

    /// Keeps the offset inside the new page height. Zero heights are ignored.
    pub fn resize(&mut self, viewport_height: u32) {
        if viewport_height == 0 {
            return;
        }
        self.viewport_height = viewport_height as f32;
        self.offset = self.offset.min(self.max_offset());
    }

    /// Scrolls to `offset` and reports the new metrics if the position changed.
    pub fn scroll_to(&mut self, offset: f32) -> Option<PageEvent> {
        let offset = offset.clamp(0.0, self.max_offset());
        if offset == self.offset {
            return None;
        }
        self.offset = offset;
        Some(PageEvent::Scrolled(self.metrics()))
    }

    pub fn scroll_by(&mut self, delta: f32) -> Option<PageEvent> {
        self.scroll_to(self.offset + delta)
    }

    pub fn handle_key(&mut self, key: &Key) -> Option<PageEvent> {
        match key {
            Key::Named(NamedKey::PageDown) | Key::Named(NamedKey::Space) => {
                self.scroll_by(self.viewport_height)
            }
            Key::Named(NamedKey::PageUp) => self.scroll_by(-self.viewport_height),
            Key::Named(NamedKey::ArrowDown) => self.scroll_by(LINE_HEIGHT),
            Key::Named(NamedKey::ArrowUp) => self.scroll_by(-LINE_HEIGHT),
            Key::Named(NamedKey::Home) => self.scroll_to(0.0),
            Key::Named(NamedKey::End) => self.scroll_to(self.max_offset()),
            _ => None,
        }
    }

    pub fn handle_window_events(&mut self, event: &WindowEvent) -> Option<PageEvent> {
        match event {
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                self.handle_key(&event.logical_key)
            }
            _ => None,
        }
    }
}

/// Vertical wheel delta in DOM convention: positive scrolls the page down.
///
/// winit reports the opposite sign, and line deltas are converted to pixels.
pub fn dom_delta_y(delta: &MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => -y * LINE_HEIGHT,
        MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
    }
}

#[cfg(target_arch = "wasm32")]
fn read_dom_metrics(window: &web_sys::Window) -> anyhow::Result<ScrollMetrics> {
    use anyhow::Context as _;

    let scroll_y = window
        .scroll_y()
        .map_err(|e| anyhow::anyhow!("could not read scrollY: {:?}", e))?;
    let inner_height = window
        .inner_height()
        .map_err(|e| anyhow::anyhow!("could not read innerHeight: {:?}", e))?
        .as_f64()
        .context("innerHeight is not a number")?;
    let scroll_height = window
        .document()
        .and_then(|document| document.body())
        .context("page has no body")?
        .scroll_height();
    Ok(ScrollMetrics::new(
        scroll_y as f32,
        scroll_height as f32,
        inner_height as f32,
    ))
}

/// Calls `on_scroll` on every DOM scroll event. The listener lives as long as the page.
#[cfg(target_arch = "wasm32")]
pub fn listen_for_scroll(mut on_scroll: impl FnMut(PageEvent) + 'static) -> anyhow::Result<()> {
    use anyhow::Context as _;
    use wasm_bindgen::{JsCast, closure::Closure};

    let window = web_sys::window().context("no global window")?;
    let listener_window = window.clone();
    let closure = Closure::<dyn FnMut()>::new(move || match read_dom_metrics(&listener_window) {
        Ok(metrics) => on_scroll(PageEvent::Scrolled(metrics)),
        Err(e) => log::warn!("Ignoring scroll event: {}", e),
    });
    window
        .add_event_listener_with_callback("scroll", closure.as_ref().unchecked_ref())
        .map_err(|e| anyhow::anyhow!("could not listen for scroll events: {:?}", e))?;
    closure.forget();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_offset_over_scrollable_height() {
        let metrics = ScrollMetrics::new(250.0, 1500.0, 500.0);
        assert_eq!(metrics.scrollable, 1000.0);
        assert_eq!(metrics.fraction(), 0.25);
    }

    #[test]
    fn fraction_is_zero_without_scrollable_content() {
        assert_eq!(ScrollMetrics::new(0.0, 500.0, 500.0).fraction(), 0.0);
        assert_eq!(ScrollMetrics::new(10.0, 400.0, 500.0).fraction(), 0.0);
        assert_eq!(ScrollMetrics::default().fraction(), 0.0);
    }

    #[test]
    fn fraction_is_clamped_for_overscroll() {
        assert_eq!(ScrollMetrics::new(1200.0, 1500.0, 500.0).fraction(), 1.0);
        assert_eq!(ScrollMetrics::new(-30.0, 1500.0, 500.0).fraction(), 0.0);
    }

    #[test]
    fn virtual_page_scrolls_with_keys() {
        let mut page = VirtualPage::new(3.0, 100);
        let Some(PageEvent::Scrolled(metrics)) = page.handle_key(&Key::Named(NamedKey::PageDown)) else {
            panic!("page down should scroll");
        };
        assert_eq!(metrics.fraction(), 0.5);

        page.handle_key(&Key::Named(NamedKey::End));
        assert_eq!(page.metrics().fraction(), 1.0);
        assert_eq!(page.handle_key(&Key::Named(NamedKey::PageDown)), None, "already at the bottom");

        page.handle_key(&Key::Named(NamedKey::ArrowUp));
        assert_eq!(page.metrics().offset, 160.0);
        page.handle_key(&Key::Named(NamedKey::Home));
        assert_eq!(page.metrics().offset, 0.0);
        assert_eq!(page.handle_key(&Key::Named(NamedKey::Enter)), None);
    }

    #[test]
    fn virtual_page_keeps_offset_in_range_on_resize() {
        let mut page = VirtualPage::new(3.0, 100);
        page.scroll_to(200.0);
        page.resize(50);
        assert_eq!(page.metrics().offset, 100.0);
        assert_eq!(page.metrics().fraction(), 1.0);
        page.resize(0);
        assert_eq!(page.metrics().scrollable, 100.0);
    }

    #[test]
    fn wheel_does_not_scroll_the_virtual_page() {
        let mut page = VirtualPage::new(3.0, 600);
        page.scroll_to(600.0);
        let wheel = WindowEvent::MouseWheel {
            device_id: unsafe { winit::event::DeviceId::dummy() },
            delta: MouseScrollDelta::LineDelta(0.0, -1.0),
            phase: winit::event::TouchPhase::Moved,
        };
        assert_eq!(page.handle_window_events(&wheel), None);
        assert_eq!(page.metrics().offset, 600.0);
    }

    #[test]
    fn wheel_deltas_use_dom_sign() {
        assert_eq!(dom_delta_y(&MouseScrollDelta::LineDelta(0.0, -1.0)), LINE_HEIGHT);
        assert_eq!(
            dom_delta_y(&MouseScrollDelta::PixelDelta(winit::dpi::PhysicalPosition::new(0.0, 12.0))),
            -12.0
        );
    }
}
