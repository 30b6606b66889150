//! Window shell: event loop, keyboard control surface, and HUD output.
//!
//! The side panel of the display is deliberately thin: typed characters
//! collect into a text buffer, Enter submits it as a shape request, Escape
//! hands control back to the auto-cycle. Status, phase, and FPS labels are
//! surfaced through the window title.

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::config::FieldConfig;
use crate::error::FieldError;
use crate::orchestrator::Orchestrator;

/// How often the window title (the HUD) is refreshed.
const HUD_INTERVAL: Duration = Duration::from_millis(250);

/// Build the event loop and run the display until the window closes.
pub fn run(config: FieldConfig) -> Result<(), FieldError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.failure.map_or(Ok(()), Err)
}

struct App {
    config: FieldConfig,
    window: Option<Arc<Window>>,
    orchestrator: Option<Orchestrator>,
    input: String,
    hud_refresh: Instant,
    failure: Option<FieldError>,
}

impl App {
    fn new(config: FieldConfig) -> Self {
        Self {
            config,
            window: None,
            orchestrator: None,
            input: String::new(),
            hud_refresh: Instant::now(),
            failure: None,
        }
    }

    fn refresh_hud(&mut self) {
        if self.hud_refresh.elapsed() < HUD_INTERVAL {
            return;
        }
        self.hud_refresh = Instant::now();
        if let (Some(window), Some(orch)) = (&self.window, &self.orchestrator) {
            let entry = if self.input.is_empty() {
                String::new()
            } else {
                format!("  [{}]", self.input)
            };
            window.set_title(&format!(
                "phosphor · {} · {} · {:.0} fps{}",
                orch.hud.status,
                orch.hud.phase,
                orch.fps(),
                entry,
            ));
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title("phosphor")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.failure = Some(e.into());
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        match pollster::block_on(Orchestrator::new(window, self.config.clone())) {
            Ok(orch) => self.orchestrator = Some(orch),
            Err(e) => {
                log::error!("startup failed: {}", e);
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(orch) = &mut self.orchestrator {
                    orch.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                let Some(orch) = &mut self.orchestrator else {
                    return;
                };
                match &event.logical_key {
                    Key::Named(NamedKey::Enter) => {
                        if !self.input.trim().is_empty() {
                            if let Some(name) = orch.submit(&self.input) {
                                log::info!("user shape: {}", name);
                            }
                        }
                        self.input.clear();
                    }
                    Key::Named(NamedKey::Escape) => {
                        self.input.clear();
                        orch.clear();
                    }
                    Key::Named(NamedKey::Backspace) => {
                        self.input.pop();
                    }
                    Key::Named(NamedKey::Space) => {
                        self.input.push(' ');
                    }
                    Key::Character(text) => {
                        self.input.push_str(text);
                    }
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(orch) = &mut self.orchestrator {
                    match orch.redraw() {
                        Ok(_) => {}
                        Err(wgpu::SurfaceError::Lost) => {
                            let (w, h) = orch.surface_size();
                            orch.resize(w, h);
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            log::error!("surface out of memory");
                            event_loop.exit();
                        }
                        Err(e) => log::warn!("surface error: {:?}", e),
                    }
                }
                self.refresh_hud();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
