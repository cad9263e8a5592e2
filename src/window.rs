//! Window management using winit

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window as WinitWindow, WindowBuilder},
};

use crate::backend::wgpu_backend::WgpuBackend;
use crate::engine::Engine;
use crate::error::FrameStatus;
use crate::EngineConfig;

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    close_requested: bool,
    pressed: Vec<KeyCode>,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Self {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)
                .expect("Failed to create window"),
        );

        Self {
            window,
            width,
            height,
            close_requested: false,
            pressed: Vec::new(),
        }
    }

    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Keys pressed since the last call
    pub fn take_pressed(&mut self) -> Vec<KeyCode> {
        std::mem::take(&mut self.pressed)
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.pressed.push(*code);
            }
            _ => {}
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Open a window, build an engine on the wgpu backend and render until the
/// window closes or a fatal error occurs.
///
/// `setup` fills the scene once; `update` runs before every frame.
pub fn run<S, F>(config: EngineConfig, setup: S, mut update: F)
where
    S: FnOnce(&mut Engine<WgpuBackend>) -> crate::RenderResult<()>,
    F: FnMut(&mut Engine<WgpuBackend>, &mut Window) + 'static,
{
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height);

    let backend = WgpuBackend::new(window.window_arc(), config.vsync).expect("Failed to initialize wgpu");
    let mut engine = Engine::new(backend, config.renderer).expect("Failed to create engine");
    setup(&mut engine).expect("Failed to build scene");

    event_loop
        .run(move |event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    window.handle_event(&event);

                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(size) => {
                            if let Err(err) = engine.resize(size.width, size.height) {
                                log::error!("Resize failed: {}", err);
                                elwt.exit();
                            }
                        }
                        WindowEvent::RedrawRequested => {
                            update(&mut engine, &mut window);
                            match engine.render() {
                                Ok(FrameStatus::Presented) => {}
                                Ok(FrameStatus::Skipped(err)) => {
                                    log::debug!("Frame skipped: {}", err);
                                }
                                Err(err) => {
                                    log::error!("Fatal render error: {}", err);
                                    elwt.exit();
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .expect("Event loop failed");
}
