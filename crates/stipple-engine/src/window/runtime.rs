use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{run_frame, App, AppControl};
use crate::device::{WgpuBackend, WgpuInit};
use crate::render::{Graphics, GraphicsConfig};
use crate::time::FrameClock;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    /// Frames per second cap; 0 leaves pacing to the present mode.
    pub max_frame_rate: u32,
    pub graphics: GraphicsConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "stipple".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            max_frame_rate: 0,
            graphics: GraphicsConfig::default(),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window, initializes graphics on it and runs `app` until it exits or the
    /// window closes. Errors from window creation, initialization or shutdown are returned.
    pub fn run<A>(config: RuntimeConfig, wgpu_init: WgpuInit, app: A) -> Result<()>
    where
        A: App + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, wgpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// `Graphics<B>` stores values of `B`'s associated types, which makes it invariant in the
// window borrow.
#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    graphics: Graphics<WgpuBackend<'this>>,
}

struct AppState<A>
where
    A: App + 'static,
{
    config: RuntimeConfig,
    wgpu_init: WgpuInit,
    app: A,

    entry: Option<WindowEntry>,
    exit_requested: bool,
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: App + 'static,
{
    fn new(config: RuntimeConfig, wgpu_init: WgpuInit, app: A) -> Self {
        Self {
            config,
            wgpu_init,
            app,
            entry: None,
            exit_requested: false,
            failure: None,
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.exit_requested = true;
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let id = window.id();
        let wgpu_init = self.wgpu_init.clone();
        let graphics_config = self.config.graphics.clone();

        let mut entry = WindowEntryTryBuilder {
            clock: FrameClock::new().with_max_frame_rate(self.config.max_frame_rate),
            window,
            graphics_builder: |window| {
                let mut graphics = Graphics::new(graphics_config);
                graphics.initialize(WgpuBackend::new(window, wgpu_init))?;
                Ok::<_, crate::error::GraphicsError>(graphics)
            },
        }
        .try_build()
        .context("failed to initialize graphics")?;

        let app = &mut self.app;
        let control = entry.with_graphics_mut(|graphics| app.on_init(graphics));
        entry.with_clock_mut(|clock| clock.reset());

        self.entry = Some(entry);
        if control == AppControl::Exit {
            self.exit_requested = true;
        }
        Ok(id)
    }

    /// Runs `on_exit`, shuts graphics down and drops the window.
    fn destroy_window_entry(&mut self) {
        let Some(mut entry) = self.entry.take() else {
            return;
        };

        let app = &mut self.app;
        let result = entry.with_graphics_mut(|graphics| {
            app.on_exit(graphics);
            graphics.shutdown()
        });
        drop(entry);

        if let Err(err) = result {
            self.failure
                .get_or_insert(anyhow::Error::new(err).context("graphics shutdown failed"));
        }
    }

    fn finish(&mut self, event_loop: &ActiveEventLoop) {
        self.destroy_window_entry();
        event_loop.exit();
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: App + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop) {
            self.fail(e);
            event_loop.exit();
            return;
        }

        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            self.finish(event_loop);
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; pacing happens in the frame clock.
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.exit_requested {
            self.finish(event_loop);
            return;
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            self.finish(event_loop);
            return;
        }

        // Split borrows to avoid `self` capture inside `ouroboros` closures.
        let (app, entry) = (&mut self.app, &mut self.entry);
        let Some(entry) = entry.as_mut() else {
            return;
        };

        match &event {
            WindowEvent::CloseRequested => {
                log::info!("window close requested");
                self.finish(event_loop);
            }

            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                // Failures are recorded in the graphics error slot.
                let _ = entry.with_graphics_mut(|graphics| graphics.on_resize());
                entry.with_window(|w| w.request_redraw());
            }

            WindowEvent::RedrawRequested => {
                let control = entry.with_mut(|fields| {
                    let time = fields.clock.tick();
                    let control = run_frame(app, fields.graphics, time);
                    fields.clock.pace();
                    control
                });

                if control == AppControl::Exit {
                    self.finish(event_loop);
                }
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.destroy_window_entry();
    }
}
