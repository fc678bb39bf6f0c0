// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use cadence_core::init_tracing;
use cadence_platform::{render_size, signal_from_event};
use cadence_render::{FrameStatus, Presenter, RenderSize, WindowSignal};
use cadence_render_vk::VkPresenter;
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info, warn};

use cadence_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

/// While paused, poll the window this often instead of spinning.
const PAUSED_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; missing means defaults
    #[arg(long, default_value = "cadence.toml")]
    config: PathBuf,

    /// Exit after this many presented frames
    #[arg(long)]
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
struct WindowCfg {
    #[serde(default = "default_title")]
    title: String,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct RenderCfg {
    #[serde(default = "default_clear")]
    clear_color: [f32; 4],
    #[serde(default = "default_pulse")]
    pulse: bool,
}

#[derive(Debug, Deserialize, Default)]
struct AppCfg {
    #[serde(default)]
    window: WindowCfg,
    #[serde(default)]
    render: RenderCfg,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            pulse: default_pulse(),
        }
    }
}

fn default_title() -> String {
    "Cadence".to_owned()
}
fn default_width() -> u32 {
    1700
}
fn default_height() -> u32 {
    900
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 1.0, 1.0]
}
fn default_pulse() -> bool {
    true
}

fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

fn load_cfg(path: &Path) -> AppCfg {
    match std::fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(_) => AppCfg::default(),
    }
}

struct App {
    cfg: AppCfg,
    max_frames: Option<u64>,
    window: Option<Window>,
    presenter: Option<VkPresenter>,

    exiting: bool,
    paused: bool,
    presented: u64,
    frames: u32,
    last_fps_instant: Instant,
    failure: Option<anyhow::Error>,
}

impl App {
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // presenter (and its device) before the window it draws into
        if let Some(presenter) = self.presenter.take() {
            info!("stopping at frame {}", presenter.frame_number());
        }
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("fatal: {e:#}");
        self.failure = Some(e);
        self.shutdown(event_loop);
    }

    fn run_frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(presenter) = self.presenter.as_mut() else {
            return;
        };
        match presenter.frame() {
            Ok(FrameStatus::Quit) => self.shutdown(event_loop),
            Ok(FrameStatus::Paused) => self.paused = true,
            Ok(FrameStatus::Presented) => {
                self.paused = false;
                self.presented += 1;
                self.frames = self.frames.saturating_add(1);
                if self.max_frames.is_some_and(|max| self.presented >= max) {
                    info!("presented {} frames, exiting", self.presented);
                    self.shutdown(event_loop);
                }
            }
            Ok(FrameStatus::Skipped) => self.paused = false,
            Err(e) => self.fail(event_loop, e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(self.cfg.window.width, self.cfg.window.height));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => w,
            Err(e) => return self.fail(event_loop, anyhow!("create_window: {e}")),
        };

        let size = render_size(window.inner_size());
        let size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let mut presenter = match VkPresenter::new(&window, &window, size) {
            Ok(p) => p,
            Err(e) => return self.fail(event_loop, e),
        };
        presenter.set_clear_color(self.cfg.render.clear_color);
        presenter.set_pulse(self.cfg.render.pulse);
        info!("pulse = {}", self.cfg.render.pulse);

        window.request_redraw();
        self.window = Some(window);
        self.presenter = Some(presenter);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        if let Some(signal) = signal_from_event(&event) {
            if let Some(presenter) = self.presenter.as_mut() {
                presenter.signal(signal);
            }
            if signal == WindowSignal::Quit {
                info!("CloseRequested");
                self.shutdown(event_loop);
                return;
            }
        }

        if let WindowEvent::RedrawRequested = event {
            if !self.exiting {
                self.run_frame(event_loop);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // nothing is ticking; look again shortly for a restore
            event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + PAUSED_POLL));
            self.frames = 0;
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            if !self.paused {
                info!("fps ~ {}", self.frames);
            }
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App {
        cfg: load_cfg(&args.config),
        max_frames: args.max_frames,
        window: None,
        presenter: None,
        exiting: false,
        paused: false,
        presented: 0,
        frames: 0,
        last_fps_instant: Instant::now(),
        failure: None,
    };

    event_loop.run_app(&mut app)?;
    match app.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
