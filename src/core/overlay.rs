//! Scan overlay rendering
//!
//! The overlay is a transparent surface composited over the camera view. In
//! idle mode it shows a targeting reticle; while an analysis runs it shows a
//! sweeping highlight band over a faint grid with sparkles around the band.
//!
//! Rendering produces a [`Frame`] of draw commands in surface pixel
//! coordinates (origin top-left, y down). The view layer decides how to
//! paint them.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const RETICLE_RADIUS_X: f64 = 0.3;
pub const RETICLE_RADIUS_Y: f64 = 0.4;
pub const CORNER_OFFSET: f64 = 40.0;
pub const CORNER_SIZE: f64 = 20.0;
pub const BAND_HEIGHT: f64 = 20.0;
pub const GRID_SPACING: u32 = 40;
pub const SPARKLE_SAMPLES: usize = 30;
pub const SPARKLE_RANGE: f64 = 50.0;
pub const SPARKLE_LINK_CHANCE: f64 = 0.7;
pub const SCAN_STEP: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn scan(alpha: f32) -> Self {
        Self {
            r: 120,
            g: 226,
            b: 160,
            a: alpha,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    /// Zero dimensions are bumped to 1 so the surface is never degenerate.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    Idle,
    Active,
}

impl OverlayMode {
    pub fn from_analyzing(analyzing: bool) -> Self {
        if analyzing {
            OverlayMode::Active
        } else {
            OverlayMode::Idle
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Ellipse {
        cx: f64,
        cy: f64,
        rx: f64,
        ry: f64,
        color: Rgba,
        line_width: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Rgba,
        line_width: f64,
    },
    /// Full-width band filled with a vertical gradient.
    GradientBand {
        top: f64,
        height: f64,
        width: f64,
        stops: [(f32, Rgba); 3],
    },
    Dot {
        x: f64,
        y: f64,
        radius: f64,
        color: Rgba,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub size: CanvasSize,
    pub mode: OverlayMode,
    pub commands: Vec<DrawCommand>,
}

impl Frame {
    pub fn blank(size: CanvasSize) -> Self {
        Self {
            size,
            mode: OverlayMode::Idle,
            commands: vec![DrawCommand::Clear],
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    size: CanvasSize,
    scan_line_y: f64,
}

impl OverlayRenderer {
    pub fn new(size: CanvasSize) -> Self {
        Self {
            size,
            scan_line_y: 0.0,
        }
    }

    #[cfg(test)]
    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn scan_line_y(&self) -> f64 {
        self.scan_line_y
    }

    /// Start the next analysis with the band at the top edge.
    pub fn reset_scan_line(&mut self) {
        self.scan_line_y = 0.0;
    }

    /// Match the surface to the host's new on-screen size.
    pub fn resize(&mut self, size: CanvasSize) {
        if size == self.size {
            return;
        }
        log::debug!(
            "Overlay resized from {}x{} to {}x{}",
            self.size.width,
            self.size.height,
            size.width,
            size.height
        );
        self.size = size;
        if self.scan_line_y >= size.height as f64 {
            self.scan_line_y = 0.0;
        }
    }

    pub fn render<R: Rng>(&mut self, mode: OverlayMode, rng: &mut R) -> Frame {
        match mode {
            OverlayMode::Idle => self.render_idle(),
            OverlayMode::Active => self.render_active(rng),
        }
    }

    /// Reticle: centred ellipse plus four corner brackets.
    pub fn render_idle(&self) -> Frame {
        let w = self.size.width as f64;
        let h = self.size.height as f64;
        let color = Rgba::scan(0.5);
        let line_width = 2.0;

        let mut commands = vec![
            DrawCommand::Clear,
            DrawCommand::Ellipse {
                cx: w / 2.0,
                cy: h / 2.0,
                rx: w * RETICLE_RADIUS_X,
                ry: h * RETICLE_RADIUS_Y,
                color,
                line_width,
            },
        ];

        // (corner x, corner y, horizontal arm direction, vertical arm direction)
        let corners = [
            (CORNER_OFFSET, CORNER_OFFSET, 1.0, 1.0),
            (w - CORNER_OFFSET, CORNER_OFFSET, -1.0, 1.0),
            (CORNER_OFFSET, h - CORNER_OFFSET, 1.0, -1.0),
            (w - CORNER_OFFSET, h - CORNER_OFFSET, -1.0, -1.0),
        ];
        for (x, y, dx, dy) in corners {
            commands.push(DrawCommand::Line {
                x1: x,
                y1: y,
                x2: x + dx * CORNER_SIZE,
                y2: y,
                color,
                line_width,
            });
            commands.push(DrawCommand::Line {
                x1: x,
                y1: y,
                x2: x,
                y2: y + dy * CORNER_SIZE,
                color,
                line_width,
            });
        }

        Frame {
            size: self.size,
            mode: OverlayMode::Idle,
            commands,
        }
    }

    /// Scan band, grid and sparkles, then advance the scan line.
    pub fn render_active<R: Rng>(&mut self, rng: &mut R) -> Frame {
        let w = self.size.width as f64;
        let h = self.size.height as f64;
        let scan_y = self.scan_line_y;
        let grid_color = Rgba::scan(0.2);
        let sparkle_color = Rgba::scan(0.5);

        let mut commands = vec![
            DrawCommand::Clear,
            DrawCommand::GradientBand {
                top: scan_y - BAND_HEIGHT / 2.0,
                height: BAND_HEIGHT,
                width: w,
                stops: [
                    (0.0, Rgba::scan(0.0)),
                    (0.5, Rgba::scan(0.8)),
                    (1.0, Rgba::scan(0.0)),
                ],
            },
        ];

        for y in (0..self.size.height).step_by(GRID_SPACING as usize) {
            commands.push(DrawCommand::Line {
                x1: 0.0,
                y1: y as f64,
                x2: w,
                y2: y as f64,
                color: grid_color,
                line_width: 1.0,
            });
        }
        for x in (0..self.size.width).step_by(GRID_SPACING as usize) {
            commands.push(DrawCommand::Line {
                x1: x as f64,
                y1: 0.0,
                x2: x as f64,
                y2: h,
                color: grid_color,
                line_width: 1.0,
            });
        }

        for _ in 0..SPARKLE_SAMPLES {
            let x = rng.random::<f64>() * w;
            let y = rng.random::<f64>() * h;
            if (y - scan_y).abs() >= SPARKLE_RANGE {
                continue;
            }

            commands.push(DrawCommand::Dot {
                x,
                y,
                radius: rng.random::<f64>() * 4.0 + 1.0,
                color: sparkle_color,
            });
            if rng.random::<f64>() > SPARKLE_LINK_CHANCE {
                commands.push(DrawCommand::Line {
                    x1: x,
                    y1: y,
                    x2: x + rng.random::<f64>() * 40.0 - 20.0,
                    y2: y + rng.random::<f64>() * 40.0 - 20.0,
                    color: grid_color,
                    line_width: 1.0,
                });
            }
        }

        self.scan_line_y = (self.scan_line_y + SCAN_STEP) % h;

        Frame {
            size: self.size,
            mode: OverlayMode::Active,
            commands,
        }
    }
}

/// A per-frame render loop running on the tokio runtime.
///
/// Frames are published on a watch channel so a slow view only ever sees the
/// latest one. The loop ends when [`OverlayLoop::stop`] is called, when the
/// handle is dropped, or when the size sender (owned by the camera stream)
/// goes away.
pub struct OverlayLoop {
    handle: Option<JoinHandle<()>>,
    frames: watch::Receiver<Frame>,
}

impl OverlayLoop {
    pub fn start(
        size_rx: watch::Receiver<CanvasSize>,
        analyzing: watch::Receiver<bool>,
        frame_interval: Duration,
    ) -> Self {
        Self::start_with_rng(size_rx, analyzing, frame_interval, StdRng::from_os_rng())
    }

    pub fn start_with_rng<R>(
        mut size_rx: watch::Receiver<CanvasSize>,
        analyzing: watch::Receiver<bool>,
        frame_interval: Duration,
        mut rng: R,
    ) -> Self
    where
        R: Rng + Send + 'static,
    {
        let initial = *size_rx.borrow_and_update();
        let (frame_tx, frames) = watch::channel(Frame::blank(initial));

        let handle = tokio::spawn(async move {
            let mut renderer = OverlayRenderer::new(initial);
            let mut previous = OverlayMode::Idle;
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match size_rx.has_changed() {
                    Ok(true) => renderer.resize(*size_rx.borrow_and_update()),
                    Ok(false) => {}
                    Err(_) => {
                        log::debug!("Camera stream closed, stopping overlay loop");
                        break;
                    }
                }

                let mode = OverlayMode::from_analyzing(*analyzing.borrow());
                if previous == OverlayMode::Idle && mode == OverlayMode::Active {
                    renderer.reset_scan_line();
                }
                previous = mode;
                let frame = renderer.render(mode, &mut rng);
                if mode == OverlayMode::Active {
                    log::trace!("Scan line at {}", renderer.scan_line_y());
                }
                if frame_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        Self {
            handle: Some(handle),
            frames,
        }
    }

    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.frames.clone()
    }

    /// Cancel the loop, including any frame that is already scheduled.
    pub fn stop(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::debug!("Overlay loop cancelled");
        }
    }
}

impl Drop for OverlayLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}
