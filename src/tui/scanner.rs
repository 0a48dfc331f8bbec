use crate::core::analysis::skincare_focus;
use crate::core::camera::CameraSource;
use crate::core::models::ScanResults;
use crate::core::overlay::{CanvasSize, DrawCommand, Frame as OverlayFrame, OverlayMode, Rgba};
use crate::core::progress::ProgressState;
use crate::core::session::ScanSession;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::canvas::{Canvas, Circle, Context, Line as CanvasLine, Points},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};
use std::f64::consts::TAU;
use std::io;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::watch;

/// Approximate pixel size of one terminal cell, used to size the overlay surface.
const CELL_WIDTH_PX: u32 = 8;
const CELL_HEIGHT_PX: u32 = 16;
const ELLIPSE_POINTS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ToggleCamera,
    Capture,
    Quit,
    Ignore,
}

pub fn key_action(key: &KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Char('s') => KeyAction::ToggleCamera,
        KeyCode::Char('c') | KeyCode::Char(' ') | KeyCode::Enter => KeyAction::Capture,
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
        _ => KeyAction::Ignore,
    }
}

/// Snapshot of everything the scanner screen shows.
#[derive(Debug, Clone)]
pub struct ScannerView {
    pub camera_label: Option<String>,
    pub frame: Option<OverlayFrame>,
    pub progress: ProgressState,
    pub analyzing: bool,
    pub results: Option<ScanResults>,
    pub status: String,
}

pub struct Scanner {
    session: ScanSession,
    camera: Box<dyn CameraSource>,
    frames: Option<watch::Receiver<OverlayFrame>>,
    frame_interval: Duration,
    view: ScannerView,
}

impl Scanner {
    pub fn new(session: ScanSession, camera: Box<dyn CameraSource>, frame_interval: Duration) -> Self {
        let view = ScannerView {
            camera_label: None,
            frame: None,
            progress: session.progress().clone(),
            analyzing: false,
            results: None,
            status: "Press s to start the camera".to_string(),
        };
        Self {
            session,
            camera,
            frames: None,
            frame_interval,
            view,
        }
    }

    /// Run the scanner until the user quits. Returns the last results, if any.
    pub async fn run(&mut self) -> io::Result<Option<ScanResults>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> io::Result<Option<ScanResults>> {
        self.toggle_camera().await;

        loop {
            if let Some(frames) = &self.frames {
                self.view.frame = Some(frames.borrow().clone());
            }
            let mut video_area = Rect::default();
            terminal.draw(|f| video_area = draw(f, &self.view))?;
            self.session.resize_host(host_size(video_area));

            if !event::poll(self.frame_interval)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key_action(&key) {
                    KeyAction::Quit => break,
                    KeyAction::ToggleCamera => self.toggle_camera().await,
                    KeyAction::Capture => self.capture(terminal).await,
                    KeyAction::Ignore => {}
                }
            }
        }

        let results = self.view.results.clone();
        self.session.stop_camera();
        Ok(results)
    }

    async fn toggle_camera(&mut self) {
        if self.session.is_camera_active() {
            self.session.stop_camera();
            self.frames = None;
            self.view.camera_label = None;
            self.view.frame = None;
            self.view.results = None;
            self.view.progress = self.session.progress().clone();
            self.view.status = "Camera stopped".to_string();
            return;
        }

        match self.session.start_camera(self.camera.as_ref()).await {
            Ok(()) => {
                self.frames = self.session.overlay_frames();
                self.view.camera_label = self.session.camera_label().map(String::from);
                self.view.status = "Camera activated. Press c to scan".to_string();
            }
            Err(_) => {
                self.view.status = self
                    .session
                    .last_error()
                    .unwrap_or("Could not access camera")
                    .to_string();
            }
        }
    }

    async fn capture<B: Backend>(&mut self, terminal: &mut Terminal<B>) {
        let Some(frames) = self.frames.clone() else {
            self.view.status = "Start the camera first (press s)".to_string();
            return;
        };

        let view = &mut self.view;
        view.analyzing = true;
        view.results = None;
        view.status = "Advanced analysis in progress... (q to cancel)".to_string();

        let outcome = self
            .session
            .capture_and_analyze(|state| {
                view.progress = state.clone();
                view.frame = Some(frames.borrow().clone());
                if terminal.draw(|f| {
                    draw(f, view);
                })
                .is_err()
                {
                    return ControlFlow::Break(());
                }
                if cancel_requested() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;

        view.analyzing = self.session.is_analyzing();
        view.progress = self.session.progress().clone();
        match outcome {
            Ok(results) => {
                view.status = format!("Scan complete: {} skin", results.skin_type);
                view.results = Some(results);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                view.status = "Scan cancelled".to_string();
            }
            Err(e) => {
                view.status = format!("Analysis failed: {e}");
            }
        }
    }
}

fn cancel_requested() -> bool {
    match event::poll(Duration::ZERO) {
        Ok(true) => matches!(
            event::read(),
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press && key_action(&key) == KeyAction::Quit
        ),
        _ => false,
    }
}

/// Overlay surface size for a panel, excluding its border.
pub fn host_size(area: Rect) -> CanvasSize {
    CanvasSize::new(
        u32::from(area.width.saturating_sub(2)) * CELL_WIDTH_PX,
        u32::from(area.height.saturating_sub(2)) * CELL_HEIGHT_PX,
    )
}

fn to_color(color: Rgba) -> Color {
    let scale = |c: u8| (f32::from(c) * color.a.clamp(0.0, 1.0)).round() as u8;
    Color::Rgb(scale(color.r), scale(color.g), scale(color.b))
}

/// Paint overlay commands. Canvas y grows upwards, so rows are flipped.
fn paint_overlay(ctx: &mut Context, frame: &OverlayFrame) {
    let height = f64::from(frame.size.height);
    let flip = |y: f64| height - y;

    for command in &frame.commands {
        match *command {
            DrawCommand::Clear => {}
            DrawCommand::Ellipse {
                cx,
                cy,
                rx,
                ry,
                color,
                ..
            } => {
                let coords: Vec<(f64, f64)> = (0..ELLIPSE_POINTS)
                    .map(|i| {
                        let t = i as f64 / ELLIPSE_POINTS as f64 * TAU;
                        (cx + rx * t.cos(), flip(cy + ry * t.sin()))
                    })
                    .collect();
                ctx.draw(&Points {
                    coords: &coords,
                    color: to_color(color),
                });
            }
            DrawCommand::Line {
                x1,
                y1,
                x2,
                y2,
                color,
                ..
            } => {
                ctx.draw(&CanvasLine::new(x1, flip(y1), x2, flip(y2), to_color(color)));
            }
            DrawCommand::GradientBand {
                top,
                height: band,
                width,
                stops,
            } => {
                let centre = flip(top + band / 2.0);
                let peak = stops[1].1;
                let fringe = Rgba { a: peak.a / 2.0, ..peak };
                ctx.draw(&CanvasLine::new(0.0, centre, width, centre, to_color(peak)));
                for offset in [-band / 4.0, band / 4.0] {
                    let y = centre + offset;
                    ctx.draw(&CanvasLine::new(0.0, y, width, y, to_color(fringe)));
                }
            }
            DrawCommand::Dot {
                x,
                y,
                radius,
                color,
            } => {
                ctx.draw(&Circle {
                    x,
                    y: flip(y),
                    radius,
                    color: to_color(color),
                });
            }
        }
    }
}

fn result_lines(results: Option<&ScanResults>) -> Vec<Line<'static>> {
    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(
                format!("{label}: "),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(value),
        ])
    };

    match results {
        Some(r) => vec![
            field("Skin Type", r.skin_type.to_string()),
            field("Skin Issues", r.skin_issues.clone()),
            field("Sun Damage", r.sun_damage.clone()),
            field("Unique Feature", r.unique_feature.clone()),
            field("Skin Tone", r.skin_tone.clone()),
            Line::from(""),
            Line::from(Span::styled(
                "Skincare Focus",
                Style::default().fg(Color::Yellow),
            )),
            Line::from(skincare_focus(r.skin_type)),
        ],
        None => vec![
            field("Skin Type", "Not analyzed".to_string()),
            field("Skin Issues", "Not analyzed".to_string()),
            field("Sun Damage", "Not analyzed".to_string()),
            field("Unique Feature", "None detected".to_string()),
            field("Skin Tone", "Not analyzed".to_string()),
        ],
    }
}

/// Draw the scanner screen and return the video panel area.
pub fn draw(f: &mut Frame, view: &ScannerView) -> Rect {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(rows[0]);

    let title = match (&view.camera_label, view.analyzing) {
        (Some(label), true) => format!("{label} [SCANNING]"),
        (Some(label), false) => format!("{label} [READY]"),
        (None, _) => "Camera off".to_string(),
    };
    let video_block = Block::default().borders(Borders::ALL).title(title);
    match &view.frame {
        Some(frame) => {
            let border = if frame.mode == OverlayMode::Active {
                Color::Green
            } else {
                Color::Gray
            };
            let canvas = Canvas::default()
                .block(video_block.border_style(Style::default().fg(border)))
                .marker(Marker::Braille)
                .x_bounds([0.0, f64::from(frame.size.width)])
                .y_bounds([0.0, f64::from(frame.size.height)])
                .paint(|ctx| paint_overlay(ctx, frame));
            f.render_widget(canvas, columns[0]);
        }
        None => {
            let placeholder = Paragraph::new("Position your face in the frame after starting the camera")
                .style(Style::default().fg(Color::DarkGray))
                .block(video_block);
            f.render_widget(placeholder, columns[0]);
        }
    }

    let status = if view.results.is_some() {
        "COMPLETE"
    } else {
        "READY"
    };
    let results = Paragraph::new(result_lines(view.results.as_ref()))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Analysis Results [{status}]")),
        );
    f.render_widget(results, columns[1]);

    let percent = view.progress.percent_complete.clamp(0.0, 100.0);
    let gauge_label = if view.analyzing {
        format!("{} {}%", view.progress.current_stage, percent.round())
    } else {
        format!("{}%", percent.round())
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(percent / 100.0)
        .label(gauge_label);
    f.render_widget(gauge, rows[1]);

    let help = Line::from(vec![
        Span::styled(view.status.clone(), Style::default().fg(Color::Cyan)),
        Span::styled(
            "  s: camera  c: capture  q: quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(help), rows[2]);

    columns[0]
}
