//! Layout and drawing: playfield canvas, sidebar, pause, game over, line-clear flash.

use crate::app::Screen;
use crate::game::Session;
use crate::piece::{PALETTE, Rgb};
use crate::render::DrawPrimitive;
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Line as CanvasLine, Points};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

const SIDEBAR_WIDTH: u16 = 24;

/// Duration of the line-clear fade (TachyonFX) in ms.
const LINE_CLEAR_FADE_MS: u32 = 400;

/// Everything a frame needs, borrowed from the app.
pub struct View<'a> {
    pub session: &'a Session,
    pub theme: &'a Theme,
    pub screen: Screen,
    pub paused: bool,
    pub best: u64,
    pub flash_bands: &'a [(f32, f32)],
}

/// Inner board size in terminal cells for a world of `world` units, keeping
/// the aspect ratio (a cell is about twice as tall as wide).
fn board_cells(area: Rect, world: (f32, f32)) -> (u16, u16) {
    let (w, h) = world;
    let aspect = w / h * 2.0;
    let max_rows = area.height.saturating_sub(2);
    let max_cols = area.width.saturating_sub(SIDEBAR_WIDTH + 2);
    let mut rows = max_rows;
    let mut cols = (f32::from(rows) * aspect).round() as u16;
    if cols > max_cols {
        cols = max_cols;
        rows = (f32::from(cols) / aspect).round() as u16;
    }
    (cols.max(1), rows.max(1))
}

/// Outer rects (with border) of the playfield and sidebar, centred in `area`.
fn game_layout(area: Rect, world: (f32, f32)) -> (Rect, Rect) {
    let (cols, rows) = board_cells(area, world);
    let (pw, ph) = (cols + 2, rows + 2);
    let total_w = pw + SIDEBAR_WIDTH;

    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(ph),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(pw), Constraint::Length(SIDEBAR_WIDTH)])
        .split(vert[1]);
    (inner[0], inner[1])
}

/// Draw the current screen with optional pause / game-over overlay. While
/// `flash_bands` is non-empty, applies the TachyonFX fade and updates
/// `line_clear_effect` / `line_clear_process_time`.
pub fn draw(
    frame: &mut Frame,
    view: &View,
    line_clear_effect: &mut Option<Effect>,
    line_clear_process_time: &mut Option<Instant>,
    now: Instant,
) {
    let area = frame.area();
    let world = view.session.config().playfield_size();
    let (playfield_area, sidebar_area) = game_layout(area, world);
    let board = draw_playfield(frame, view, playfield_area);
    draw_sidebar(frame, view, sidebar_area);

    if !view.flash_bands.is_empty() {
        apply_line_clear_effect(
            frame,
            view,
            board,
            line_clear_effect,
            line_clear_process_time,
            now,
        );
    }
    match view.screen {
        Screen::GameOver => draw_game_over(frame, view, area),
        Screen::Playing if view.paused => draw_pause_overlay(frame, view.theme, area),
        Screen::Playing => {}
    }
}

/// Inner surface of a boundary capsule, on the playfield side.
fn boundary_surface(a: (f64, f64), b: (f64, f64), radius: f64, centre: (f64, f64)) -> [(f64, f64); 2] {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = dx.hypot(dy).max(f64::EPSILON);
    let (mut nx, mut ny) = (-dy / len, dx / len);
    if (centre.0 - a.0) * nx + (centre.1 - a.1) * ny < 0.0 {
        (nx, ny) = (-nx, -ny);
    }
    [
        (a.0 + nx * radius, a.1 + ny * radius),
        (b.0 + nx * radius, b.1 + ny * radius),
    ]
}

/// Draws the board canvas. Returns the inner rect (no border).
fn draw_playfield(frame: &mut Frame, view: &View, area: Rect) -> Rect {
    let theme = view.theme;
    let (w, h) = view.session.config().playfield_size();
    let (w, h) = (f64::from(w), f64::from(h));
    let primitives = view.session.draw_list();

    let mut grains: HashMap<Rgb, Vec<(f64, f64)>> = HashMap::new();
    let mut lines: Vec<CanvasLine> = Vec::new();
    for p in &primitives {
        match *p {
            DrawPrimitive::Circle { center, color, .. } => grains
                .entry(color)
                .or_default()
                .push((f64::from(center.x), f64::from(center.y))),
            DrawPrimitive::Box {
                center,
                half_extent,
                angle,
                color,
            } => {
                let c = DrawPrimitive::box_corners(center, half_extent, angle);
                let color = theme.grain_color(color);
                for i in 0..4 {
                    let (p, q) = (c[i], c[(i + 1) % 4]);
                    lines.push(CanvasLine::new(
                        f64::from(p.x),
                        f64::from(p.y),
                        f64::from(q.x),
                        f64::from(q.y),
                        color,
                    ));
                }
            }
            DrawPrimitive::Segment { a, b, radius } => {
                let [s, e] = boundary_surface(
                    (f64::from(a.x), f64::from(a.y)),
                    (f64::from(b.x), f64::from(b.y)),
                    f64::from(radius),
                    (w / 2.0, h / 2.0),
                );
                lines.push(CanvasLine::new(s.0, s.1, e.0, e.1, theme.div_line));
            }
        }
    }
    let grains: Vec<(Color, Vec<(f64, f64)>)> = grains
        .into_iter()
        .map(|(c, pts)| (theme.grain_color(c), pts))
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(" Sandtris ", Style::default().fg(theme.title)));
    let inner = block.inner(area);
    Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .background_color(theme.bg)
        .x_bounds([0.0, w])
        .y_bounds([0.0, h])
        .paint(|ctx| {
            for line in &lines {
                ctx.draw(line);
            }
            for (color, coords) in &grains {
                ctx.draw(&Points {
                    coords,
                    color: *color,
                });
            }
        })
        .render(area, frame.buffer_mut());
    inner
}

/// Terminal rows covered by world-space height bands.
fn flash_rows(board: Rect, bands: &[(f32, f32)], world_height: f32) -> HashSet<u16> {
    let rows = f32::from(board.height);
    let to_row = |y: f32| ((world_height - y) / world_height * rows).floor();
    let mut out = HashSet::new();
    for &(lo, hi) in bands {
        let top = to_row(hi).max(0.0) as u16;
        let bottom = (to_row(lo).min(rows - 1.0)).max(0.0) as u16;
        for r in top..=bottom {
            out.insert(board.y + r);
        }
    }
    out
}

/// Create or update line-clear fade effect and process it (TachyonFX: fade cleared rows to bg).
fn apply_line_clear_effect(
    frame: &mut Frame,
    view: &View,
    board: Rect,
    line_clear_effect: &mut Option<Effect>,
    line_clear_process_time: &mut Option<Instant>,
    now: Instant,
) {
    let delta = line_clear_process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    let tfx_delta = TfxDuration::from_millis(delta_ms);
    *line_clear_process_time = Some(now);

    if line_clear_effect.is_none() {
        let (_, world_height) = view.session.config().playfield_size();
        let rows = flash_rows(board, view.flash_bands, world_height);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| rows.contains(&pos.y)));
        let bg = view.theme.bg;
        let effect = fx::fade_to(bg, bg, (LINE_CLEAR_FADE_MS, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board);
        *line_clear_effect = Some(effect);
    }

    if let Some(effect) = line_clear_effect {
        frame.render_effect(effect, board, tfx_delta);
    }
}

fn sidebar_block(theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
}

fn draw_sidebar(frame: &mut Frame, view: &View, area: Rect) {
    let theme = view.theme;
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let stats = view.session.stats();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Colours (border + title + strip)
            Constraint::Length(1), // gap
            Constraint::Length(11), // Stats
            Constraint::Length(1), // gap
            Constraint::Length(7), // Keys
        ])
        .split(area);

    // --- Colours ---
    let colours_block = sidebar_block(theme);
    let colours_inner = colours_block.inner(chunks[0]);
    colours_block.render(chunks[0], frame.buffer_mut());
    let colours_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(colours_inner);
    Paragraph::new(Line::from(Span::styled("Colours", title_style)))
        .render(colours_layout[0], frame.buffer_mut());
    draw_colour_strip(frame, view, colours_layout[1]);

    // --- Stats ---
    let stats_block = sidebar_block(theme);
    let stats_inner = stats_block.inner(chunks[2]);
    stats_block.render(chunks[2], frame.buffer_mut());
    let row = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(label, title_style),
            Span::styled(value, fg_style),
        ])
    };
    let piece = view
        .session
        .piece()
        .map_or_else(|| "-".to_string(), |p| p.kind().name().to_string());
    let stats_lines = vec![
        row("Piece: ", piece),
        row("Score: ", stats.grains_cleared.to_string()),
        row("Best: ", view.best.to_string()),
        row("Rows: ", stats.rows_cleared.to_string()),
        row("Pieces: ", stats.pieces_landed.to_string()),
        row("Height: ", view.session.observation().stack_height().to_string()),
        row("Grains: ", stats.live_grains.to_string()),
        row("Swept: ", stats.grains_swept.to_string()),
        row("Time: ", format_ticks(stats.ticks, view.session.config().fps)),
    ];
    Paragraph::new(ratatui::text::Text::from(stats_lines)).render(stats_inner, frame.buffer_mut());

    // --- Keys ---
    let keys_block = sidebar_block(theme);
    let keys_inner = keys_block.inner(chunks[4]);
    keys_block.render(chunks[4], frame.buffer_mut());
    let dim = Style::default().fg(theme.inactive_fg);
    let keys = [
        "←/h →/l  move",
        "↑/k      rotate",
        "↓/j      soft drop",
        "p        pause",
        "r  restart  q  quit",
    ];
    let key_lines: Vec<Line> = keys.iter().map(|k| Line::from(Span::styled(*k, dim))).collect();
    Paragraph::new(key_lines).render(keys_inner, frame.buffer_mut());
}

fn format_ticks(ticks: u64, fps: u32) -> String {
    let secs = ticks / u64::from(fps.max(1));
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Draw one block per colour in play.
fn draw_colour_strip(frame: &mut Frame, view: &View, area: Rect) {
    let n = view.session.config().colors.clamp(1, PALETTE.len());
    let block_w = (area.width / n as u16).max(1);
    for (i, color) in PALETTE.iter().take(n).enumerate() {
        let r = Rect {
            x: area.x + (i as u16) * block_w,
            y: area.y,
            width: block_w,
            height: area.height.min(1),
        }
        .intersection(area);
        let c = view.theme.grain_color(*color);
        Paragraph::new("█")
            .style(Style::default().fg(c).bg(c))
            .render(r, frame.buffer_mut());
    }
}

fn popup_rect(area: Rect, w: u16, h: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w.min(area.width),
        height: h.min(area.height),
    }
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = popup_rect(area, 28, 5);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P: resume    Q: quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
    );
    p.render(popup, frame.buffer_mut());
}

fn draw_game_over(frame: &mut Frame, view: &View, area: Rect) {
    let theme = view.theme;
    let stats = view.session.stats();
    let popup = popup_rect(area, 30, 10);
    let fg = Style::default().fg(theme.main_fg);
    let mut lines: Vec<Line> = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Game Over ",
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(format!(" Score: {} ", stats.grains_cleared), fg)),
        Line::from(Span::styled(format!(" Best: {} ", view.best), fg)),
        Line::from(Span::styled(format!(" Rows: {} ", stats.rows_cleared), fg)),
    ];
    if stats.grains_cleared > 0 && stats.grains_cleared == view.best {
        lines.push(Line::from(Span::styled(
            " New record! ",
            Style::default().fg(Color::Yellow).bold(),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(" R: restart    Q: quit ", fg)));
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
            .title(Span::styled(" Sandtris ", theme.title)),
    );
    p.render(popup, frame.buffer_mut());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_keeps_world_aspect() {
        let area = Rect::new(0, 0, 120, 42);
        let (cols, rows) = board_cells(area, (200.0, 400.0));
        assert_eq!((cols, rows), (40, 40));

        let narrow = Rect::new(0, 0, 50, 42);
        let (cols, rows) = board_cells(narrow, (200.0, 400.0));
        assert_eq!((cols, rows), (24, 24));
    }

    #[test]
    fn boundary_surface_faces_the_playfield() {
        let floor = boundary_surface((0.0, -10.0), (200.0, -10.0), 10.0, (100.0, 200.0));
        assert_eq!(floor, [(0.0, 0.0), (200.0, 0.0)]);
        let right = boundary_surface((210.0, 0.0), (210.0, 400.0), 10.0, (100.0, 200.0));
        assert!((right[0].0 - 200.0).abs() < 1e-9);
    }

    #[test]
    fn flash_covers_band_rows() {
        let board = Rect::new(1, 1, 40, 40);
        // World 400 tall over 40 rows: 10 units per row; bottom band is the last row.
        let rows = flash_rows(board, &[(0.0, 4.0)], 400.0);
        assert_eq!(rows, HashSet::from([40]));
    }

    #[test]
    fn ticks_format_as_clock() {
        assert_eq!(format_ticks(60 * 75, 60), "01:15");
    }
}
