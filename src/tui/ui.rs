//! UI rendering using ratatui
//!
//! Layout:
//! ┌──────────────────────────────────────────────────────────┐
//! │ WORDGRID        [ C A T E _ S R ]                  0:14   │
//! ├───────────────────────────────────────┬──────────────────┤
//! │  15x15 board with special cells,      │ Players          │
//! │  pending tiles, live placements       │ Bonus tile       │
//! │                                       │ Connection       │
//! ├───────────────────────────────────────┴──────────────────┤
//! │ feedback line                                             │
//! │ key help                                                  │
//! └──────────────────────────────────────────────────────────┘

use crate::app::{App, InputMode};
use crate::game::board::{classify, Position, SpecialCell, BOARD_SIZE};
use crate::storage::Store;
use crate::sync::ConnectionStatus;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph},
};
use std::collections::HashMap;
use std::time::Instant;

/// Width of one board cell in columns
const CELL_WIDTH: u16 = 3;

/// Render the game screen
pub fn render<S: Store>(frame: &mut Frame, app: &App<S>, now: Instant) {
    let area = frame.area();

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with rack, timer
            Constraint::Min(BOARD_SIZE as u16 + 2),
            Constraint::Length(3), // Feedback and help
        ])
        .split(area);

    render_header(frame, layout[0], app, now);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(BOARD_SIZE as u16 * CELL_WIDTH + 4),
            Constraint::Min(24),
        ])
        .split(layout[1]);
    render_board(frame, main[0], app);
    render_side_panel(frame, main[1], app);

    render_footer(frame, layout[2], app);
}

fn render_header<S: Store>(frame: &mut Frame, area: Rect, app: &App<S>, now: Instant) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let header_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(12), // Logo
            Constraint::Min(20),    // Rack
            Constraint::Length(10), // Timer
        ])
        .split(inner);

    let logo = Paragraph::new("WORDGRID")
        .style(Style::default().fg(Color::Yellow).bold())
        .alignment(Alignment::Left);
    frame.render_widget(logo, header_layout[0]);

    let rack = Paragraph::new(format_rack(app.session.rack().tiles()))
        .style(Style::default().fg(Color::Cyan).bold())
        .alignment(Alignment::Center);
    frame.render_widget(rack, header_layout[1]);

    let (timer_display, timer_color) = if app.session.is_my_turn() {
        let seconds = app.session.countdown(now);
        let color = if seconds <= 5 { Color::Red } else { Color::Green };
        (format_timer(seconds), color)
    } else {
        ("--".to_string(), Color::DarkGray)
    };
    let timer = Paragraph::new(timer_display)
        .style(Style::default().fg(timer_color).bold())
        .alignment(Alignment::Right);
    frame.render_widget(timer, header_layout[2]);
}

fn render_board<S: Store>(frame: &mut Frame, area: Rect, app: &App<S>) {
    let session = &app.session;
    let board = session.board();
    let pending: HashMap<Position, char> = session
        .pending_tiles()
        .iter()
        .map(|t| (t.pos(), t.letter))
        .collect();
    let live: HashMap<Position, char> = session
        .live_placements()
        .into_iter()
        .map(|p| (p.pos(), p.letter))
        .collect();
    let last_played = session.last_played();

    let lines: Vec<Line> = (0..BOARD_SIZE)
        .map(|y| {
            let spans: Vec<Span> = (0..BOARD_SIZE)
                .map(|x| {
                    let pos = Position::new(x, y);
                    let (text, mut style) = if let Some(letter) = pending.get(&pos) {
                        (format!(" {} ", letter), Style::default().fg(Color::Yellow).bold())
                    } else if let Some(letter) = board.get(pos) {
                        let color = if last_played.contains(&pos) {
                            Color::Green
                        } else {
                            Color::White
                        };
                        (format!(" {} ", letter), Style::default().fg(color).bold())
                    } else if let Some(letter) = live.get(&pos) {
                        (
                            format!(" {} ", letter.to_ascii_lowercase()),
                            Style::default().fg(Color::Magenta),
                        )
                    } else {
                        let cell = classify(pos);
                        (format!("{} ", cell.label()), special_style(cell))
                    };
                    if pos == app.cursor {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                    Span::styled(text, style)
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    let title = match session.game_id() {
        Some(id) => format!("Game {}", id),
        None => "Board".to_string(),
    };
    let board_widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(title),
    );
    frame.render_widget(board_widget, area);
}

fn render_side_panel<S: Store>(frame: &mut Frame, area: Rect, app: &App<S>) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(6),    // Players
            Constraint::Length(3), // Bonus tile
            Constraint::Length(3), // Connection
        ])
        .split(area);

    let session = &app.session;
    let current = session.current_turn();
    let me = session.player_id();
    let items: Vec<ListItem> = session
        .players()
        .iter()
        .map(|player| {
            let marker = if Some(&player.id) == current { "▶" } else { " " };
            let style = if Some(&player.id) == me {
                Style::default().fg(Color::Cyan).bold()
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(format!("{} {} - {}", marker, player.name, player.score)).style(style)
        })
        .collect();
    let status = session
        .game_status()
        .map(|s| s.as_str())
        .unwrap_or("-");
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(format!("Players ({})", status)),
    );
    frame.render_widget(list, layout[0]);

    let bonus = match session.bonus_tile() {
        Some(tile) if tile.is_blank_bonus() => format!("{} (no effect)", tile.letter),
        Some(tile) => format!("{} x{}", tile.letter, tile.multiplier),
        None => "-".to_string(),
    };
    let bonus_widget = Paragraph::new(bonus)
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title("Bonus"));
    frame.render_widget(bonus_widget, layout[1]);

    let status = session.connection_status();
    let color = match status {
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Disconnected => Color::Red,
    };
    let conn = Paragraph::new(status.label())
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Link"));
    frame.render_widget(conn, layout[2]);
}

fn render_footer<S: Store>(frame: &mut Frame, area: Rect, app: &App<S>) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    let (text, color) = format_feedback(&app.feedback);
    frame.render_widget(Paragraph::new(text).style(Style::default().fg(color)), layout[0]);

    let help = match app.mode {
        InputMode::AssignBlank => "A-Z Letter for blank",
        InputMode::Place => {
            "←↑↓→ Move  A-Z Place  ⌫ Take back  Enter Submit  * Blank  ! Clear  @ Reconnect  # Restart  Esc Quit"
        }
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        layout[1],
    );
}

fn special_style(cell: SpecialCell) -> Style {
    let color = match cell {
        SpecialCell::TripleWord => Color::Red,
        SpecialCell::DoubleWord => Color::LightRed,
        SpecialCell::TripleLetter => Color::Blue,
        SpecialCell::DoubleLetter => Color::LightBlue,
        SpecialCell::Plain => Color::DarkGray,
    };
    Style::default().fg(color)
}

/// Format the rack for display
fn format_rack(tiles: &[char]) -> String {
    if tiles.is_empty() {
        return String::from("[ ]");
    }
    let letters: Vec<String> = tiles.iter().map(|c| c.to_string()).collect();
    format!("[ {} ]", letters.join(" "))
}

/// Format the timer display
fn format_timer(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Format feedback with appropriate color
fn format_feedback(feedback: &str) -> (String, Color) {
    let color = if feedback.starts_with("OK") || feedback.starts_with("YOUR TURN") {
        Color::Green
    } else if feedback.starts_with("NOPE") || feedback.starts_with("NOT SAVED") {
        Color::Red
    } else if feedback.starts_with("PRESS AGAIN") {
        Color::Yellow
    } else {
        Color::White
    };
    (feedback.to_string(), color)
}
