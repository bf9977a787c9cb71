use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Padding, Paragraph},
};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::app::{App, Focus};
use crate::message_log::ChatMessage;
use crate::session::{Connector, SessionState};

const SELECTOR_WIDTH: u16 = 28;
const INPUT_HEIGHT: u16 = 5;

const USER_BG: Color = Color::Rgb(219, 234, 254);
const AGENT_BG: Color = Color::Rgb(243, 244, 246);

pub fn draw<C: Connector>(frame: &mut Frame, app: &mut App<C>) {
    let [body, status] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
    let [selector, chat] =
        Layout::horizontal([Constraint::Length(SELECTOR_WIDTH), Constraint::Min(20)]).areas(body);
    let [log, input] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(INPUT_HEIGHT)]).areas(chat);

    draw_selector(frame, app, selector);
    draw_log(frame, app, log);
    draw_input(frame, app, input);
    draw_status(frame, app, status);
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().add_modifier(Modifier::DIM)
    }
}

fn draw_selector<C: Connector>(frame: &mut Frame, app: &mut App<C>, area: Rect) {
    let selected = app.directory.selected_index();
    let items: Vec<ListItem> = app
        .directory
        .agents()
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let marker = if selected == Some(i) { "● " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Green)),
                Span::raw(agent.name.clone()),
            ]))
        })
        .collect();

    let hint = if app.directory.is_loading() {
        " loading… "
    } else {
        " r refresh "
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(" agents ")
                .title_bottom(Line::styled(hint, Style::default().add_modifier(Modifier::DIM)))
                .borders(Borders::ALL)
                .border_style(focus_style(app.focus == Focus::Selector)),
        )
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, &mut app.selector);
}

fn draw_log<C: Connector>(frame: &mut Frame, app: &mut App<C>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    let inner = block.inner(area);
    let width = inner.width.max(1) as usize;

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.session.log().entries() {
        lines.extend(message_lines(msg, width));
    }

    let top = app
        .session
        .log_mut()
        .viewport_top(lines.len(), inner.height as usize);
    let top = u16::try_from(top).unwrap_or(u16::MAX);

    frame.render_widget(Paragraph::new(lines).block(block).scroll((top, 0)), area);
}

/// Header, wrapped body and a spacer line for one message.
fn message_lines(msg: &ChatMessage, width: usize) -> Vec<Line<'static>> {
    let (who, bg, align) = if msg.is_user {
        ("you", USER_BG, Alignment::Right)
    } else {
        ("agent", AGENT_BG, Alignment::Left)
    };
    let body_style = Style::default().bg(bg).fg(Color::Black);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(who, Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(
                format!(" {}", msg.received_at.format("%H:%M")),
                Style::default().add_modifier(Modifier::DIM),
            ),
        ])
        .alignment(align),
    ];
    for row in wrap(&msg.content, width) {
        lines.push(Line::styled(row, body_style).alignment(align));
    }
    lines.push(Line::raw(""));
    lines
}

/// Break `text` into rows of at most `width` terminal columns, preferring to
/// break after whitespace. Embedded newlines always start a new row. A glyph
/// wider than the whole row still gets a row of its own.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for paragraph in text.split('\n') {
        let chars: Vec<char> = paragraph.chars().collect();
        if chars.is_empty() {
            rows.push(String::new());
            continue;
        }
        let mut start = 0;
        while start < chars.len() {
            let mut end = start;
            let mut used = 0;
            while end < chars.len() {
                let w = chars[end].width().unwrap_or(0);
                if used + w > width && end > start {
                    break;
                }
                used += w;
                end += 1;
            }
            let cut = if end < chars.len() && !chars[end].is_whitespace() {
                chars[start..end]
                    .iter()
                    .rposition(|c| c.is_whitespace())
                    .map_or(end, |i| start + i + 1)
            } else {
                end
            };
            rows.push(chars[start..cut].iter().collect::<String>().trim_end().to_string());
            start = cut;
            while start < chars.len() && chars[start] == ' ' {
                start += 1;
            }
        }
    }
    rows
}

fn draw_input<C: Connector>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let focused = app.focus == Focus::Input;
    let input = app.session.input();
    let placeholder = input.is_empty();
    let text: Text = if placeholder {
        Line::styled("Type your message...", Style::default().add_modifier(Modifier::DIM)).into()
    } else {
        Text::raw(input)
    };

    let block = Block::default()
        .title(" message ")
        .title_bottom(Line::styled(
            " enter send · alt+enter newline ",
            Style::default().add_modifier(Modifier::DIM),
        ))
        .borders(Borders::ALL)
        .border_style(focus_style(focused));
    let inner = block.inner(area);

    // Keep the cursor row visible when the input grows past the box.
    let rows = input.split('\n').count() as u16;
    let scroll = rows.saturating_sub(inner.height.max(1));
    frame.render_widget(Paragraph::new(text).block(block).scroll((scroll, 0)), area);

    if focused {
        let last = input.rsplit('\n').next().unwrap_or("");
        let col = (last.width() as u16).min(inner.width.saturating_sub(1));
        let row = rows.saturating_sub(1).saturating_sub(scroll);
        frame.set_cursor_position(Position::new(inner.x + col, inner.y + row));
    }
}

fn draw_status<C: Connector>(frame: &mut Frame, app: &App<C>, area: Rect) {
    let state = app.session.state();
    let state_style = match state {
        SessionState::Open => Style::default().fg(Color::Green),
        SessionState::Connecting => Style::default().fg(Color::Yellow),
        SessionState::Disconnected | SessionState::Closed => Style::default().fg(Color::Red),
    };
    let agent = app.session.agent().unwrap_or(app.directory.selected());

    let line = Line::from(vec![
        Span::styled(
            format!(" {agent} "),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("[{state}]"), state_style),
        Span::styled(
            format!("  {}  ", app.config.server_url),
            Style::default().add_modifier(Modifier::DIM),
        ),
        Span::raw("tab focus · pgup/pgdn scroll · F5 refresh · esc quit"),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use crate::protocol::parse_base_url;
    use crate::session::testing::FakeConnector;
    use crate::session::{SessionEvent, TransportEvent};
    use ratatui::{Terminal, backend::TestBackend};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn wrap_breaks_on_whitespace() {
        assert_eq!(wrap("hello big world", 9), vec!["hello big", "world"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn wrap_measures_display_width() {
        // CJK glyphs take two columns each
        assert_eq!(wrap("你好世界", 4), vec!["你好", "世界"]);
        assert_eq!(wrap("ab你", 3), vec!["ab", "你"]);
        assert_eq!(wrap("你", 1), vec!["你"]);
        assert_eq!(wrap("hi 你好", 5), vec!["hi", "你好"]);
    }

    #[tokio::test]
    async fn draws_selector_log_and_status() {
        let config = ChatConfig {
            server_url: parse_base_url("http://localhost:3000").unwrap(),
            max_log_entries: None,
            connect_on_start: true,
        };
        let mut app = App::new(config, FakeConnector::default());
        app.start();
        let generation = app.session.generation().unwrap();
        app.session.handle_event(SessionEvent {
            generation,
            event: TransportEvent::Opened,
        });
        app.session.handle_event(SessionEvent {
            generation,
            event: TransportEvent::Frame(r#"{"content":"hello from agent"}"#.into()),
        });

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();
        let screen = buffer_text(&terminal);

        assert!(screen.contains("base_agent"));
        assert!(screen.contains("hello from agent"));
        assert!(screen.contains("[open]"));
        assert!(screen.contains("Type your message..."));
    }
}
