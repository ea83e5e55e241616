use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::App;
use crate::catalog::{self, CATALOG};
use crate::session::SessionState;
use crate::transcript::ChatRole;

/// Colors for the two themes. The toggle swaps the whole struct.
struct Theme {
    bg: Color,
    fg: Color,
    accent: Color,
    user: Color,
    assistant: Color,
    notice: Color,
    dim: Color,
}

fn theme(dark_mode: bool) -> Theme {
    if dark_mode {
        Theme {
            bg: Color::Black,
            fg: Color::White,
            accent: Color::Cyan,
            user: Color::Cyan,
            assistant: Color::Yellow,
            notice: Color::Magenta,
            dim: Color::DarkGray,
        }
    } else {
        Theme {
            bg: Color::White,
            fg: Color::Black,
            accent: Color::Blue,
            user: Color::Blue,
            assistant: Color::Magenta,
            notice: Color::Red,
            dim: Color::Gray,
        }
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let theme = theme(app.dark_mode);
    let area = frame.area();

    if app.session.state() == SessionState::Closed {
        render_bubble(frame, area, &theme);
        return;
    }

    frame.render_widget(
        Block::default().style(Style::default().bg(theme.bg).fg(theme.fg)),
        area,
    );

    // Main layout: header, messages, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area, &theme);
    render_messages(app, frame, chat_area, &theme);
    render_input(app, frame, input_area, &theme);
    render_footer(app, frame, footer_area, &theme);

    // Overlays (in order of priority)
    if app.session.state() == SessionState::AwaitingModelChoice {
        render_model_picker(app, frame, area, &theme);
    }
    if app.confirm_clear {
        render_confirm_clear(frame, area, &theme);
    }
}

/// Closed state: a small invitation box pinned to the bottom-right corner.
fn render_bubble(frame: &mut Frame, area: Rect, theme: &Theme) {
    let width = 30.min(area.width);
    let height = 3.min(area.height);
    let bubble_area = Rect::new(
        area.width.saturating_sub(width),
        area.height.saturating_sub(height),
        width,
        height,
    );

    frame.render_widget(Clear, bubble_area);
    let bubble = Paragraph::new(Line::from(vec![
        Span::styled(" AI Assistant ", Style::default().fg(theme.accent).bold()),
        Span::styled("o to open", Style::default().fg(theme.dim)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.accent)),
    );
    frame.render_widget(bubble, bubble_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let model = app
        .session
        .selected_model()
        .map(catalog::display_name)
        .unwrap_or("no model");
    let header = Line::from(vec![
        Span::styled(" AI Assistant ", Style::default().fg(theme.accent).bold()),
        Span::styled(&app.status, Style::default().fg(theme.fg)),
        Span::raw("  "),
        Span::styled(format!("[{model}]"), Style::default().fg(theme.dim)),
    ]);
    frame.render_widget(
        Paragraph::new(header).style(Style::default().bg(theme.bg)),
        area,
    );
}

fn render_messages(app: &mut App, frame: &mut Frame, area: Rect, theme: &Theme) {
    // Store inner dimensions for scroll calculations (minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let user_label = Style::default().fg(theme.user).add_modifier(Modifier::BOLD);
    let assistant_label = Style::default()
        .fg(theme.assistant)
        .add_modifier(Modifier::BOLD);
    let notice_style = Style::default()
        .fg(theme.notice)
        .add_modifier(Modifier::ITALIC);

    let mut lines: Vec<Line> = Vec::new();

    if app.transcript.is_empty() && app.pending.is_none() {
        lines.push(Line::from(Span::styled(
            "Select a model to start chatting...",
            Style::default().fg(theme.dim),
        )));
    }

    for msg in app.transcript.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled("You:", user_label)).right_aligned());
                for line in msg.content.lines() {
                    lines.push(Line::from(Span::raw(line.to_string())).right_aligned());
                }
                lines.push(Line::default());
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled("AI:", assistant_label)));
                for line in msg.content.lines() {
                    lines.push(Line::from(Span::raw(line.to_string())));
                }
                lines.push(Line::default());
            }
            ChatRole::System => {
                for line in msg.content.lines() {
                    lines.push(Line::from(Span::styled(format!("~ {line}"), notice_style)));
                }
                lines.push(Line::default());
            }
        }
    }

    // In-progress assistant bubble with its typing indicator
    if let Some(pending) = &app.pending {
        lines.push(Line::from(Span::styled("AI:", assistant_label)));
        if pending.content.is_empty() && pending.active {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{dots}"),
                Style::default().fg(theme.dim).add_modifier(Modifier::ITALIC),
            )));
        } else {
            let mut content_lines: Vec<Line> = pending
                .content
                .lines()
                .map(|line| Line::from(Span::raw(line.to_string())))
                .collect();
            if content_lines.is_empty() {
                content_lines.push(Line::default());
            }
            if pending.active {
                if let Some(last) = content_lines.last_mut() {
                    last.spans
                        .push(Span::styled("▌", Style::default().fg(theme.assistant)));
                }
            }
            lines.extend(content_lines);
        }
        lines.push(Line::default());
    }

    app.chat_total_lines = wrapped_height(&lines, app.chat_width);
    if app.follow {
        app.chat_scroll = app.chat_total_lines.saturating_sub(app.chat_height);
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.dim)),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let editable = matches!(
        app.session.state(),
        SessionState::Ready | SessionState::Streaming
    );
    let border_color = if app.session.can_send() {
        Color::Yellow
    } else {
        theme.dim
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message (Enter to send, Alt+Enter for newline) ");

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Embedded newlines render as a marker so the line stays single-row
    let visible_text: String = app
        .input
        .chars()
        .map(|c| if c == '\n' { '⏎' } else { c })
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(theme.user))
        .block(input_block);

    frame.render_widget(input, area);

    if editable {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let key_style = Style::default()
        .fg(theme.bg)
        .bg(theme.accent)
        .add_modifier(Modifier::BOLD);
    let label_style = Style::default().fg(theme.dim);

    let mut spans = vec![];
    match app.session.state() {
        SessionState::AwaitingModelChoice => {
            spans.extend([
                Span::styled(" j/k ", key_style),
                Span::styled(" nav ", label_style),
                Span::styled(" Enter ", key_style),
                Span::styled(" select ", label_style),
            ]);
        }
        SessionState::Error => {
            spans.extend([
                Span::styled(" r ", key_style),
                Span::styled(" retry ", label_style),
            ]);
        }
        _ => {
            spans.extend([
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" ^L ", key_style),
                Span::styled(" clear ", label_style),
                Span::styled(" ^T ", key_style),
                Span::styled(" theme ", label_style),
            ]);
        }
    }
    spans.extend([
        Span::styled(" Esc ", key_style),
        Span::styled(" close ", label_style),
        Span::styled(" ^C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect, theme: &Theme) {
    // Calculate popup size and position (centered)
    let popup_width = 56.min(area.width.saturating_sub(4));
    let popup_height = (CATALOG.len() as u16 * 4 + 2).min(area.height.saturating_sub(2));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent))
        .style(Style::default().bg(theme.bg).fg(theme.fg))
        .title(" Choose AI Model (Enter to select, Esc to close) ")
        .title_bottom(Line::from(Span::styled(
            " Models download once, then load from cache ",
            Style::default().fg(theme.dim),
        )));

    let items: Vec<ListItem> = CATALOG
        .iter()
        .map(|model| {
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(model.name, Style::default().add_modifier(Modifier::BOLD)),
                    Span::styled(
                        format!("  {} · {} · {}", model.params, model.size, model.speed),
                        Style::default().fg(theme.dim),
                    ),
                ]),
                Line::from(Span::raw(model.description)),
                Line::from(Span::styled(
                    format!("✓ Best for: {}", model.recommended),
                    Style::default().fg(theme.accent),
                )),
                Line::default(),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White));

    frame.render_stateful_widget(list, popup_area, &mut app.picker_state);
}

fn render_confirm_clear(frame: &mut Frame, area: Rect, theme: &Theme) {
    let popup_width = 40.min(area.width.saturating_sub(4));
    let popup_height = 5;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let dialog = Paragraph::new(vec![
        Line::from("Clear all chat history?").centered(),
        Line::default(),
        Line::from(vec![
            Span::styled(" y ", Style::default().fg(theme.bg).bg(theme.notice).bold()),
            Span::raw(" clear   "),
            Span::styled(" n ", Style::default().fg(theme.bg).bg(theme.accent).bold()),
            Span::raw(" keep"),
        ])
        .centered(),
    ])
    .style(Style::default().bg(theme.bg).fg(theme.fg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.notice)),
    );

    frame.render_widget(dialog, popup_area);
}

/// Rows the paragraph occupies after wrapping, so follow mode can pin the
/// scroll offset to the bottom. Mirrors the paragraph's word wrapping: a
/// break between words swallows the separating space, and a word longer
/// than the width spills across rows.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    lines
        .iter()
        .map(|line| {
            let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
            line_rows(&text, width) as u16
        })
        .sum()
}

fn line_rows(text: &str, width: usize) -> usize {
    let mut rows = 1;
    let mut col = 0;
    for word in text.split_whitespace() {
        let mut len = word.chars().count();
        if col > 0 {
            if col + 1 + len <= width {
                col += 1 + len;
                continue;
            }
            rows += 1;
            col = 0;
        }
        while len > width {
            rows += 1;
            len -= width;
        }
        col = len;
    }
    rows
}
