//! Dashboard rendering

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, List, ListItem, Paragraph, Row, Table},
};

use crate::severity::Severity;

use super::state::DashboardState;

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Ok => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Critical => Color::Red,
        Severity::Unknown => Color::Gray,
    }
}

/// Render the whole dashboard
pub fn render(frame: &mut Frame, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    render_header(frame, chunks[0], state);
    render_content(frame, chunks[1], state);
    render_footer(frame, chunks[2], state);
}

fn render_header(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let line = match &state.latest {
        Some(snapshot) => {
            let overall = snapshot.overall_severity();
            Line::from(vec![
                Span::raw(format!(
                    "tick {}  {}  ",
                    snapshot.tick,
                    snapshot.taken_at.format("%H:%M:%S")
                )),
                Span::styled(
                    overall.label(),
                    Style::default()
                        .fg(severity_color(overall))
                        .add_modifier(Modifier::BOLD),
                ),
            ])
        }
        None => Line::from("waiting for first sample..."),
    };

    let header = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title("tcpd live monitor"),
    );
    frame.render_widget(header, area);
}

fn render_content(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30), // Scanner list
            Constraint::Percentage(70), // Metrics
        ])
        .split(area);

    render_scanner_list(frame, chunks[0], state);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    render_metrics_table(frame, right[0], state);
    render_history_chart(frame, right[1], state);
}

fn render_scanner_list(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let scanners = state
        .latest
        .as_ref()
        .map(|s| s.scanners.as_slice())
        .unwrap_or_default();

    let items: Vec<ListItem> = scanners
        .iter()
        .enumerate()
        .map(|(i, scanner)| {
            let color = severity_color(scanner.severity);
            let content = Line::from(vec![
                Span::styled("● ", Style::default().fg(color)),
                Span::raw(scanner.scanner.as_str()),
                Span::raw(" "),
                Span::styled(
                    format!("[{}]", scanner.severity.label()),
                    Style::default().fg(color),
                ),
            ]);

            let mut style = Style::default();
            if i == state.selected {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }

            ListItem::new(content).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Scanners ({})", scanners.len())),
    );
    frame.render_widget(list, area);
}

fn render_metrics_table(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let block = Block::default().borders(Borders::ALL).title("Metrics");

    let Some(scanner) = state.selected_scanner() else {
        frame.render_widget(Paragraph::new("no data").block(block), area);
        return;
    };

    if let Some(error) = &scanner.error {
        let text = Paragraph::new(format!("{}: {}", error.kind, error.message))
            .style(Style::default().fg(Color::Gray))
            .block(block);
        frame.render_widget(text, area);
        return;
    }

    let rows: Vec<Row> = scanner
        .entries
        .iter()
        .map(|entry| {
            let delta = entry
                .delta_per_sec
                .map(|d| format!("{d:+.1}/s"))
                .unwrap_or_default();
            Row::new(vec![
                Cell::from(entry.metric_id.clone()),
                Cell::from(format!("{} {}", entry.value, entry.unit)),
                Cell::from(delta),
                Cell::from(entry.severity.label())
                    .style(Style::default().fg(severity_color(entry.severity))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(35),
            Constraint::Percentage(25),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(
        Row::new(vec!["Metric", "Value", "Change", "Severity"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block);

    frame.render_widget(table, area);
}

/// Chart of the first numeric metric of the selected scanner
fn render_history_chart(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let Some(scanner) = state.selected_scanner() else {
        return;
    };
    let Some((metric, history)) = scanner
        .entries
        .iter()
        .find_map(|e| Some((e, state.history(&scanner.scanner, &e.metric_id)?)))
    else {
        return;
    };

    let data: Vec<(f64, f64)> = history
        .iter()
        .enumerate()
        .map(|(i, value)| (i as f64, *value))
        .collect();

    let max_y = data
        .iter()
        .map(|(_, v)| *v)
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.1;

    let datasets = vec![
        Dataset::default()
            .name(metric.metric_id.as_str())
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&data),
    ];

    let x_max = data.len().max(10) as f64;

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ({})", metric.metric_id, metric.unit)),
        )
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .labels(vec![
                    "0".to_string(),
                    format!("{:.0}", max_y / 2.0),
                    format!("{:.0}", max_y),
                ])
                .bounds([0.0, max_y]),
        );

    frame.render_widget(chart, area);
}

fn render_footer(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let mut footer_text = vec![
        Span::raw("Scanners: "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" | Pause: "),
        Span::styled("Space", Style::default().fg(Color::Yellow)),
        Span::raw(" | Quit: "),
        Span::styled("q/Esc", Style::default().fg(Color::Yellow)),
    ];

    if state.paused {
        footer_text.push(Span::styled(
            "  PAUSED",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let footer = Paragraph::new(Line::from(footer_text)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}
