//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────┐
//! │  🌧 Monsoon   CPU │ Memory │ Processes   #42 │
//! ├──────────────────────────────────────────────┤
//! │  PID   Name     CPU ↓   Memory   Command     │
//! │  812   chrome   23.1%   1.2 GB   /opt/...    │
//! │  ...                                         │
//! ├──────────────────────────────────────────────┤
//! │  live  sort: cpu ↓  filter: chr              │
//! │  tab: topic  h: history  1-4: sort  q: quit  │
//! └──────────────────────────────────────────────┘

use super::app::{App, InputMode};
use monsoon_core::{CellValue, Column, ColumnSource, SeriesView, Topic, format_bytes, format_uptime};
use ratatui::{prelude::*, widgets::*};

/// Line colours for history charts, cycled per series.
const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Blue,
    Color::Red,
];

/// Most series drawn at once in history mode.
const MAX_SERIES: usize = 12;

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title + tabs
            Constraint::Min(8),    // main
            Constraint::Length(1), // status
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app);
    if app.row_count() == 0 {
        draw_empty(f, rows[1], app);
    } else {
        match app.projection() {
            monsoon_core::Projection::Instantaneous { columns, rows: data } => {
                draw_table(f, rows[1], app, &columns, &data)
            }
            monsoon_core::Projection::History { columns, series } => {
                draw_chart(f, rows[1], app, &columns, &series)
            }
        }
    }
    draw_status(f, rows[2], app);
    draw_keys(f, rows[3], app);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let titles: Vec<Line> = Topic::ALL.iter().map(|t| Line::from(t.title())).collect();
    let selected = Topic::ALL
        .iter()
        .position(|t| *t == app.topic())
        .unwrap_or(0);
    let spin = if app.controller().is_live() { "" } else { " ⏸" };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" 🌧 Monsoon ", Style::default().bold().fg(Color::Cyan)),
            Span::styled(
                format!(" {}  #{}{spin} ", app.provider_name(), app.cycle_count()),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

    let tabs = Tabs::new(titles)
        .block(block)
        .select(selected)
        .highlight_style(Style::default().bold().fg(Color::Yellow));
    f.render_widget(tabs, area);
}

fn draw_empty(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.topic().title()));
    let mut lines = vec![Line::from("no data yet")];
    if let Some(reason) = app.unavailable() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            reason.to_string(),
            Style::default().fg(Color::Red),
        )));
    } else if !app.view().filter_text.is_empty() {
        lines.push(Line::from(format!(
            "nothing matches '{}'",
            app.view().filter_text
        )));
    }
    let p = Paragraph::new(lines)
        .style(Style::default().fg(Color::DarkGray))
        .block(block);
    f.render_widget(p, area);
}

fn draw_table(
    f: &mut Frame,
    area: Rect,
    app: &App,
    columns: &[&'static str],
    data: &[monsoon_core::DisplayRow],
) {
    let topic = app.topic();
    let view = app.view();
    let cursor = topic.columns().get(app.column_cursor()).map(|c| c.name);
    let specs: Vec<&Column> = columns.iter().filter_map(|n| topic.column(n)).collect();

    let header = Row::new(specs.iter().map(|c| {
        let mut title = c.title.to_string();
        if sorts_on(topic, c, view.sort_key) {
            title = format!("{title} {}", view.sort_direction.arrow());
        }
        let style = if Some(c.name) == cursor {
            Style::default().bold().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().bold()
        };
        Cell::from(title).style(style)
    }))
    .style(Style::default().fg(Color::Cyan));

    let body: Vec<Row> = data
        .iter()
        .map(|row| {
            Row::new(
                specs
                    .iter()
                    .map(|c| format_cell(row.get(c.name).unwrap_or(&CellValue::Missing), c.unit)),
            )
        })
        .collect();

    let widths: Vec<Constraint> = specs.iter().map(|c| column_width(c)).collect();
    let title = format!(
        " {} ({} rows, {}) ",
        topic.title(),
        data.len(),
        app.mode().label()
    );
    let table = Table::new(body, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White))
        .highlight_symbol("▸ ");

    let mut state = app.table_state().clone();
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_chart(
    f: &mut Frame,
    area: Rect,
    app: &App,
    columns: &[&'static str],
    series: &[SeriesView],
) {
    let topic = app.topic();
    let Some((column, field)) = columns.iter().filter_map(|n| topic.column(n)).find_map(|c| {
        match c.source {
            ColumnSource::Field(field) => Some((c, field)),
            ColumnSource::Key | ColumnSource::Label(_) => None,
        }
    }) else {
        let p = Paragraph::new("history needs a numeric column; press c/space to show one")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(p, area);
        return;
    };

    let skip = app.selected().min(series.len().saturating_sub(1));
    let shown: Vec<&SeriesView> = series.iter().skip(skip).take(MAX_SERIES).collect();
    let data: Vec<Vec<(f64, f64)>> = shown
        .iter()
        .map(|s| {
            s.samples
                .iter()
                .enumerate()
                .filter_map(|(i, sample)| sample.get(field).map(|v| (i as f64, v)))
                .collect()
        })
        .collect();

    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;
    for &(_, v) in data.iter().flatten() {
        y_min = y_min.min(v);
        y_max = y_max.max(v);
    }
    if y_min > y_max {
        (y_min, y_max) = (0.0, 1.0);
    }
    if column.unit == "pct" {
        (y_min, y_max) = (0.0, y_max.max(100.0));
    } else if y_max - y_min < f64::EPSILON {
        y_max = y_min + 1.0;
    }

    let datasets: Vec<Dataset> = shown
        .iter()
        .zip(&data)
        .enumerate()
        .map(|(i, (s, points))| {
            let name = s.name.clone().unwrap_or_else(|| s.key.to_string());
            let latest = points.last().map(|&(_, v)| v);
            let label = match latest {
                Some(v) => format!("{name} {}", format_number(v, column.unit)),
                None => name,
            };
            Dataset::default()
                .name(label)
                .marker(symbols::Marker::Braille)
                .style(Style::default().fg(PALETTE[i % PALETTE.len()]))
                .data(points)
        })
        .collect();

    let x_max = (app.capacity() as f64 - 1.0).max(1.0);
    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " {} {} history ({} of {} series) ",
            topic.title(),
            column.title,
            shown.len(),
            series.len()
        )))
        .x_axis(Axis::default().bounds([0.0, x_max]).labels(vec![
            Line::from("0"),
            Line::from(format!("{}", app.capacity())),
        ]))
        .y_axis(Axis::default().bounds([y_min, y_max]).labels(vec![
            Line::from(format_number(y_min, column.unit)),
            Line::from(format_number(y_max, column.unit)),
        ]))
        .legend_position(Some(LegendPosition::TopRight));

    f.render_widget(chart, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let view = app.view();
    let line = if app.input_mode() == InputMode::Filter {
        Line::from(vec![
            Span::styled(" filter: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{}▏", view.filter_text)),
        ])
    } else {
        let mut spans = vec![
            Span::styled(
                format!(" {} ", app.mode().label()),
                Style::default().bold().fg(Color::Cyan),
            ),
            Span::raw(format!(
                " sort: {} {} ",
                view.sort_key,
                view.sort_direction.arrow()
            )),
        ];
        if !view.filter_text.is_empty() {
            spans.push(Span::raw(format!(" filter: {} ", view.filter_text)));
        }
        if app.is_paused() {
            spans.push(Span::styled(" paused ", Style::default().fg(Color::Yellow)));
        }
        if let Some(msg) = app.status().or(app.unavailable()) {
            spans.push(Span::styled(
                format!(" {msg}"),
                Style::default().fg(Color::Red),
            ));
        }
        Line::from(spans)
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_keys(f: &mut Frame, area: Rect, app: &App) {
    let text = match app.input_mode() {
        InputMode::Filter => " type to filter   enter: keep   esc: clear",
        InputMode::Normal if app.topic() == Topic::Processes => {
            " tab: topic  ↑↓ select  h: history  1-4: sort  /: filter  c/space: columns  p: pause  K: kill  q: quit"
        }
        InputMode::Normal => {
            " tab: topic  ↑↓ select  h: history  1-4: sort  /: filter  c/space: columns  p: pause  q: quit"
        }
    };
    let bar = Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn sorts_on(topic: Topic, column: &Column, key: monsoon_core::SortKey) -> bool {
    use monsoon_core::SortKey;
    match (key, column.source) {
        (SortKey::Cpu, ColumnSource::Field(f)) => topic.cpu_field() == Some(f),
        (SortKey::Memory, ColumnSource::Field(f)) => topic.memory_field() == Some(f),
        (SortKey::Name, ColumnSource::Label(l)) => l == "name",
        (SortKey::Id, ColumnSource::Key) => true,
        _ => false,
    }
}

fn column_width(column: &Column) -> Constraint {
    match (column.source, column.unit) {
        (ColumnSource::Label("cmd" | "exe"), _) => Constraint::Min(20),
        (ColumnSource::Label(_), _) => Constraint::Length(18),
        (_, "bytes") => Constraint::Length(11),
        (_, "s") => Constraint::Length(14),
        _ => Constraint::Length(10),
    }
}

fn format_cell(value: &CellValue, unit: &str) -> String {
    match value {
        CellValue::Number(v) => format_number(*v, unit),
        CellValue::Text(s) => s.clone(),
        CellValue::Missing => "—".into(),
    }
}

fn format_number(v: f64, unit: &str) -> String {
    match unit {
        "pct" => format!("{v:.1}%"),
        "bytes" => format_bytes(v.max(0.0) as u64),
        "MHz" => format!("{v:.0} MHz"),
        "s" => format_uptime(v.max(0.0) as u64),
        _ if v.fract() == 0.0 => format!("{v:.0}"),
        _ => format!("{v:.2}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_units() {
        assert_eq!(format_number(12.345, "pct"), "12.3%");
        assert_eq!(format_number(2400.0, "MHz"), "2400 MHz");
        assert_eq!(format_number(7.0, ""), "7");
        assert_eq!(format_cell(&CellValue::Missing, "pct"), "—");
    }

    #[test]
    fn test_sort_marker_follows_key() {
        let topic = Topic::Processes;
        let cpu = topic.column("cpu").unwrap();
        let pid = topic.column("pid").unwrap();
        assert!(sorts_on(topic, cpu, monsoon_core::SortKey::Cpu));
        assert!(!sorts_on(topic, cpu, monsoon_core::SortKey::Memory));
        assert!(sorts_on(topic, pid, monsoon_core::SortKey::Id));
    }
}
