use crate::app::{App, Fetch, Screen};
use crate::theme::{self, Theme};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};
use runboard_core::RunRecord;
use runboard_live::LinkStatus;
use serde_json::Value;

const STALE_AFTER_SECS: i64 = 30;

pub fn render(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let theme = theme::board_theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);

    frame.render_widget(render_header(app, theme, size.width), layout[0]);
    match &app.screen {
        Screen::Runs => render_runs(frame, app, theme, layout[1]),
        Screen::Jobs => render_jobs(frame, app, theme, layout[1]),
        Screen::Job(job_id) => render_job(frame, app, job_id, theme, layout[1]),
        Screen::Run(run_id) => render_run(frame, app, run_id, theme, layout[1]),
    }
    frame.render_widget(render_footer(app, theme), layout[2]);
    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel(title: String, theme: Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(
            title,
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_header(app: &App, theme: Theme, width: u16) -> Paragraph<'static> {
    let inner_width = width.saturating_sub(4) as usize;
    let board = &app.board;
    let mut spans = vec![
        Span::styled(
            format!("{} ", app.screen.title()),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("[{}] ", board.status.label()),
            Style::default().fg(theme::link_color(board.status, theme)),
        ),
    ];
    let used = spans.iter().map(|span| span.content.chars().count()).sum::<usize>();
    let mut fields = Vec::new();
    if board.status != LinkStatus::Inactive {
        fields.push(format!("Runs: {}", board.runs.len()));
        fields.push(format!("Updated: {}", format_age(board.updated_at, Utc::now())));
    }
    fields.push(format!("Server: {}", app.server));
    spans.push(Span::styled(
        fit_fields(&fields, inner_width.saturating_sub(used).max(12)),
        Style::default().fg(update_color(board, theme)),
    ));

    Paragraph::new(Line::from(spans))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .style(Style::default().bg(theme.bg))
                .title(Span::styled(
                    "Runboard",
                    Style::default()
                        .fg(theme.title)
                        .add_modifier(Modifier::BOLD),
                )),
        )
}

fn update_color(board: &runboard_live::RunBoard, theme: Theme) -> Color {
    match board.updated_at {
        Some(at) if (Utc::now() - at).num_seconds() > STALE_AFTER_SECS => theme.warn,
        _ => theme.muted,
    }
}

fn render_footer(app: &App, theme: Theme) -> Paragraph<'static> {
    if let Some(note) = app.status_note.as_deref() {
        return Paragraph::new(Span::styled(
            note.to_string(),
            Style::default().fg(theme.warn),
        ))
        .style(Style::default().bg(theme.bg));
    }
    let mut hint = String::from("1 runs  2 jobs  j/k move  Enter open  o job");
    if app.can_go_back() {
        hint.push_str("  Esc back");
    }
    hint.push_str(if app.screen == Screen::Runs {
        "  r reconnect"
    } else {
        "  r refresh"
    });
    hint.push_str("  ? help  q quit");
    Paragraph::new(Span::styled(hint, Style::default().fg(theme.muted)))
        .style(Style::default().bg(theme.bg))
}

fn render_runs(frame: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let runs = &app.board.runs;
    if runs.is_empty() {
        let message = match app.board.status {
            LinkStatus::Connecting => "Connecting to runs-live...",
            LinkStatus::Lost => "Stream lost before any runs arrived. Press r to reconnect.",
            _ => "No runs yet.",
        };
        frame.render_widget(empty_panel("Runs", message, theme), area);
        return;
    }

    let rows = runs.iter().enumerate().map(|(index, run)| {
        Row::new(vec![
            Cell::from(run.run_id.clone()),
            Cell::from(run.job_id.clone()),
            Cell::from(Span::styled(
                run.state.as_str(),
                Style::default().fg(theme::state_color(run.run_state(), theme)),
            )),
            Cell::from(run.meta.schedule_time.clone().unwrap_or_default()),
            Cell::from(run.meta.start_time.clone().unwrap_or_default()),
            Cell::from(run.meta.elapsed.map(format_elapsed).unwrap_or_default()),
        ])
        .style(theme::zebra_row_style(index))
    });
    let widths = [
        Constraint::Length(14),
        Constraint::Min(16),
        Constraint::Length(10),
        Constraint::Length(26),
        Constraint::Length(26),
        Constraint::Length(9),
    ];
    let table = Table::new(rows, widths)
        .header(
            Row::new(vec!["ID", "Job", "State", "Schedule", "Start", "Elapsed"])
                .style(theme::HEADER_STYLE),
        )
        .highlight_style(theme::SELECTED_STYLE)
        .block(panel(format!("Runs ({})", runs.len()), theme));
    let mut state = TableState::default();
    state.select(Some(app.selected_run));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_jobs(frame: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let jobs = match &app.jobs {
        Fetch::Ready(jobs) if !jobs.is_empty() => jobs,
        Fetch::Ready(_) => {
            frame.render_widget(empty_panel("Jobs", "No jobs defined.", theme), area);
            return;
        }
        other => {
            frame.render_widget(fetch_placeholder("Jobs", other, theme), area);
            return;
        }
    };

    let rows = jobs.iter().enumerate().map(|(index, job)| {
        Row::new(vec![
            Cell::from(job.job_id.clone()),
            Cell::from(job.program().to_string()),
            Cell::from(job.schedule().to_string()),
        ])
        .style(theme::zebra_row_style(index))
    });
    let widths = [
        Constraint::Percentage(30),
        Constraint::Percentage(40),
        Constraint::Percentage(30),
    ];
    let table = Table::new(rows, widths)
        .header(Row::new(vec!["Job ID", "Program", "Schedule"]).style(theme::HEADER_STYLE))
        .highlight_style(theme::SELECTED_STYLE)
        .block(panel(format!("Jobs ({})", jobs.len()), theme));
    let mut state = TableState::default();
    state.select(Some(app.selected_job));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_job(frame: &mut Frame, app: &App, job_id: &str, theme: Theme, area: Rect) {
    let title = format!("Job {job_id}");
    let detail = match &app.job {
        Fetch::Ready(detail) => detail,
        other => {
            frame.render_widget(fetch_placeholder(&title, other, theme), area);
            return;
        }
    };
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let fields = flatten_fields(&detail.record);
    frame.render_widget(
        Paragraph::new(Text::from(field_lines(&fields, theme)))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel(title, theme))
            .wrap(Wrap { trim: false }),
        layout[0],
    );

    if detail.runs.is_empty() {
        frame.render_widget(empty_panel("Runs", "No runs for this job.", theme), layout[1]);
        return;
    }
    let rows = detail.runs.iter().enumerate().map(|(index, run)| {
        Row::new(vec![
            Cell::from(run.run_id.clone()),
            Cell::from(Span::styled(
                run.state.as_str(),
                Style::default().fg(theme::state_color(run.run_state(), theme)),
            )),
            Cell::from(run.meta.schedule_time.clone().unwrap_or_default()),
            Cell::from(run.meta.elapsed.map(format_elapsed).unwrap_or_default()),
        ])
        .style(theme::zebra_row_style(index))
    });
    let widths = [
        Constraint::Length(14),
        Constraint::Length(10),
        Constraint::Min(26),
        Constraint::Length(9),
    ];
    let table = Table::new(rows, widths)
        .header(Row::new(vec!["ID", "State", "Schedule", "Elapsed"]).style(theme::HEADER_STYLE))
        .highlight_style(theme::SELECTED_STYLE)
        .block(panel(format!("Runs ({})", detail.runs.len()), theme));
    let mut state = TableState::default();
    state.select(Some(app.selected_job_run));
    frame.render_stateful_widget(table, layout[1], &mut state);
}

fn render_run(frame: &mut Frame, app: &App, run_id: &str, theme: Theme, area: Rect) {
    let title = format!("Run {run_id}");
    let run = match &app.run {
        Fetch::Ready(run) => run,
        other => {
            frame.render_widget(fetch_placeholder(&title, other, theme), area);
            return;
        }
    };
    let mut lines = vec![Line::from(vec![
        Span::styled("state  ", Style::default().fg(theme.muted)),
        Span::styled(
            run.state.as_str(),
            Style::default()
                .fg(theme::state_color(run.run_state(), theme))
                .add_modifier(Modifier::BOLD),
        ),
    ])];
    lines.push(Line::from(""));
    lines.extend(field_lines(&run_fields(run), theme));
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel(title, theme))
            .wrap(Wrap { trim: false })
            .scroll((app.scroll, 0)),
        area,
    );
}

fn empty_panel(title: &str, message: &str, theme: Theme) -> Paragraph<'static> {
    Paragraph::new(Line::from(Span::styled(
        message.to_string(),
        Style::default().fg(theme.muted),
    )))
    .style(Style::default().fg(theme.text).bg(theme.surface))
    .block(panel(title.to_string(), theme))
}

fn fetch_placeholder<T>(title: &str, fetch: &Fetch<T>, theme: Theme) -> Paragraph<'static> {
    let (message, color) = match fetch {
        Fetch::Failed(error) => (format!("{error}  (r to retry)"), theme.critical),
        _ => ("Loading...".to_string(), theme.info),
    };
    Paragraph::new(Line::from(Span::styled(message, Style::default().fg(color))))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(panel(title.to_string(), theme))
        .wrap(Wrap { trim: true })
}

fn field_lines(fields: &[(String, String)], theme: Theme) -> Vec<Line<'static>> {
    let key_width = fields
        .iter()
        .map(|(key, _)| key.chars().count())
        .max()
        .unwrap_or(0);
    fields
        .iter()
        .map(|(key, value)| {
            Line::from(vec![
                Span::styled(
                    format!("{key:<key_width$}  "),
                    Style::default().fg(theme.muted),
                ),
                Span::styled(value.clone(), Style::default().fg(theme.text)),
            ])
        })
        .collect()
}

fn run_fields(run: &RunRecord) -> Vec<(String, String)> {
    match serde_json::to_value(run) {
        Ok(Value::Object(map)) => flatten_fields(&map),
        Ok(other) => vec![("run".to_string(), other.to_string())],
        Err(err) => vec![("error".to_string(), err.to_string())],
    }
}

/// Key/value rows for a JSON object; nested objects become dotted keys.
pub fn flatten_fields<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    push_fields("", entries, &mut fields);
    fields
}

fn push_fields<'a>(
    prefix: &str,
    entries: impl IntoIterator<Item = (&'a String, &'a Value)>,
    out: &mut Vec<(String, String)>,
) {
    for (key, value) in entries {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => push_fields(&key, nested, out),
            Value::String(text) => out.push((key, text.clone())),
            Value::Null => out.push((key, String::new())),
            other => out.push((key, other.to_string())),
        }
    }
}

/// Two significant digits below ten seconds, whole seconds above.
pub fn format_elapsed(elapsed: f64) -> String {
    if elapsed >= 10.0 {
        return format!("{elapsed:.0} s");
    }
    if elapsed <= 0.0 {
        return "0.0 s".to_string();
    }
    // Round to two significant digits first; 9.96 carries into the next decade.
    let mut exponent = elapsed.log10().floor() as i32;
    let mut mantissa = (elapsed * 10f64.powi(1 - exponent)).round();
    if mantissa >= 100.0 {
        exponent += 1;
        mantissa /= 10.0;
    }
    let rounded = mantissa * 10f64.powi(exponent - 1);
    if exponent >= 1 {
        return format!("{rounded:.0} s");
    }
    let decimals = (1 - exponent) as usize;
    format!("{rounded:.decimals$} s")
}

pub fn format_age(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match updated_at {
        Some(at) => {
            let secs = (now - at).num_seconds().max(0);
            if secs == 0 {
                "just now".to_string()
            } else {
                format!("{secs}s ago")
            }
        }
        None => "never".to_string(),
    }
}

fn render_help_overlay(frame: &mut Frame, theme: Theme) {
    let area = centered_rect(60, 60, frame.size());
    let section = |title: &'static str| {
        Line::from(Span::styled(
            title,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        section("Screens"),
        Line::from("  1        live runs"),
        Line::from("  2        jobs"),
        Line::from("  Enter    open selected run or job"),
        Line::from("  o        open the selected run's job"),
        Line::from("  Esc      back"),
        Line::from(""),
        section("Data"),
        Line::from("  j/k      move selection"),
        Line::from("  r        reconnect live runs / refetch screen"),
        Line::from(""),
        section("Exit"),
        Line::from("  ?        toggle this help"),
        Line::from("  q        quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel("Help".to_string(), theme))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}

fn fit_fields(fields: &[String], max: usize) -> String {
    let mut output = String::new();
    for field in fields {
        let candidate = if output.is_empty() {
            field.clone()
        } else {
            format!("{output} | {field}")
        };
        if candidate.chars().count() <= max {
            output = candidate;
            continue;
        }
        if output.is_empty() {
            return ellipsize(field, max);
        }
        break;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn elapsed_keeps_two_significant_digits_for_short_runs() {
        assert_eq!(format_elapsed(12.3), "12 s");
        assert_eq!(format_elapsed(3725.0), "3725 s");
        assert_eq!(format_elapsed(4.31), "4.3 s");
        assert_eq!(format_elapsed(0.5), "0.50 s");
        assert_eq!(format_elapsed(0.0123), "0.012 s");
        assert_eq!(format_elapsed(0.0), "0.0 s");
    }

    #[test]
    fn elapsed_rounding_up_moves_to_the_next_format() {
        assert_eq!(format_elapsed(9.96), "10 s");
        assert_eq!(format_elapsed(0.996), "1.0 s");
        assert_eq!(format_elapsed(0.0996), "0.10 s");
        assert_eq!(format_elapsed(9.94), "9.9 s");
    }

    #[test]
    fn age_reads_in_seconds() {
        let now = Utc::now();
        assert_eq!(format_age(None, now), "never");
        assert_eq!(format_age(Some(now), now), "just now");
        assert_eq!(format_age(Some(now - Duration::seconds(42)), now), "42s ago");
    }

    #[test]
    fn nested_fields_become_dotted_keys() {
        let value = json!({
            "job_id": "backup",
            "program": {"type": "shell", "command": "backup.sh"},
            "params": ["date"],
            "empty": {}
        });
        let Value::Object(map) = value else {
            panic!("object");
        };
        assert_eq!(
            flatten_fields(&map),
            vec![
                ("empty".to_string(), "{}".to_string()),
                ("job_id".to_string(), "backup".to_string()),
                ("params".to_string(), "[\"date\"]".to_string()),
                ("program.command".to_string(), "backup.sh".to_string()),
                ("program.type".to_string(), "shell".to_string()),
            ]
        );
    }

    #[test]
    fn fit_fields_drops_trailing_fields_that_do_not_fit() {
        let fields = vec!["Runs: 12".to_string(), "Updated: just now".to_string()];
        assert_eq!(fit_fields(&fields, 40), "Runs: 12 | Updated: just now");
        assert_eq!(fit_fields(&fields, 12), "Runs: 12");
        assert_eq!(fit_fields(&fields, 5), "Ru...");
    }
}
