use ratatui::style::{Color, Modifier, Style};
use runboard_core::RunState;
use runboard_live::LinkStatus;

#[derive(Clone, Copy)]
pub struct Theme {
    pub bg: Color,
    pub surface: Color,
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub info: Color,
}

pub fn board_theme() -> Theme {
    Theme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

pub fn state_color(state: RunState, theme: Theme) -> Color {
    match state {
        RunState::Succeeded => theme.ok,
        RunState::Failed | RunState::Error => theme.critical,
        RunState::Running | RunState::Starting => theme.accent,
        RunState::Waiting => theme.warn,
        RunState::Scheduled => theme.info,
        RunState::New | RunState::Skipped | RunState::Unknown => theme.muted,
    }
}

pub fn link_color(status: LinkStatus, theme: Theme) -> Color {
    match status {
        LinkStatus::Live => theme.ok,
        LinkStatus::Connecting => theme.warn,
        LinkStatus::Lost => theme.critical,
        LinkStatus::Inactive => theme.muted,
    }
}
