use crate::config::StartScreen;
use crossterm::event::{KeyCode, KeyEvent};
use runboard_api::{ApiError, JobRecord, JobSummary};
use runboard_core::RunRecord;
use runboard_live::{ConnectionSignal, RunBoard};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Runs,
    Jobs,
    Job(String),
    Run(String),
}

impl Screen {
    pub fn title(&self) -> String {
        match self {
            Screen::Runs => "Runs".to_string(),
            Screen::Jobs => "Jobs".to_string(),
            Screen::Job(job_id) => format!("Job {job_id}"),
            Screen::Run(run_id) => format!("Run {run_id}"),
        }
    }
}

impl From<StartScreen> for Screen {
    fn from(start: StartScreen) -> Self {
        match start {
            StartScreen::Runs => Screen::Runs,
            StartScreen::Jobs => Screen::Jobs,
        }
    }
}

/// State of one REST-backed screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Idle,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> Fetch<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Fetch::Ready(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobDetail {
    pub record: JobRecord,
    /// Ordered by schedule time.
    pub runs: Vec<RunRecord>,
}

/// Work the event loop performs on behalf of the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ActivateLive,
    DeactivateLive,
    Reconnect,
    FetchJobs,
    FetchJob(String),
    FetchRun(String),
}

#[derive(Debug)]
pub enum ApiEvent {
    Jobs(Result<Vec<JobSummary>, ApiError>),
    Job {
        job_id: String,
        result: Result<JobDetail, ApiError>,
    },
    Run {
        run_id: String,
        result: Result<RunRecord, ApiError>,
    },
}

pub struct App {
    pub server: String,
    pub screen: Screen,
    history: Vec<Screen>,
    pub board: RunBoard,
    pub jobs: Fetch<Vec<JobSummary>>,
    pub job: Fetch<JobDetail>,
    pub run: Fetch<RunRecord>,
    pub selected_run: usize,
    pub selected_job: usize,
    pub selected_job_run: usize,
    pub scroll: u16,
    pub help_open: bool,
    pub status_note: Option<String>,
    should_quit: bool,
}

impl App {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            screen: Screen::Runs,
            history: Vec::new(),
            board: RunBoard::default(),
            jobs: Fetch::Idle,
            job: Fetch::Idle,
            run: Fetch::Idle,
            selected_run: 0,
            selected_job: 0,
            selected_job_run: 0,
            scroll: 0,
            help_open: false,
            status_note: None,
            should_quit: false,
        }
    }

    /// Effects needed to show the first screen.
    pub fn start(&mut self, screen: Screen) -> Vec<Effect> {
        self.screen = screen.clone();
        self.enter(&screen)
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn can_go_back(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
            self.help_open = !self.help_open;
            return Vec::new();
        }
        if self.help_open {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                self.help_open = false;
            }
            return Vec::new();
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Vec::new()
            }
            KeyCode::Char('1') => self.jump_to(Screen::Runs),
            KeyCode::Char('2') => self.jump_to(Screen::Jobs),
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(1);
                Vec::new()
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-1);
                Vec::new()
            }
            KeyCode::Enter => match self.selected_target() {
                Some(target) => self.navigate(target),
                None => Vec::new(),
            },
            KeyCode::Char('o') => match self.selected_job_id() {
                Some(job_id) => self.navigate(Screen::Job(job_id)),
                None => Vec::new(),
            },
            KeyCode::Esc | KeyCode::Backspace => self.back(),
            KeyCode::Char('r') => self.refresh(),
            _ => Vec::new(),
        }
    }

    /// Opens `screen` on top of the current one.
    pub fn navigate(&mut self, screen: Screen) -> Vec<Effect> {
        if screen == self.screen {
            return Vec::new();
        }
        let previous = std::mem::replace(&mut self.screen, screen.clone());
        let mut effects = self.leave(&previous, &screen);
        self.history.push(previous);
        effects.extend(self.enter(&screen));
        effects
    }

    /// Switches to a top-level screen, dropping the back stack.
    fn jump_to(&mut self, screen: Screen) -> Vec<Effect> {
        if screen == self.screen {
            return Vec::new();
        }
        let previous = std::mem::replace(&mut self.screen, screen.clone());
        self.history.clear();
        let mut effects = self.leave(&previous, &screen);
        effects.extend(self.enter(&screen));
        effects
    }

    pub fn back(&mut self) -> Vec<Effect> {
        let Some(screen) = self.history.pop() else {
            return Vec::new();
        };
        let previous = std::mem::replace(&mut self.screen, screen.clone());
        let mut effects = self.leave(&previous, &screen);
        effects.extend(self.enter(&screen));
        effects
    }

    fn leave(&mut self, previous: &Screen, next: &Screen) -> Vec<Effect> {
        self.scroll = 0;
        self.status_note = None;
        if *previous == Screen::Runs && *next != Screen::Runs {
            vec![Effect::DeactivateLive]
        } else {
            Vec::new()
        }
    }

    fn enter(&mut self, screen: &Screen) -> Vec<Effect> {
        match screen {
            Screen::Runs => {
                self.selected_run = 0;
                vec![Effect::ActivateLive]
            }
            Screen::Jobs => {
                self.jobs = Fetch::Loading;
                vec![Effect::FetchJobs]
            }
            Screen::Job(job_id) => {
                self.job = Fetch::Loading;
                self.selected_job_run = 0;
                vec![Effect::FetchJob(job_id.clone())]
            }
            Screen::Run(run_id) => {
                self.run = Fetch::Loading;
                vec![Effect::FetchRun(run_id.clone())]
            }
        }
    }

    fn refresh(&mut self) -> Vec<Effect> {
        self.status_note = None;
        if self.screen == Screen::Runs {
            self.selected_run = 0;
            return vec![Effect::Reconnect];
        }
        let screen = self.screen.clone();
        self.enter(&screen)
    }

    fn move_selection(&mut self, delta: isize) {
        match &self.screen {
            Screen::Runs => {
                self.selected_run = step(self.selected_run, delta, self.board.runs.len());
            }
            Screen::Jobs => {
                let len = self.jobs.ready().map(Vec::len).unwrap_or(0);
                self.selected_job = step(self.selected_job, delta, len);
            }
            Screen::Job(_) => {
                let len = self.job.ready().map(|detail| detail.runs.len()).unwrap_or(0);
                self.selected_job_run = step(self.selected_job_run, delta, len);
            }
            Screen::Run(_) => {
                self.scroll = if delta < 0 {
                    self.scroll.saturating_sub(1)
                } else {
                    self.scroll.saturating_add(1)
                };
            }
        }
    }

    pub fn selected_board_run(&self) -> Option<&RunRecord> {
        self.board.runs.get(self.selected_run)
    }

    fn selected_target(&self) -> Option<Screen> {
        match &self.screen {
            Screen::Runs => self
                .selected_board_run()
                .map(|run| Screen::Run(run.run_id.clone())),
            Screen::Jobs => self
                .jobs
                .ready()
                .and_then(|jobs| jobs.get(self.selected_job))
                .map(|job| Screen::Job(job.job_id.clone())),
            Screen::Job(_) => self
                .job
                .ready()
                .and_then(|detail| detail.runs.get(self.selected_job_run))
                .map(|run| Screen::Run(run.run_id.clone())),
            Screen::Run(_) => None,
        }
    }

    fn selected_job_id(&self) -> Option<String> {
        match &self.screen {
            Screen::Runs => self.selected_board_run().map(|run| run.job_id.clone()),
            Screen::Run(_) => self.run.ready().map(|run| run.job_id.clone()),
            Screen::Job(_) => self
                .job
                .ready()
                .and_then(|detail| detail.runs.get(self.selected_job_run))
                .map(|run| run.job_id.clone()),
            Screen::Jobs => None,
        }
    }

    /// Replaces the rendered run list, keeping the selection in range.
    pub fn set_board(&mut self, board: RunBoard) {
        let selected_id = self.selected_board_run().map(|run| run.run_id.clone());
        self.board = board;
        if let Some(run_id) = selected_id {
            if let Some(position) = self.board.runs.iter().position(|run| run.run_id == run_id) {
                self.selected_run = position;
            }
        }
        self.selected_run = self
            .selected_run
            .min(self.board.runs.len().saturating_sub(1));
    }

    pub fn on_live_signal(&mut self, signal: &ConnectionSignal) {
        match signal {
            ConnectionSignal::Opened => self.status_note = None,
            ConnectionSignal::Applied(_) => {}
            ConnectionSignal::Lost(lost) => {
                self.status_note = Some(format!("stream lost ({}); press r to reconnect", lost.reason));
            }
        }
    }

    /// Applies a REST response unless the screen that asked for it is gone.
    pub fn apply_api_event(&mut self, event: ApiEvent) {
        match event {
            ApiEvent::Jobs(result) => {
                if self.screen != Screen::Jobs {
                    debug!(event = "stale_response", kind = "jobs");
                    return;
                }
                self.jobs = fetch_from(result);
                let len = self.jobs.ready().map(Vec::len).unwrap_or(0);
                self.selected_job = self.selected_job.min(len.saturating_sub(1));
            }
            ApiEvent::Job { job_id, result } => {
                if self.screen != Screen::Job(job_id.clone()) {
                    debug!(event = "stale_response", kind = "job", job_id = %job_id);
                    return;
                }
                self.job = fetch_from(result);
            }
            ApiEvent::Run { run_id, result } => {
                if self.screen != Screen::Run(run_id.clone()) {
                    debug!(event = "stale_response", kind = "run", run_id = %run_id);
                    return;
                }
                self.run = fetch_from(result);
            }
        }
    }
}

fn fetch_from<T>(result: Result<T, ApiError>) -> Fetch<T> {
    match result {
        Ok(value) => Fetch::Ready(value),
        Err(err) => Fetch::Failed(err.to_string()),
    }
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = current as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use runboard_core::RunState;
    use runboard_live::LinkStatus;
    use std::collections::BTreeMap;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn board_with(runs: &[(&str, &str)]) -> RunBoard {
        RunBoard {
            runs: runs
                .iter()
                .map(|(run_id, job_id)| RunRecord::new(*run_id, *job_id, RunState::Running))
                .collect(),
            status: LinkStatus::Live,
            ..RunBoard::default()
        }
    }

    fn app_on_runs() -> App {
        let mut app = App::new("http://localhost:5000");
        assert_eq!(app.start(Screen::Runs), vec![Effect::ActivateLive]);
        app.set_board(board_with(&[("r2", "backup"), ("r1", "report")]));
        app
    }

    #[test]
    fn leaving_runs_deactivates_and_returning_reactivates() {
        let mut app = app_on_runs();

        assert_eq!(
            app.handle_key(key(KeyCode::Char('2'))),
            vec![Effect::DeactivateLive, Effect::FetchJobs]
        );
        assert_eq!(app.jobs, Fetch::Loading);
        assert_eq!(app.handle_key(key(KeyCode::Char('2'))), Vec::new());
        assert_eq!(
            app.handle_key(key(KeyCode::Char('1'))),
            vec![Effect::ActivateLive]
        );
        assert!(!app.can_go_back());
    }

    #[test]
    fn enter_opens_selected_run_and_back_returns_to_live_view() {
        let mut app = app_on_runs();
        app.handle_key(key(KeyCode::Char('j')));
        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(app.selected_run, 1);

        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            vec![Effect::DeactivateLive, Effect::FetchRun("r1".to_string())]
        );
        assert_eq!(app.screen, Screen::Run("r1".to_string()));
        assert_eq!(
            app.handle_key(key(KeyCode::Esc)),
            vec![Effect::ActivateLive]
        );
        assert_eq!(app.screen, Screen::Runs);
        assert_eq!(app.handle_key(key(KeyCode::Esc)), Vec::new());
    }

    #[test]
    fn o_opens_the_selected_runs_job() {
        let mut app = app_on_runs();
        assert_eq!(
            app.handle_key(key(KeyCode::Char('o'))),
            vec![Effect::DeactivateLive, Effect::FetchJob("backup".to_string())]
        );
        assert_eq!(app.screen, Screen::Job("backup".to_string()));
    }

    #[test]
    fn r_reconnects_on_runs_and_refetches_elsewhere() {
        let mut app = app_on_runs();
        assert_eq!(app.handle_key(key(KeyCode::Char('r'))), vec![Effect::Reconnect]);

        app.navigate(Screen::Job("backup".to_string()));
        app.job = Fetch::Failed("boom".to_string());
        assert_eq!(
            app.handle_key(key(KeyCode::Char('r'))),
            vec![Effect::FetchJob("backup".to_string())]
        );
        assert_eq!(app.job, Fetch::Loading);
    }

    #[test]
    fn stale_responses_are_ignored() {
        let mut app = app_on_runs();
        app.navigate(Screen::Run("r1".to_string()));
        app.back();
        app.navigate(Screen::Run("r2".to_string()));

        app.apply_api_event(ApiEvent::Run {
            run_id: "r1".to_string(),
            result: Ok(RunRecord::new("r1", "report", RunState::Failed)),
        });
        assert_eq!(app.run, Fetch::Loading);

        app.apply_api_event(ApiEvent::Jobs(Ok(vec![JobSummary::new("backup")])));
        assert_eq!(app.jobs, Fetch::Idle);

        app.apply_api_event(ApiEvent::Run {
            run_id: "r2".to_string(),
            result: Err(ApiError::Status {
                status: 404,
                message: "no run".to_string(),
            }),
        });
        assert_eq!(app.run, Fetch::Failed("no run [API status 404]".to_string()));
    }

    #[test]
    fn selection_follows_the_selected_run_across_reorders() {
        let mut app = app_on_runs();
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.selected_board_run().map(|run| run.run_id.as_str()), Some("r1"));

        app.set_board(board_with(&[("r0", "early"), ("r2", "backup"), ("r1", "report")]));
        assert_eq!(app.selected_board_run().map(|run| run.run_id.as_str()), Some("r1"));

        app.set_board(RunBoard::default());
        assert_eq!(app.selected_run, 0);
        assert_eq!(app.handle_key(key(KeyCode::Enter)), Vec::new());
    }

    #[test]
    fn job_screen_lists_runs_and_opens_them() {
        let mut app = app_on_runs();
        app.navigate(Screen::Job("backup".to_string()));
        app.apply_api_event(ApiEvent::Job {
            job_id: "backup".to_string(),
            result: Ok(JobDetail {
                record: BTreeMap::new(),
                runs: vec![
                    RunRecord::new("b1", "backup", RunState::Succeeded),
                    RunRecord::new("b2", "backup", RunState::Running),
                ],
            }),
        });
        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            vec![Effect::FetchRun("b2".to_string())]
        );
        assert_eq!(app.history.len(), 2);
    }

    #[test]
    fn help_swallows_keys_until_closed() {
        let mut app = app_on_runs();
        app.handle_key(key(KeyCode::Char('?')));
        assert!(app.help_open);
        assert_eq!(app.handle_key(key(KeyCode::Char('2'))), Vec::new());
        app.handle_key(key(KeyCode::Esc));
        assert!(!app.help_open);
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit());
    }

    #[test]
    fn lost_signal_leaves_a_note() {
        let mut app = app_on_runs();
        app.on_live_signal(&ConnectionSignal::Lost(runboard_live::ConnectionLost {
            reason: "closed by server".to_string(),
        }));
        assert!(app
            .status_note
            .as_deref()
            .is_some_and(|note| note.contains("closed by server")));
        app.on_live_signal(&ConnectionSignal::Opened);
        assert_eq!(app.status_note, None);
    }
}
