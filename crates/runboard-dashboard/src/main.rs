mod app;
mod config;
mod logging;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::{ApiEvent, App, Effect, JobDetail, Screen};
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use runboard_api::ApiClient;
use runboard_core::SortedView;
use runboard_live::{RunBoard, ViewController};
use std::{io, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

const API_QUEUE_CAPACITY: usize = 64;
const REDRAW_INTERVAL_MS: u64 = 1000;

type Backend = CrosstermBackend<io::Stdout>;

/// Everything the app asks the event loop to do goes through here.
struct Services {
    api: ApiClient,
    api_tx: mpsc::Sender<ApiEvent>,
    live: ViewController,
    live_url: String,
}

impl Services {
    fn run_all(&mut self, effects: Vec<Effect>, app: &mut App) {
        for effect in effects {
            self.run(effect, app);
        }
    }

    fn run(&mut self, effect: Effect, app: &mut App) {
        match effect {
            Effect::ActivateLive => self.activate_live(app),
            Effect::DeactivateLive => self.live.deactivate(),
            Effect::Reconnect => {
                info!(event = "live_reconnect");
                self.live.deactivate();
                self.activate_live(app);
            }
            Effect::FetchJobs => {
                let api = self.api.clone();
                let tx = self.api_tx.clone();
                tokio::spawn(async move {
                    let result = api.list_jobs().await;
                    let _ = tx.send(ApiEvent::Jobs(result)).await;
                });
            }
            Effect::FetchJob(job_id) => {
                let api = self.api.clone();
                let tx = self.api_tx.clone();
                tokio::spawn(async move {
                    let result = tokio::try_join!(api.get_job(&job_id), api.get_job_runs(&job_id))
                        .map(|(record, runs)| JobDetail {
                            record,
                            runs: SortedView::from_records(&runs).into_runs(),
                        });
                    let _ = tx.send(ApiEvent::Job { job_id, result }).await;
                });
            }
            Effect::FetchRun(run_id) => {
                let api = self.api.clone();
                let tx = self.api_tx.clone();
                tokio::spawn(async move {
                    let result = api.get_run(&run_id).await;
                    let _ = tx.send(ApiEvent::Run { run_id, result }).await;
                });
            }
        }
    }

    fn activate_live(&mut self, app: &mut App) {
        if let Err(err) = self.live.activate(&self.live_url) {
            warn!(event = "live_activate_error", error = %err);
            app.status_note = Some(format!("live view unavailable: {err}"));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    let _log_guard = logging::init_logging(&config);
    info!(event = "dashboard_start", server = %config.server, live_url = %config.live_url);

    let api = ApiClient::new(&config.server).context("building api client")?;
    let (api_tx, api_rx) = mpsc::channel(API_QUEUE_CAPACITY);
    let live = ViewController::new();
    let board_rx = live.subscribe();
    let mut services = Services {
        api,
        api_tx,
        live,
        live_url: config.live_url.clone(),
    };

    let mut app = App::new(config.server.clone());
    let mut terminal = setup_terminal()?;
    let effects = app.start(Screen::from(config.start));
    services.run_all(effects, &mut app);

    let result = run_app(&mut terminal, &mut app, &mut services, board_rx, api_rx).await;
    services.live.deactivate();
    restore_terminal(&mut terminal)?;
    info!(event = "dashboard_exit");
    result
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<Backend>,
    app: &mut App,
    services: &mut Services,
    mut board_rx: watch::Receiver<RunBoard>,
    mut api_rx: mpsc::Receiver<ApiEvent>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(Duration::from_millis(REDRAW_INTERVAL_MS));

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;

        let streaming = services.live.is_streaming();
        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        let effects = app.handle_key(key);
                        services.run_all(effects, app);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                }
            }
            signal = services.live.next_update(), if streaming => {
                if let Some(signal) = signal {
                    app.on_live_signal(&signal);
                }
            }
            changed = board_rx.changed() => {
                if changed.is_ok() {
                    let board = board_rx.borrow_and_update().clone();
                    app.set_board(board);
                }
            }
            Some(event) = api_rx.recv() => {
                app.apply_api_event(event);
            }
            _ = redraw.tick() => {}
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}
