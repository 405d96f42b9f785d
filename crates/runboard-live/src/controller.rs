use crate::connection::{ConnectionManager, ConnectionSignal, ConnectionState};
use crate::error::LiveError;
use chrono::{DateTime, Utc};
use runboard_core::{ObserverId, RunRecord, RunStateStore, SortedView};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Inactive,
    Connecting,
    Live,
    Lost,
}

impl LinkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Inactive => "inactive",
            LinkStatus::Connecting => "connecting",
            LinkStatus::Live => "live",
            LinkStatus::Lost => "disconnected",
        }
    }
}

/// What the presentation layer renders: the sorted runs plus link status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunBoard {
    pub runs: Vec<RunRecord>,
    pub status: LinkStatus,
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
}

struct Activation {
    manager: ConnectionManager,
    store: RunStateStore,
    render: ObserverId,
}

/// Owns the live run view: one store and one connection per activation.
///
/// Every `activate` must be paired with `deactivate`; dropping the controller
/// deactivates it.
pub struct ViewController {
    activation: Option<Activation>,
    board: Arc<watch::Sender<RunBoard>>,
}

impl Default for ViewController {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewController {
    pub fn new() -> Self {
        let (board, _) = watch::channel(RunBoard::default());
        Self {
            activation: None,
            board: Arc::new(board),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunBoard> {
        self.board.subscribe()
    }

    pub fn board(&self) -> RunBoard {
        self.board.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_some()
    }

    /// True while the connection can still deliver signals.
    pub fn is_streaming(&self) -> bool {
        self.connection_state() != ConnectionState::Closed
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.activation
            .as_ref()
            .map(|activation| activation.manager.state())
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn connection(&self) -> Option<&ConnectionManager> {
        self.activation.as_ref().map(|activation| &activation.manager)
    }

    pub fn store(&self) -> Option<&RunStateStore> {
        self.activation.as_ref().map(|activation| &activation.store)
    }

    pub fn activate(&mut self, endpoint_url: &str) -> Result<(), LiveError> {
        if self.activation.is_some() {
            return Err(LiveError::AlreadyActive);
        }
        let mut store = RunStateStore::new();
        let board = self.board.clone();
        let render = store.subscribe(move |store| publish_runs(&board, store));
        let mut manager = ConnectionManager::new();
        manager.open(endpoint_url)?;

        self.board.send_modify(|board| {
            *board = RunBoard {
                status: LinkStatus::Connecting,
                ..RunBoard::default()
            };
        });
        self.activation = Some(Activation {
            manager,
            store,
            render,
        });
        info!(event = "view_activated", url = %endpoint_url);
        Ok(())
    }

    /// Closes the connection and releases the store. Safe in any state.
    pub fn deactivate(&mut self) {
        let Some(mut activation) = self.activation.take() else {
            return;
        };
        activation.manager.close();
        activation.store.unsubscribe(activation.render);
        drop(activation);
        self.board.send_modify(|board| *board = RunBoard::default());
        info!(event = "view_deactivated");
    }

    /// Pulls and applies the next connection signal.
    ///
    /// Returns `None` when there is no activation or its connection has
    /// closed. Cancel-safe, so it can sit in a `tokio::select!` loop.
    pub async fn next_update(&mut self) -> Option<ConnectionSignal> {
        let activation = self.activation.as_mut()?;
        let signal = activation
            .manager
            .next_signal(&mut activation.store)
            .await?;
        match &signal {
            ConnectionSignal::Opened => {
                self.board.send_modify(|board| board.status = LinkStatus::Live);
            }
            ConnectionSignal::Applied(_) => {}
            ConnectionSignal::Lost(lost) => {
                self.board.send_modify(|board| {
                    board.status = LinkStatus::Lost;
                    board.lost_reason = Some(lost.reason.clone());
                });
            }
        }
        Some(signal)
    }
}

impl Drop for ViewController {
    fn drop(&mut self) {
        self.deactivate();
    }
}

fn publish_runs(board: &watch::Sender<RunBoard>, store: &RunStateStore) {
    let view = SortedView::compute(store);
    board.send_modify(|board| {
        board.runs = view.into_runs();
        board.revision = store.revision();
        board.updated_at = Some(Utc::now());
    });
}
