use std::sync::Arc;

use anyhow::Result;
use shared::domain::{Lecturer, Partner, TrainingProgram, TrainingProgramRequest};
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};

use crate::PortalApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    PublicPrograms,
    Programs,
    Lecturers,
    Partners,
    Requests,
}

impl ListKind {
    pub const ALL: [ListKind; 5] = [
        ListKind::PublicPrograms,
        ListKind::Programs,
        ListKind::Lecturers,
        ListKind::Partners,
        ListKind::Requests,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ListKind::PublicPrograms => "public programs",
            ListKind::Programs => "programs",
            ListKind::Lecturers => "lecturers",
            ListKind::Partners => "partners",
            ListKind::Requests => "program requests",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loaded(Vec<T>),
    /// The last refresh failed. `items` is whatever was loaded before it and
    /// `message` is shown next to a retry control.
    Failed { items: Vec<T>, message: String },
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        LoadState::Idle
    }
}

impl<T> LoadState<T> {
    pub fn items(&self) -> &[T] {
        match self {
            LoadState::Loaded(items) | LoadState::Failed { items, .. } => items,
            LoadState::Idle => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalEvent {
    ListRefreshed(ListKind),
    /// One-line confirmation for the user.
    Notice(String),
    /// One-line failure for the user.
    Error(String),
}

#[derive(Default)]
struct StoreState {
    public_programs: LoadState<TrainingProgram>,
    programs: LoadState<TrainingProgram>,
    lecturers: LoadState<Lecturer>,
    partners: LoadState<Partner>,
    requests: LoadState<TrainingProgramRequest>,
}

/// Client-side cache of backend lists. Lists are never patched in place:
/// every refresh re-fetches the whole list.
pub struct PortalStore {
    api: Arc<dyn PortalApi>,
    state: RwLock<StoreState>,
    events: broadcast::Sender<PortalEvent>,
}

impl PortalStore {
    pub fn new(api: Arc<dyn PortalApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            api,
            state: RwLock::new(StoreState::default()),
            events,
        })
    }

    pub fn api(&self) -> &Arc<dyn PortalApi> {
        &self.api
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    pub fn notify(&self, message: impl Into<String>) {
        let _ = self.events.send(PortalEvent::Notice(message.into()));
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("portal: {message}");
        let _ = self.events.send(PortalEvent::Error(message));
    }

    /// Re-fetches one list. On failure the list keeps its previous items next
    /// to the error message, and the error is returned so the caller can offer
    /// a retry.
    pub async fn refresh(&self, kind: ListKind) -> Result<()> {
        let outcome = match kind {
            ListKind::PublicPrograms => {
                let fetched = self.api.list_public_programs().await;
                let mut state = self.state.write().await;
                apply(&mut state.public_programs, fetched)
            }
            ListKind::Programs => {
                let fetched = self.api.list_programs().await;
                let mut state = self.state.write().await;
                apply(&mut state.programs, fetched)
            }
            ListKind::Lecturers => {
                let fetched = self.api.list_lecturers().await;
                let mut state = self.state.write().await;
                apply(&mut state.lecturers, fetched)
            }
            ListKind::Partners => {
                let fetched = self.api.list_partners().await;
                let mut state = self.state.write().await;
                apply(&mut state.partners, fetched)
            }
            ListKind::Requests => {
                let fetched = self.api.list_program_requests().await;
                let mut state = self.state.write().await;
                apply(&mut state.requests, fetched)
            }
        };

        match outcome {
            Ok(count) => {
                info!("portal: refreshed {} ({count} items)", kind.label());
                let _ = self.events.send(PortalEvent::ListRefreshed(kind));
                Ok(())
            }
            Err(err) => {
                self.notify_error(format!("failed to load {}: {err}", kind.label()));
                Err(err)
            }
        }
    }

    /// Refreshes every list concurrently; returns the first failure, if any.
    pub async fn refresh_all(&self) -> Result<()> {
        let results =
            futures::future::join_all(ListKind::ALL.iter().map(|kind| self.refresh(*kind))).await;
        results.into_iter().collect()
    }

    pub async fn public_programs(&self) -> LoadState<TrainingProgram> {
        self.state.read().await.public_programs.clone()
    }

    pub async fn programs(&self) -> LoadState<TrainingProgram> {
        self.state.read().await.programs.clone()
    }

    pub async fn lecturers(&self) -> LoadState<Lecturer> {
        self.state.read().await.lecturers.clone()
    }

    pub async fn partners(&self) -> LoadState<Partner> {
        self.state.read().await.partners.clone()
    }

    pub async fn requests(&self) -> LoadState<TrainingProgramRequest> {
        self.state.read().await.requests.clone()
    }
}

fn apply<T>(slot: &mut LoadState<T>, fetched: Result<Vec<T>>) -> Result<usize> {
    match fetched {
        Ok(items) => {
            let count = items.len();
            *slot = LoadState::Loaded(items);
            Ok(count)
        }
        Err(err) => {
            let items = match std::mem::take(slot) {
                LoadState::Loaded(items) | LoadState::Failed { items, .. } => items,
                LoadState::Idle => Vec::new(),
            };
            *slot = LoadState::Failed {
                items,
                message: format!("{err:#}"),
            };
            Err(err)
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
