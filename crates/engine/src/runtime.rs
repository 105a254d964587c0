//! Runs one [`Session`] as a single task. Local requests and store
//! notifications are handled strictly one at a time, publish included, so a
//! remote snapshot can never land between an edit and its publish.

use crate::error::SessionError;
use crate::history::HistoryConfig;
use crate::registry;
use crate::session::{Reception, Session};
use crate::store::LayoutStore;
use crate::transition::EditCommand;
use crate::{now_ms, now_rfc3339, ActorId};
use cultigrid_protocol::{CommandRequest, PublishStatus, SessionView, StoredDocument};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, watch};

const REQUEST_CAPACITY: usize = 32;

type Reply = oneshot::Sender<Result<SessionView, SessionError>>;

#[derive(Debug)]
enum Request {
    Command(CommandRequest, Reply),
    SetActor(ActorId, Reply),
    Republish(Reply),
    Resync(Reply),
    View(Reply),
}

/// Cheap to clone; every clone talks to the same session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<PublishStatus>,
}

impl SessionHandle {
    pub async fn command(&self, command: CommandRequest) -> Result<SessionView, SessionError> {
        self.call(|reply| Request::Command(command, reply)).await
    }

    pub async fn set_actor(&self, actor: ActorId) -> Result<SessionView, SessionError> {
        self.call(|reply| Request::SetActor(actor, reply)).await
    }

    /// Write the current layout again, e.g. after a failed publish.
    pub async fn republish(&self) -> Result<SessionView, SessionError> {
        self.call(Request::Republish).await
    }

    /// Fetch the document again. Seeds the session if the bootstrap fetch failed.
    pub async fn resync(&self) -> Result<SessionView, SessionError> {
        self.call(Request::Resync).await
    }

    pub async fn view(&self) -> Result<SessionView, SessionError> {
        self.call(Request::View).await
    }

    /// Publish status as it changes: idle, saving, saved, failed.
    pub fn status(&self) -> watch::Receiver<PublishStatus> {
        self.status.clone()
    }

    async fn call(&self, make: impl FnOnce(Reply) -> Request) -> Result<SessionView, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

/// Start a session task on the current tokio runtime. The first store read
/// happens inside the task before any request is served.
pub fn spawn_session<S: LayoutStore>(
    store: S,
    actor: Option<ActorId>,
    history: HistoryConfig,
) -> SessionHandle {
    let (requests, rx) = mpsc::channel(REQUEST_CAPACITY);
    let (status_tx, status) = watch::channel(PublishStatus::Idle);
    let session = Session::new(actor, history);
    tokio::spawn(run(store, session, rx, status_tx));
    SessionHandle { requests, status }
}

async fn run<S: LayoutStore>(
    store: S,
    mut session: Session,
    mut requests: mpsc::Receiver<Request>,
    status: watch::Sender<PublishStatus>,
) {
    // Subscribe before reading so nothing written in between is missed.
    let mut notifications = store.subscribe();
    let mut feed_open = true;
    let mut worker = Worker {
        store: &store,
        session: &mut session,
        status: &status,
    };
    let _ = worker.fetch();

    loop {
        tokio::select! {
            req = requests.recv() => {
                let Some(req) = req else { break };
                worker.handle(req);
            }
            note = notifications.recv(), if feed_open => match note {
                Ok(stored) => worker.receive(Some(stored)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "store notifications lagged; refetching");
                    let _ = worker.fetch();
                }
                Err(RecvError::Closed) => {
                    tracing::warn!("store notification feed closed");
                    feed_open = false;
                }
            },
        }
    }
    tracing::debug!("session task stopped");
}

struct Worker<'a, S> {
    store: &'a S,
    session: &'a mut Session,
    status: &'a watch::Sender<PublishStatus>,
}

impl<S: LayoutStore> Worker<'_, S> {
    fn handle(&mut self, req: Request) {
        match req {
            Request::Command(command, reply) => {
                let _ = reply.send(self.command(command));
            }
            Request::SetActor(actor, reply) => {
                tracing::info!(actor = actor.as_str(), "actor identity supplied");
                self.session.set_actor(actor);
                if self.session.needs_publish() {
                    let _ = self.publish();
                }
                let _ = reply.send(Ok(self.session.view()));
            }
            Request::Republish(reply) => {
                let out = self.publish().map(|_| self.session.view());
                let _ = reply.send(out);
            }
            Request::Resync(reply) => {
                let out = self.fetch().map(|_| self.session.view());
                let _ = reply.send(out);
            }
            Request::View(reply) => {
                let _ = reply.send(Ok(self.session.view()));
            }
        }
    }

    fn command(&mut self, command: CommandRequest) -> Result<SessionView, SessionError> {
        let changed = match command {
            CommandRequest::Undo => Some(self.session.undo()?),
            CommandRequest::Redo => Some(self.session.redo()?),
            CommandRequest::Place {
                cart_id,
                side,
                slot,
                tag_id,
            } => {
                let tag = registry::lookup(&tag_id).ok_or(SessionError::UnknownTag { tag_id })?;
                let edit = EditCommand::Place {
                    cart_id,
                    side,
                    slot,
                    tag,
                };
                self.session.edit(&edit, now_ms())?
            }
            CommandRequest::RemoveLast {
                cart_id,
                side,
                slot,
            } => {
                let edit = EditCommand::RemoveLast {
                    cart_id,
                    side,
                    slot,
                };
                self.session.edit(&edit, now_ms())?
            }
            CommandRequest::ClearCart { cart_id } => {
                self.session.edit(&EditCommand::ClearCart { cart_id }, now_ms())?
            }
        };
        if changed.is_some() {
            // A failed write shows up in the status; the local edit stands.
            let _ = self.publish();
        }
        Ok(self.session.view())
    }

    fn fetch(&mut self) -> Result<(), SessionError> {
        match self.store.get() {
            Ok(snapshot) => {
                self.receive(snapshot);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "store read failed");
                self.session.fetch_failed();
                self.status.send_replace(self.session.status());
                Err(SessionError::store(&err))
            }
        }
    }

    fn receive(&mut self, snapshot: Option<StoredDocument>) {
        let reception = self.session.on_remote_snapshot(snapshot);
        let seeded_default = matches!(
            reception,
            Reception::Seeded {
                publish_default: true
            }
        );
        if seeded_default && self.session.actor().is_some() {
            let _ = self.publish();
        }
    }

    fn publish(&mut self) -> Result<(), SessionError> {
        let document = self.session.outgoing(now_rfc3339())?;
        self.session.begin_publish();
        self.status.send_replace(PublishStatus::Saving);

        let result = self.store.put(&document);
        let out = match result {
            Ok(rev) => {
                tracing::info!(rev, by = document.updated_by.as_str(), "layout published");
                self.session.publish_succeeded(rev);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "layout publish failed");
                self.session.publish_failed();
                Err(SessionError::store(&err))
            }
        };
        self.status.send_replace(self.session.status());
        out
    }
}
