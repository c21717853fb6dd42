use futures::future::BoxFuture;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{interval_at, Duration, Instant, Interval, MissedTickBehavior},
};
use tracing::debug;

use crate::{
    config::ConfigPatch,
    core::governor::CleanupReport,
    engine::{
        history::{HistoryEngine, HistoryState},
        transaction::{BoxedMutator, OperationRequest},
        HistoryError,
    },
    export::ExportError,
    op::{EntrySummary, OperationRecord},
    surface::Surface,
    types::{BoxError, Metadata, OpId},
};

use super::events::HistoryEvent;

/// Failures surfaced through [`HistoryHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The engine rejected or failed the call.
    #[error(transparent)]
    History(#[from] HistoryError),
    /// Export encoding failed.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// The runtime task is gone.
    #[error("history runtime channel closed")]
    ChannelClosed,
}

/// Channel sizing for [`spawn_history`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Pending commands before callers wait.
    pub command_queue_bound: usize,
    /// Broadcast buffer per subscriber.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

/// Cloneable front end of the single-writer history task.
pub struct HistoryHandle<S> {
    cmd_tx: mpsc::Sender<Command<S>>,
    events_tx: broadcast::Sender<HistoryEvent>,
}

impl<S> Clone for HistoryHandle<S> {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command<S> {
    Execute {
        request: OperationRequest,
        mutator: BoxedMutator<S>,
        resp: oneshot::Sender<Result<OpId, RuntimeError>>,
    },
    StartComposite {
        description: String,
        metadata: Metadata,
        resp: oneshot::Sender<Result<OpId, RuntimeError>>,
    },
    EndComposite {
        resp: oneshot::Sender<Result<Option<OpId>, RuntimeError>>,
    },
    Undo {
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    Redo {
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    JumpTo {
        index: Option<usize>,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    Clear {
        resp: oneshot::Sender<()>,
    },
    Cleanup {
        target: Option<usize>,
        resp: oneshot::Sender<CleanupReport>,
    },
    History {
        resp: oneshot::Sender<Vec<EntrySummary>>,
    },
    GetOperation {
        id: OpId,
        resp: oneshot::Sender<Option<OperationRecord>>,
    },
    State {
        resp: oneshot::Sender<HistoryState>,
    },
    Export {
        resp: oneshot::Sender<Result<Vec<u8>, RuntimeError>>,
    },
    Import {
        bytes: Vec<u8>,
        resp: oneshot::Sender<bool>,
    },
    UpdateConfig {
        patch: ConfigPatch,
        resp: oneshot::Sender<()>,
    },
    Shutdown {
        resp: oneshot::Sender<HistoryEngine<S>>,
    },
}

/// Moves `engine` onto its own task and returns a handle to it.
///
/// Every call is serialized through one command queue, so callers on any
/// number of tasks never interleave captures. The auto-cleanup timer ticks in
/// the same loop and mutates the stack only between commands.
pub fn spawn_history<S>(engine: HistoryEngine<S>, config: RuntimeConfig) -> HistoryHandle<S>
where
    S: Surface + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command<S>>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<HistoryEvent>(config.event_capacity.max(1));
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut engine = engine;
        let mut period = engine.config().auto_cleanup_check_interval();
        let mut ticker = cleanup_ticker(period);

        loop {
            let cmd = tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    cmd
                }
                _ = ticker.tick() => {
                    run_auto_cleanup(&mut engine, &events_tx_loop);
                    continue;
                }
            };

            match cmd {
                Command::Shutdown { resp } => {
                    debug!("history runtime shutting down");
                    let _ = resp.send(engine);
                    break;
                }
                cmd => handle_command(cmd, &mut engine, &events_tx_loop).await,
            }

            let next = engine.config().auto_cleanup_check_interval();
            if next != period {
                period = next;
                ticker = cleanup_ticker(period);
            }
        }
    });

    HistoryHandle { cmd_tx, events_tx }
}

impl<S: Surface + 'static> HistoryHandle<S> {
    /// New receiver for runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events_tx.subscribe()
    }

    /// See [`HistoryEngine::execute_operation`].
    pub async fn execute_operation<F>(
        &self,
        request: OperationRequest,
        mutator: F,
    ) -> Result<OpId, RuntimeError>
    where
        F: for<'s> FnOnce(&'s mut S) -> BoxFuture<'s, Result<(), BoxError>> + Send + 'static,
    {
        let mutator: BoxedMutator<S> = Box::new(mutator);
        self.request(|resp| Command::Execute {
            request,
            mutator,
            resp,
        })
        .await?
    }

    /// See [`HistoryEngine::start_composite`].
    pub async fn start_composite(
        &self,
        description: impl Into<String>,
        metadata: Metadata,
    ) -> Result<OpId, RuntimeError> {
        let description = description.into();
        self.request(|resp| Command::StartComposite {
            description,
            metadata,
            resp,
        })
        .await?
    }

    /// See [`HistoryEngine::end_composite`].
    pub async fn end_composite(&self) -> Result<Option<OpId>, RuntimeError> {
        self.request(|resp| Command::EndComposite { resp }).await?
    }

    /// See [`HistoryEngine::undo`].
    pub async fn undo(&self) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Undo { resp }).await?
    }

    /// See [`HistoryEngine::redo`].
    pub async fn redo(&self) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Redo { resp }).await?
    }

    /// See [`HistoryEngine::jump_to`].
    pub async fn jump_to(&self, index: Option<usize>) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::JumpTo { index, resp }).await?
    }

    /// See [`HistoryEngine::clear_history`].
    pub async fn clear_history(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Clear { resp }).await
    }

    /// See [`HistoryEngine::cleanup`].
    pub async fn cleanup(&self, target: Option<usize>) -> Result<CleanupReport, RuntimeError> {
        self.request(|resp| Command::Cleanup { target, resp }).await
    }

    /// Listing of committed entries.
    pub async fn history(&self) -> Result<Vec<EntrySummary>, RuntimeError> {
        self.request(|resp| Command::History { resp }).await
    }

    /// Owned copy of the record with `id`.
    pub async fn get_operation(&self, id: OpId) -> Result<Option<OperationRecord>, RuntimeError> {
        self.request(|resp| Command::GetOperation { id, resp }).await
    }

    /// See [`HistoryEngine::state`].
    pub async fn state(&self) -> Result<HistoryState, RuntimeError> {
        self.request(|resp| Command::State { resp }).await
    }

    /// See [`HistoryEngine::export_history`].
    pub async fn export_history(&self) -> Result<Vec<u8>, RuntimeError> {
        self.request(|resp| Command::Export { resp }).await?
    }

    /// See [`HistoryEngine::import_history`].
    pub async fn import_history(&self, bytes: Vec<u8>) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Import { bytes, resp }).await
    }

    /// See [`HistoryEngine::update_config`].
    pub async fn update_config(&self, patch: ConfigPatch) -> Result<(), RuntimeError> {
        self.request(|resp| Command::UpdateConfig { patch, resp }).await
    }

    /// Stops the runtime and hands the engine back.
    pub async fn shutdown(&self) -> Result<HistoryEngine<S>, RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command<S>,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command<S: Surface>(
    cmd: Command<S>,
    engine: &mut HistoryEngine<S>,
    events_tx: &broadcast::Sender<HistoryEvent>,
) {
    match cmd {
        Command::Execute {
            request,
            mutator,
            resp,
        } => {
            let composite = engine.open_composite();
            let res = engine
                .execute_operation(request, mutator)
                .await
                .map_err(RuntimeError::from);
            if let Ok(id) = res {
                let _ = events_tx.send(match composite {
                    Some(composite) => HistoryEvent::SubOperationRecorded { composite, id },
                    None => HistoryEvent::Executed { id },
                });
            }
            let _ = resp.send(res);
        }
        Command::StartComposite {
            description,
            metadata,
            resp,
        } => {
            let res = engine
                .start_composite(description, metadata)
                .await
                .map_err(RuntimeError::from);
            if let Ok(id) = res {
                let _ = events_tx.send(HistoryEvent::CompositeOpened { id });
            }
            let _ = resp.send(res);
        }
        Command::EndComposite { resp } => {
            let res = engine.end_composite().await.map_err(RuntimeError::from);
            match res {
                Ok(Some(id)) => {
                    let _ = events_tx.send(HistoryEvent::CompositeSealed { id });
                }
                Ok(None) => {
                    let _ = events_tx.send(HistoryEvent::CompositeDiscarded);
                }
                Err(_) => {}
            }
            let _ = resp.send(res);
        }
        Command::Undo { resp } => {
            let res = engine.undo().await.map_err(RuntimeError::from);
            if let Ok(true) = res {
                let _ = events_tx.send(HistoryEvent::UndoApplied {
                    cursor: engine.stack().cursor(),
                });
            }
            let _ = resp.send(res);
        }
        Command::Redo { resp } => {
            let res = engine.redo().await.map_err(RuntimeError::from);
            if let Ok(true) = res {
                let _ = events_tx.send(HistoryEvent::RedoApplied {
                    cursor: engine.stack().cursor(),
                });
            }
            let _ = resp.send(res);
        }
        Command::JumpTo { index, resp } => {
            let res = engine.jump_to(index).await.map_err(RuntimeError::from);
            if let Ok(true) = res {
                let _ = events_tx.send(HistoryEvent::Jumped {
                    cursor: engine.stack().cursor(),
                });
            }
            let _ = resp.send(res);
        }
        Command::Clear { resp } => {
            engine.clear_history();
            let _ = events_tx.send(HistoryEvent::Cleared);
            let _ = resp.send(());
        }
        Command::Cleanup { target, resp } => {
            let report = engine.cleanup(target);
            let _ = events_tx.send(HistoryEvent::CleanupCompleted {
                evicted: report.evicted,
                usage: report.usage_after,
                automatic: false,
            });
            let _ = resp.send(report);
        }
        Command::History { resp } => {
            let _ = resp.send(engine.history());
        }
        Command::GetOperation { id, resp } => {
            let _ = resp.send(engine.get_operation(id).cloned());
        }
        Command::State { resp } => {
            let _ = resp.send(engine.state());
        }
        Command::Export { resp } => {
            let _ = resp.send(engine.export_history().map_err(RuntimeError::from));
        }
        Command::Import { bytes, resp } => {
            let ok = engine.import_history(&bytes);
            if ok {
                let _ = events_tx.send(HistoryEvent::Imported);
            }
            let _ = resp.send(ok);
        }
        Command::UpdateConfig { patch, resp } => {
            engine.update_config(&patch);
            let _ = events_tx.send(HistoryEvent::ConfigUpdated);
            let _ = resp.send(());
        }
        // Consumed by the loop, which owns the engine.
        Command::Shutdown { .. } => {}
    }
}

fn run_auto_cleanup<S: Surface>(
    engine: &mut HistoryEngine<S>,
    events_tx: &broadcast::Sender<HistoryEvent>,
) {
    if let Some(report) = engine.maybe_auto_cleanup(Instant::now().into_std()) {
        let _ = events_tx.send(HistoryEvent::CleanupCompleted {
            evicted: report.evicted,
            usage: report.usage_after,
            automatic: true,
        });
    }
}

fn cleanup_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
