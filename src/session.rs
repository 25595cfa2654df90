//! Session lifecycle and the event pump.
//!
//! [`SessionLifecycleController`] owns the transport handle, the router
//! (and through it every tracker), and the transcript store. Trackers are
//! reset whenever a connection starts or ends, so no continuation or
//! half-finished tool call survives into the next session.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::commands::OutboundCommand;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::events::InboundEvent;
use crate::router::{RouteOutcome, TransportEventRouter};
use crate::session_lifecycle_span;
use crate::transcript::store::{Transcript, TranscriptStore};
use crate::transcript::types::ItemId;
use crate::transport::Transport;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Session-level information surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// The connection status changed.
    StatusChanged(SessionStatus),
    /// Token usage reported when a response step finished.
    Usage(Value),
    /// Control moved to the named agent.
    AgentHandoff(String),
    /// The session reported an error payload.
    Error(Value),
}

/// Connect/disconnect/mute/interrupt plus event handling for one session.
pub struct SessionLifecycleController<T: Transport, S: TranscriptStore = Transcript> {
    config: RelayConfig,
    status: SessionStatus,
    transport: Option<T>,
    router: TransportEventRouter,
    store: S,
    notices: Option<mpsc::UnboundedSender<SessionNotice>>,
    muted: bool,
}

impl<T: Transport> SessionLifecycleController<T, Transcript> {
    /// Create a disconnected controller backed by an in-memory transcript.
    pub fn new(config: RelayConfig) -> Self {
        Self::with_store(config, Transcript::new())
    }
}

impl<T: Transport, S: TranscriptStore> SessionLifecycleController<T, S> {
    /// Create a disconnected controller that drives `store`.
    pub fn with_store(config: RelayConfig, store: S) -> Self {
        let router = TransportEventRouter::new(config.debug_transcript, config.log_server_side);
        Self {
            config,
            status: SessionStatus::Disconnected,
            transport: None,
            router,
            store,
            notices: None,
            muted: false,
        }
    }

    /// Forward [`SessionNotice`]s to `tx`.
    pub fn with_notices(mut self, tx: mpsc::UnboundedSender<SessionNotice>) -> Self {
        self.notices = Some(tx);
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn transcript(&self) -> &S {
        &self.store
    }

    pub fn transcript_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn router(&self) -> &TransportEventRouter {
        &self.router
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Attach a live transport.
    ///
    /// An existing connection is torn down first. The transcript store is
    /// left alone; it belongs to the caller.
    pub fn connect(&mut self, transport: T) {
        let span = session_lifecycle_span!("connect");
        let _enter = span.enter();

        if self.status != SessionStatus::Disconnected {
            self.disconnect();
        }
        self.set_status(SessionStatus::Connecting);
        self.router.reset();
        self.muted = false;
        self.transport = Some(transport);
        self.set_status(SessionStatus::Connected);
        tracing::info!("session connected");
    }

    /// Tear down the session regardless of in-flight state.
    ///
    /// Entries still `InProgress` in the store are marked `Done`, so the
    /// next session never attaches speech or tool results to them.
    pub fn disconnect(&mut self) {
        let span = session_lifecycle_span!("disconnect");
        let _enter = span.enter();

        let was_live = self.status != SessionStatus::Disconnected;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if was_live {
            let finalized = self
                .router
                .reconciler_mut()
                .finalize_in_progress(&mut self.store);
            if finalized > 0 {
                tracing::debug!(finalized, "closed in-progress transcript entries");
            }
        }
        self.router.reset();
        if was_live {
            self.set_status(SessionStatus::Disconnected);
            tracing::info!("session disconnected");
        }
    }

    /// Mute or unmute outbound audio.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotConnected`] without a live transport, or the
    /// transport's own error.
    pub fn mute(&mut self, muted: bool) -> Result<()> {
        self.live_transport("mute")?.mute(muted)?;
        self.muted = muted;
        if self.config.debug_transcript {
            self.store.add_breadcrumb(&format!("mute: {muted}"), None);
        }
        Ok(())
    }

    /// Interrupt the current assistant turn.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotConnected`] without a live transport, or the
    /// transport's own error.
    pub fn interrupt(&mut self) -> Result<()> {
        self.live_transport("interrupt")?.interrupt()?;
        if self.config.debug_transcript {
            self.store.add_breadcrumb("interrupt", None);
        }
        Ok(())
    }

    // ── User input ───────────────────────────────────────────

    /// Send typed user text and ask for a response.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotConnected`] without a live transport, or the
    /// transport's own error.
    pub fn send_user_text(&mut self, text: &str) -> Result<()> {
        self.live_transport("send_user_text")?;
        self.router.reconciler_mut().log_outgoing_user_text(text);
        self.send_user_message(None, text)
    }

    /// Send a message on the user's behalf, kept hidden in the transcript.
    ///
    /// Returns the id of the hidden message.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotConnected`] without a live transport, or the
    /// transport's own error.
    pub fn send_simulated_user_message(&mut self, text: &str) -> Result<ItemId> {
        self.live_transport("send_simulated_user_message")?;
        let item_id = ItemId::new(uuid::Uuid::new_v4().simple().to_string());
        self.router
            .reconciler_mut()
            .add_hidden_user_message(&mut self.store, item_id.clone(), text);
        self.send_user_message(Some(item_id.to_string()), text)?;
        Ok(item_id)
    }

    fn send_user_message(&mut self, item_id: Option<String>, text: &str) -> Result<()> {
        let transport = self.live_transport("send_user_message")?;
        transport.send(&OutboundCommand::UserMessage {
            item_id,
            text: text.to_owned(),
        })?;
        transport.send(&OutboundCommand::CreateResponse)
    }

    // ── Events ───────────────────────────────────────────────

    /// Route one inbound event and act on the outcome.
    ///
    /// Events arriving while not connected are dropped. Failed outbound
    /// sends are logged and dropped.
    pub fn handle_event(&mut self, event: &InboundEvent) {
        if self.status != SessionStatus::Connected {
            tracing::debug!(tag = %event.tag(), "dropping event while not connected");
            return;
        }
        let RouteOutcome { commands, notices } = self.router.route(&mut self.store, event);
        for command in commands {
            self.send_best_effort(&command);
        }
        for notice in notices {
            self.notify(notice);
        }
    }

    /// Consume events one at a time until the channel closes or `cancel`
    /// fires.
    pub async fn run(
        &mut self,
        mut rx: mpsc::UnboundedReceiver<InboundEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("event pump cancelled");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        tracing::debug!("event channel closed");
                        break;
                    }
                },
            }
        }
    }

    fn send_best_effort(&mut self, command: &OutboundCommand) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.send(command) {
            tracing::warn!(command = command.tag(), error = %e, "outbound send failed; dropping");
        }
    }

    fn live_transport(&mut self, operation: &str) -> Result<&mut T> {
        match (self.status, self.transport.as_mut()) {
            (SessionStatus::Connected, Some(transport)) => Ok(transport),
            _ => Err(RelayError::NotConnected(format!(
                "{operation} requires a connected session"
            ))),
        }
    }

    fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.notify(SessionNotice::StatusChanged(status));
    }

    fn notify(&self, notice: SessionNotice) {
        if let Some(tx) = &self.notices
            && tx.send(notice).is_err()
        {
            tracing::debug!("notice receiver dropped");
        }
    }
}
