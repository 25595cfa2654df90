//! Outbound side of a live realtime session.
//!
//! Connection setup, audio, and authentication live behind this seam. The
//! engine only needs to hand commands over; it never awaits an
//! acknowledgement.

use tokio::sync::mpsc;

use crate::commands::OutboundCommand;
use crate::error::{RelayError, Result};

/// A live transport the engine can push commands into.
pub trait Transport {
    /// Send a protocol command.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the transport rejected the send.
    fn send(&mut self, command: &OutboundCommand) -> Result<()>;

    /// Mute or unmute outbound audio.
    fn mute(&mut self, muted: bool) -> Result<()>;

    /// Interrupt the current assistant turn.
    fn interrupt(&mut self) -> Result<()>;

    /// Close the connection. Must be safe to call more than once.
    fn close(&mut self);
}

/// Everything a [`ChannelTransport`] forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Send(OutboundCommand),
    Mute(bool),
    Interrupt,
    Close,
}

/// [`Transport`] that forwards commands into an unbounded tokio channel.
///
/// The receiving half is typically drained by a task that owns the real
/// socket, or by tests and the replay tool.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Option<mpsc::UnboundedSender<TransportCommand>>,
}

impl ChannelTransport {
    /// Create a transport and the receiver its commands arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Whether [`close`](Transport::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(mpsc::UnboundedSender::is_closed)
    }

    fn forward(&self, command: TransportCommand) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RelayError::Transport("transport closed".to_owned()))?;
        tx.send(command)
            .map_err(|e| RelayError::Transport(format!("receiver dropped: {e}")))
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, command: &OutboundCommand) -> Result<()> {
        self.forward(TransportCommand::Send(command.clone()))
    }

    fn mute(&mut self, muted: bool) -> Result<()> {
        self.forward(TransportCommand::Mute(muted))
    }

    fn interrupt(&mut self) -> Result<()> {
        self.forward(TransportCommand::Interrupt)
    }

    fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TransportCommand::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn forwards_commands_in_order() {
        let (mut transport, mut rx) = ChannelTransport::new();
        transport.send(&OutboundCommand::CreateResponse).unwrap();
        transport.mute(true).unwrap();
        transport.interrupt().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportCommand::Send(OutboundCommand::CreateResponse)
        );
        assert_eq!(rx.try_recv().unwrap(), TransportCommand::Mute(true));
        assert_eq!(rx.try_recv().unwrap(), TransportCommand::Interrupt);
    }

    #[test]
    fn close_is_idempotent_and_rejects_later_sends() {
        let (mut transport, mut rx) = ChannelTransport::new();
        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert_eq!(rx.try_recv().unwrap(), TransportCommand::Close);
        assert!(rx.try_recv().is_err());
        let err = transport.send(&OutboundCommand::CreateResponse).unwrap_err();
        assert_eq!(err.code(), "TRANSPORT_FAILED");
    }

    #[test]
    fn dropped_receiver_is_a_transport_error() {
        let (mut transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(transport.is_closed());
        assert!(transport.interrupt().is_err());
    }
}
