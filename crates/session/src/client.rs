use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::channel::{
    ChannelConnector, ChannelEvent, ChannelEventMapped, ChannelHandle, ConnectRequest, ReadyState,
};
use super::endpoint::Endpoints;
use super::ids::{ConnectionId, SessionId};
use super::message::{Message, MessageLog};
use super::sanitize::{InboundText, classify_inbound};
use super::settings::NoticePolicy;
use super::upload::{
    AcceptedUpload, BoxFuture, PdfFile, RejectedFile, UploadResponse, UploadResult, Uploader,
};

pub const READY_NOTICE: &str = "PDFs loaded successfully! You can now ask questions.";
pub const CHANNEL_ERROR_NOTICE: &str = "Error connecting to chat server";
pub const DISCONNECTED_NOTICE: &str = "Disconnected from chat server";

/// In-flight upload request, detached from the session so channel events keep flowing
/// while it runs.
pub type UploadTask = BoxFuture<'static, UploadResult<UploadResponse>>;

/// Client state for one chat window.
///
/// Owns the message log, the input buffer, the current session and its connection.
/// Every state change goes through a method here; channel workers only reach it through
/// the event queue returned by [`ChatSession::new`].
pub struct ChatSession {
    endpoints: Endpoints,
    notices: NoticePolicy,
    uploader: Arc<dyn Uploader>,
    connector: Arc<dyn ChannelConnector>,
    events_tx: mpsc::UnboundedSender<ChannelEventMapped>,
    messages: MessageLog,
    input: String,
    session_id: Option<SessionId>,
    connection: Option<ChannelHandle>,
    close_seen: bool,
    is_loading: bool,
    is_ai_responding: bool,
}

impl ChatSession {
    pub fn new(
        endpoints: Endpoints,
        notices: NoticePolicy,
        uploader: Arc<dyn Uploader>,
        connector: Arc<dyn ChannelConnector>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEventMapped>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            endpoints,
            notices,
            uploader,
            connector,
            events_tx,
            messages: MessageLog::new(),
            input: String::new(),
            session_id: None,
            connection: None,
            close_seen: false,
            is_loading: false,
            is_ai_responding: false,
        };
        (session, events_rx)
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn connection_state(&self) -> Option<ReadyState> {
        self.connection.as_ref().map(ChannelHandle::ready_state)
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_ai_responding(&self) -> bool {
        self.is_ai_responding
    }

    /// Appends a locally generated status line.
    pub fn notify(&mut self, text: impl Into<String>) {
        self.messages.push(Message::system(text));
    }

    /// Starts an upload. An empty selection does nothing and returns `None`.
    ///
    /// The returned task must be awaited (or spawned) and its output passed to
    /// [`ChatSession::finish_upload`].
    pub fn begin_upload(&mut self, files: Vec<PdfFile>) -> Option<UploadTask> {
        if files.is_empty() {
            tracing::debug!("upload requested with an empty selection");
            return None;
        }

        self.is_loading = true;
        tracing::info!(file_count = files.len(), "uploading files");

        let uploader = Arc::clone(&self.uploader);
        Some(Box::pin(async move { uploader.upload(files).await }))
    }

    pub fn finish_upload(&mut self, result: UploadResult<UploadResponse>) {
        self.is_loading = false;

        match result.and_then(UploadResponse::into_accepted) {
            Ok(accepted) => self.accept_upload(accepted),
            Err(error) => {
                tracing::warn!(error = %error, "upload failed");
                if self.notices.surface_errors {
                    self.notify(format!("Error: {error}"));
                }
            }
        }
    }

    /// Runs a whole upload inline. Channel events queue up until it returns.
    pub async fn upload(&mut self, files: Vec<PdfFile>) {
        if let Some(task) = self.begin_upload(files) {
            let result = task.await;
            self.finish_upload(result);
        }
    }

    fn accept_upload(&mut self, accepted: AcceptedUpload) {
        tracing::info!(
            session_id = %accepted.session_id,
            saved_count = accepted.saved.len(),
            rejected_count = accepted.rejected.len(),
            "upload accepted"
        );
        if !accepted.rejected.is_empty() {
            self.notify(rejected_summary(&accepted.rejected));
        }
        self.connect(accepted.session_id);
    }

    /// Opens the realtime channel for `session_id`, closing any previous connection first.
    pub fn connect(&mut self, session_id: SessionId) {
        let address = match self.endpoints.channel_address(&session_id) {
            Ok(address) => address,
            Err(error) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %error,
                    "cannot derive channel address"
                );
                if self.notices.surface_errors {
                    self.notify(format!("Error: {error}"));
                }
                return;
            }
        };

        if let Some(mut previous) = self.connection.take() {
            tracing::info!(
                connection_id = %previous.connection_id(),
                "closing previous channel before reconnecting"
            );
            previous.close();
        }

        let connection_id = ConnectionId::next();
        tracing::info!(
            session_id = %session_id,
            connection_id = %connection_id,
            address = %address,
            "connecting channel"
        );
        let handle = self.connector.connect(ConnectRequest {
            connection_id,
            address,
            events_tx: self.events_tx.clone(),
        });

        self.session_id = Some(session_id);
        self.connection = Some(handle);
        self.close_seen = false;
    }

    /// Applies one channel event. Events from a replaced connection are dropped.
    pub fn handle_channel_event(&mut self, mapped: ChannelEventMapped) {
        let current = self.connection.as_ref().map(ChannelHandle::connection_id);
        if current != Some(mapped.connection_id) {
            tracing::debug!(
                connection_id = %mapped.connection_id,
                event = ?mapped.event,
                "dropping event from stale connection"
            );
            return;
        }

        match mapped.event {
            ChannelEvent::Opened => {
                tracing::info!(connection_id = %mapped.connection_id, "channel open");
                if self.notices.announce_ready {
                    self.notify(READY_NOTICE);
                }
            }
            ChannelEvent::Text(raw) => match classify_inbound(&raw) {
                InboundText::Greeting => {
                    tracing::debug!("suppressing server greeting");
                }
                InboundText::Display(text) => {
                    self.messages.push(Message::ai(text));
                    self.is_ai_responding = false;
                }
            },
            ChannelEvent::Error(detail) => {
                tracing::warn!(
                    connection_id = %mapped.connection_id,
                    error = %detail,
                    "channel error"
                );
                if self.notices.surface_errors {
                    self.notify(CHANNEL_ERROR_NOTICE);
                }
            }
            ChannelEvent::Closed => {
                if self.close_seen {
                    return;
                }
                self.close_seen = true;
                self.is_ai_responding = false;
                tracing::info!(connection_id = %mapped.connection_id, "channel disconnected");
                if self.notices.announce_disconnect {
                    self.notify(DISCONNECTED_NOTICE);
                }
            }
        }
    }

    /// Sends the input buffer over the open channel.
    ///
    /// Does nothing (and keeps the input) when the input is blank or no open connection
    /// exists. Returns whether a message was sent.
    pub fn send_message(&mut self) -> bool {
        if self.input.trim().is_empty() {
            return false;
        }
        let Some(connection) = self.connection.as_ref().filter(|handle| handle.is_open()) else {
            return false;
        };

        let text = std::mem::take(&mut self.input);
        self.messages.push(Message::user(text.clone()));
        self.is_ai_responding = true;
        if !connection.send(text) {
            tracing::warn!(connection_id = %connection.connection_id(), "channel worker is gone");
        }
        true
    }

    /// Puts `text` in the input buffer and sends it.
    pub fn send_text(&mut self, text: impl Into<String>) -> bool {
        self.set_input(text);
        self.send_message()
    }

    /// Closes the connection if one is held. Appends nothing to the log.
    ///
    /// Only requests the close; the worker finishes the handshake on its own task.
    pub fn teardown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            tracing::info!(connection_id = %connection.connection_id(), "tearing down channel");
            connection.close();
        }
    }

    /// Like [`ChatSession::teardown`], but waits up to `grace` for the close handshake.
    ///
    /// Call this before the runtime shuts down, otherwise the peer may only see the
    /// socket drop.
    pub async fn shutdown(&mut self, grace: Duration) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let connection_id = connection.connection_id();
        tracing::info!(connection_id = %connection_id, "shutting down channel");
        connection.close();

        if tokio::time::timeout(grace, connection.closed()).await.is_err() {
            tracing::warn!(
                connection_id = %connection_id,
                grace_ms = grace.as_millis() as u64,
                "channel did not finish closing in time"
            );
        }
    }
}

fn rejected_summary(rejected: &[RejectedFile]) -> String {
    let entries = rejected
        .iter()
        .map(|file| match &file.filename {
            Some(name) => format!("{name} ({})", file.error),
            None => file.error.clone(),
        })
        .collect::<Vec<_>>();
    format!("Some files were rejected: {}", entries.join("; "))
}
