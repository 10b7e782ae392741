#![deny(unsafe_code)]

//! Session client for a PDF question-answering backend.
//!
//! Uploads PDFs over HTTP, receives a session id, opens a WebSocket channel scoped to that
//! session and keeps an append-only log of what was said.

pub mod channel;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod ids;
pub mod message;
pub mod sanitize;
pub mod settings;
pub mod upload;

pub use channel::{
    ChannelConnector, ChannelEndpoint, ChannelError, ChannelEvent, ChannelEventMapped,
    ChannelHandle, ChannelResult, ConnectRequest, ReadyState, WebSocketConnector, make_channel,
};
pub use client::{
    CHANNEL_ERROR_NOTICE, ChatSession, DISCONNECTED_NOTICE, READY_NOTICE, UploadTask,
};
pub use endpoint::Endpoints;
pub use error::{SessionError, SessionResult};
pub use ids::{ConnectionId, SessionId};
pub use message::{Message, MessageLog, Sender};
pub use sanitize::{READY_SENTINEL, strip_tags};
pub use settings::{ClientSettings, NoticePolicy};
pub use upload::{
    HttpUploader, PdfFile, Selection, UploadError, UploadResponse, UploadResult, Uploader,
    read_selection,
};
