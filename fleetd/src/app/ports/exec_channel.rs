// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;

/// Websocket close code for an internal server error.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecFrame {
    Binary(Vec<u8>),
    Text(String),
    Close(Option<CloseReason>),
}

/// Read half of a message-oriented duplex stream.
#[async_trait]
pub trait FrameSource: Send {
    /// `None` once the peer is gone.
    async fn next_frame(&mut self) -> Option<AppResult<ExecFrame>>;
}

/// Write half of a message-oriented duplex stream.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: ExecFrame) -> AppResult<()>;

    /// Drops the connection without a close handshake.
    async fn abort(&mut self);
}

pub struct DuplexChannel {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
}
