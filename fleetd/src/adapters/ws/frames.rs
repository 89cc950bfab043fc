// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{CloseReason, DuplexChannel, ExecFrame, FrameSink, FrameSource};

/// Splits a websocket into the exec channel halves.
pub fn duplex<S>(stream: S) -> DuplexChannel
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + 'static,
{
    let (sink, source) = stream.split::<Message>();
    DuplexChannel {
        source: Box::new(WsFrameSource::new(source)),
        sink: Box::new(WsFrameSink::new(sink)),
    }
}

pub struct WsFrameSource<S> {
    inner: S,
}

impl<S> WsFrameSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> FrameSource for WsFrameSource<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin + Send,
{
    async fn next_frame(&mut self) -> Option<AppResult<ExecFrame>> {
        loop {
            let message = match self.inner.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(err) => return Some(Err(map_ws_error(err))),
            };
            if let Some(frame) = from_message(message) {
                return Some(Ok(frame));
            }
        }
    }
}

/// Write half; `abort` drops it so the socket goes away with the read half.
pub struct WsFrameSink<S> {
    inner: Option<S>,
}

impl<S> WsFrameSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner: Some(inner) }
    }
}

#[async_trait]
impl<S> FrameSink for WsFrameSink<S>
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    async fn send(&mut self, frame: ExecFrame) -> AppResult<()> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(AppError::remote("websocket already dropped"));
        };
        let closing = matches!(frame, ExecFrame::Close(_));
        inner.send(to_message(frame)).await.map_err(map_ws_error)?;
        if closing {
            match inner.close().await {
                Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
                Err(err) => return Err(map_ws_error(err)),
            }
        }
        Ok(())
    }

    async fn abort(&mut self) {
        self.inner.take();
    }
}

fn from_message(message: Message) -> Option<ExecFrame> {
    match message {
        Message::Text(text) => Some(ExecFrame::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(ExecFrame::Binary(data.to_vec())),
        Message::Close(frame) => Some(ExecFrame::Close(frame.map(|frame| {
            CloseReason::new(u16::from(frame.code), frame.reason.as_str())
        }))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

fn to_message(frame: ExecFrame) -> Message {
    match frame {
        ExecFrame::Text(text) => Message::Text(text.into()),
        ExecFrame::Binary(data) => Message::Binary(data.into()),
        ExecFrame::Close(reason) => Message::Close(reason.map(|reason| CloseFrame {
            code: CloseCode::from(reason.code),
            reason: reason.reason.into(),
        })),
    }
}

fn map_ws_error(err: WsError) -> AppError {
    AppError::remote(format!("websocket: {err}"))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn close_frames_keep_code_and_reason() {
        let message = to_message(ExecFrame::Close(Some(CloseReason::new(
            1011,
            "Kubernetes error",
        ))));
        assert_eq!(
            from_message(message),
            Some(ExecFrame::Close(Some(CloseReason::new(1011, "Kubernetes error"))))
        );
        assert_eq!(
            from_message(Message::Close(None)),
            Some(ExecFrame::Close(None))
        );
    }

    #[test]
    fn control_frames_are_skipped() {
        assert_eq!(from_message(Message::Ping(Bytes::from_static(&[1]))), None);
        assert_eq!(
            from_message(Message::Binary(vec![1, b'l', b's'].into())),
            Some(ExecFrame::Binary(vec![1, b'l', b's']))
        );
    }

    #[tokio::test]
    async fn source_skips_pings_and_ends_on_closed_connection() {
        let messages = futures_util::stream::iter(vec![
            Ok(Message::Ping(Bytes::new())),
            Ok(Message::Text("ls\n".into())),
            Err(WsError::ConnectionClosed),
        ]);
        let mut source = WsFrameSource::new(messages);
        assert_eq!(
            source.next_frame().await.unwrap().unwrap(),
            ExecFrame::Text("ls\n".into())
        );
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn aborted_sink_refuses_frames() {
        let (tx, _rx) = futures_channel::mpsc::unbounded::<Message>();
        let mut sink = WsFrameSink::new(tx.sink_map_err(|_| WsError::ConnectionClosed));
        sink.send(ExecFrame::Text("hi".into())).await.unwrap();
        sink.abort().await;
        assert!(sink.send(ExecFrame::Text("again".into())).await.is_err());
    }
}
