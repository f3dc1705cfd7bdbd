//! Transport halves consumed by the connection pumps
//!
//! A connection is split into a [`FrameSource`] read only by the inbound
//! pump and a [`FrameSink`] written only by the outbound pump.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};

/// Read side of a connection
pub trait FrameSource: Send + 'static {
    /// Next frame payload; `None` once the peer closed cleanly
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;
}

/// Write side of a connection
pub trait FrameSink: Send + 'static {
    /// Write one payload as one frame
    fn send_frame(&mut self, payload: Arc<str>) -> impl Future<Output = Result<()>> + Send;

    /// Signal end of stream to the peer
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Length-prefixed read half
pub struct FramedSource<R> {
    reader: R,
    max_frame_size: u32,
}

/// Length-prefixed write half
pub struct FramedSink<W> {
    writer: W,
}

/// Split a byte stream into length-prefixed halves
pub fn framed<S>(stream: S, max_frame_size: u32) -> (FramedSource<ReadHalf<S>>, FramedSink<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (
        FramedSource {
            reader,
            max_frame_size,
        },
        FramedSink { writer },
    )
}

impl<R> FramedSource<R> {
    /// Give back the reader, e.g. after a failed handshake
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> FrameSource for FramedSource<R> {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match read_frame(&mut self.reader, self.max_frame_size).await {
            Ok(payload) => Ok(Some(payload)),
            Err(Error::ConnectionClosed) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> FrameSink for FramedSink<W> {
    async fn send_frame(&mut self, payload: Arc<str>) -> Result<()> {
        write_frame(&mut self.writer, payload.as_bytes()).await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// WebSocket read half
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// WebSocket write half
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

/// Split an upgraded WebSocket into halves
pub fn websocket<S>(ws: WebSocketStream<S>) -> (WsSource<S>, WsSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (WsSource { stream }, WsSink { sink })
}

impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text.into_bytes())),
                Ok(Message::Binary(data)) => return Ok(Some(data)),
                Ok(Message::Close(_)) => return Ok(None),
                // Ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_frame(&mut self, payload: Arc<str>) -> Result<()> {
        self.sink.send(Message::Text(payload.to_string())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
