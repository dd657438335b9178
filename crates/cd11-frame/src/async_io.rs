//! Tokio frame reader and writer built on [`Cd11Codec`].

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::{Cd11Codec, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};
use crate::frame::Cd11Frame;

/// Reads delimited frames from an async byte stream.
pub struct AsyncFrameReader<R> {
    inner: FramedRead<R, Cd11Codec>,
}

impl<R: AsyncRead + Unpin> AsyncFrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    pub fn with_config(inner: R, config: &FrameConfig) -> Self {
        Self {
            inner: FramedRead::new(inner, Cd11Codec::new(config.max_frame_size)),
        }
    }

    /// Read the next frame, or fail with [`FrameError::Timeout`] once `cancel` fires.
    ///
    /// Cancellation keeps any partially buffered frame for the next call.
    pub async fn read_frame(&mut self, cancel: &CancellationToken) -> Result<RawFrame> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FrameError::Timeout),
            next = self.inner.next() => match next {
                Some(frame) => frame,
                None => Err(FrameError::ConnectionClosed),
            },
        }
    }

    /// Read the next frame, failing with [`FrameError::Timeout`] after `limit`.
    pub async fn read_frame_timeout(&mut self, limit: Duration) -> Result<RawFrame> {
        match tokio::time::timeout(limit, self.inner.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => Err(FrameError::ConnectionClosed),
            Err(_) => Err(FrameError::Timeout),
        }
    }

    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

/// Writes frames to an async byte stream, flushing after each one.
pub struct AsyncFrameWriter<W> {
    inner: FramedWrite<W, Cd11Codec>,
}

impl<W: AsyncWrite + Unpin> AsyncFrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: FramedWrite::new(inner, Cd11Codec::default()),
        }
    }

    pub async fn write_frame(&mut self, frame: Cd11Frame) -> Result<()> {
        self.inner.send(frame).await
    }

    pub async fn write_raw(&mut self, frame: RawFrame) -> Result<()> {
        self.inner.send(frame).await
    }

    /// Flush and shut down the write half.
    pub async fn close(&mut self) -> Result<()> {
        SinkExt::<Cd11Frame>::close(&mut self.inner).await
    }

    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}
