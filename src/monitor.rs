use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::motion::MotionGate;
use crate::pipeline::{Frame, FrameDecision, FramePipeline};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Frame acquisition. Opening, reconnect policy and decoding belong to the
/// implementation; the monitor only pulls frames one at a time.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<()>;
    /// `None` once the stream has ended for good.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
    fn release(&mut self);
}

/// Why one pass over the stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    GateClosed { reason: Option<String> },
    SourceExhausted,
    SourceFailed,
    Cancelled,
}

/// Drives a frame source through the pipeline. With a motion gate, each
/// pass starts on activation and ends when the gate closes; the monitor
/// then waits for the next activation.
pub struct Monitor<S: FrameSource> {
    source: S,
    pipeline: FramePipeline,
    gate: Option<Arc<MotionGate>>,
    cancel_token: CancellationToken,
    reconnect_delay: Duration,
    frames_seen: u64,
}

impl<S: FrameSource> Monitor<S> {
    pub fn new(source: S, pipeline: FramePipeline, cancel_token: CancellationToken) -> Self {
        let gate = pipeline.motion_gate().cloned();
        Self {
            source,
            pipeline,
            gate,
            cancel_token,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            frames_seen: 0,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub async fn run(mut self) -> Result<u64> {
        loop {
            if let Some(gate) = self.gate.clone() {
                info!("Waiting for motion");
                tokio::select! {
                    _ = gate.wait_for_activation() => {}
                    _ = self.cancel_token.cancelled() => break,
                }
            }

            let end = self.run_stream().await;
            if self.gate.is_none() {
                break;
            }

            match end {
                StreamEnd::GateClosed { reason } => {
                    info!(
                        "Stream paused ({})",
                        reason.as_deref().unwrap_or("gate inactive")
                    );
                }
                StreamEnd::SourceFailed => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = self.cancel_token.cancelled() => break,
                    }
                }
                StreamEnd::SourceExhausted | StreamEnd::Cancelled => break,
            }
        }

        info!("Monitor stopped after {} frames", self.frames_seen);
        Ok(self.frames_seen)
    }

    /// One open/iterate/release cycle.
    pub async fn run_stream(&mut self) -> StreamEnd {
        if let Err(err) = self.source.open() {
            error!("Unable to open frame source: {err:#}");
            return StreamEnd::SourceFailed;
        }

        let end = loop {
            if self.cancel_token.is_cancelled() {
                break StreamEnd::Cancelled;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StreamEnd::SourceExhausted,
                Err(err) => {
                    warn!("Failed to read frame: {err:#}");
                    break StreamEnd::SourceFailed;
                }
            };
            self.frames_seen += 1;

            if let FrameDecision::Stop { reason } = self.pipeline.process_frame(&frame).await {
                break StreamEnd::GateClosed { reason };
            }

            tokio::task::yield_now().await;
        };

        self.source.release();
        end
    }
}
