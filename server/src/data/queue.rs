use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use crate::bridge::{Frame, SharedBridge};
use api::file::FileMetadata;
use common::error::PipelineError;

// pipeline data fed by a worker through the bridge queue
//
// several output files of one step share a single queue; this reader owns
// the frames between its startfile and the matching endfile.  the open
// flag is shared with the step-output iterator so it can tell whether a
// previously yielded file still has frames in flight.
pub struct QueuePipelineData {
    bridge: SharedBridge,
    open: Arc<AtomicBool>,
    metadata: FileMetadata,
    buffer: Bytes,
    consumed: u64,
    done: bool,
}

impl QueuePipelineData {
    pub(crate) fn new(bridge: SharedBridge, open: Arc<AtomicBool>, metadata: FileMetadata) -> Self {
        QueuePipelineData {
            bridge,
            open,
            metadata,
            buffer: Bytes::new(),
            consumed: 0,
            done: false,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut FileMetadata {
        &mut self.metadata
    }

    pub async fn read(&mut self, n: usize) -> Result<Bytes, PipelineError> {
        if n == 0 {
            return Ok(Bytes::new());
        }

        loop {
            if !self.buffer.is_empty() {
                let take = n.min(self.buffer.len());
                let chunk = self.buffer.split_to(take);
                self.consumed += chunk.len() as u64;
                return Ok(chunk);
            }

            if self.done {
                return Ok(Bytes::new());
            }

            let (frame, cancelled) = {
                let mut bridge = self.bridge.lock().await;
                let frame = bridge.recv().await;
                let cancelled = bridge.is_cancelled();
                (frame, cancelled)
            };

            match frame {
                Some(Frame::Chunk(bytes)) => self.buffer = bytes,
                Some(Frame::EndFile) => {
                    self.done = true;
                    self.open.store(false, Ordering::SeqCst);
                }
                Some(Frame::Error(err)) => {
                    self.done = true;
                    self.open.store(false, Ordering::SeqCst);
                    return Err(err);
                }
                Some(other) => {
                    return Err(PipelineError::BridgeProtocolViolation(format!(
                        "unexpected {} frame inside a file",
                        other.tag()
                    )));
                }
                None => {
                    self.done = true;
                    return Err(if cancelled {
                        PipelineError::Cancelled
                    } else {
                        PipelineError::BridgeProtocolViolation(
                            "queue closed before endfile".into(),
                        )
                    });
                }
            }
        }
    }

    pub fn tell(&self) -> u64 {
        self.consumed
    }
}
