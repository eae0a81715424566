pub mod executor;

pub use executor::PipelineExecutor;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::bridge::{BridgeHandle, Frame, SharedBridge};
use crate::data::{PipelineData, QueuePipelineData};
use common::error::PipelineError;

// how many files a step promised to produce
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileCount {
    Known(u64),

    // the worker could not know without doing the work, e.g. directory
    // extraction counts entries as it streams them
    Unknown,
}

// the ordered sequence of files a step produced
//
// ready outputs sit in memory; bridge outputs are pulled lazily from the
// worker's queue, one file at a time, so nothing is materialised beyond
// what the consumer actually reads.
pub struct StepOutput {
    count: FileCount,
    source: FileSource,
}

impl std::fmt::Debug for StepOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOutput")
            .field("count", &self.count)
            .finish()
    }
}

enum FileSource {
    Ready(VecDeque<PipelineData>),
    Bridge(QueueConsumer),
}

impl StepOutput {
    pub fn empty() -> Self {
        StepOutput {
            count: FileCount::Known(0),
            source: FileSource::Ready(VecDeque::new()),
        }
    }

    pub fn single(data: PipelineData) -> Self {
        StepOutput {
            count: FileCount::Known(1),
            source: FileSource::Ready(VecDeque::from([data])),
        }
    }

    // adopt a freshly started worker; the first frame must announce the
    // file count
    pub async fn from_bridge(mut handle: BridgeHandle) -> Result<Self, PipelineError> {
        let count = match handle.recv().await {
            Some(Frame::FileCount(Some(n))) => FileCount::Known(n),
            Some(Frame::FileCount(None)) => FileCount::Unknown,
            Some(Frame::Error(err)) => return Err(err),
            Some(other) => {
                return Err(PipelineError::BridgeProtocolViolation(format!(
                    "expected file_count, got {}",
                    other.tag()
                )));
            }
            None => {
                return Err(PipelineError::BridgeProtocolViolation(
                    "queue closed before file_count".into(),
                ));
            }
        };

        Ok(StepOutput {
            count,
            source: FileSource::Bridge(QueueConsumer::new(handle)),
        })
    }

    pub fn file_count(&self) -> FileCount {
        self.count
    }

    pub async fn next_file(&mut self) -> Result<Option<PipelineData>, PipelineError> {
        match &mut self.source {
            FileSource::Ready(files) => Ok(files.pop_front()),
            FileSource::Bridge(consumer) => consumer.next_file().await,
        }
    }
}

// pulls (startfile, chunk*, endfile) groups off a shared bridge queue and
// hands each group out as queue-backed pipeline data
pub struct QueueConsumer {
    bridge: SharedBridge,
    open: Arc<AtomicBool>,
    finished: bool,
}

impl QueueConsumer {
    fn new(handle: BridgeHandle) -> Self {
        QueueConsumer {
            bridge: Arc::new(Mutex::new(handle)),
            open: Arc::new(AtomicBool::new(false)),
            finished: false,
        }
    }

    pub async fn next_file(&mut self) -> Result<Option<PipelineData>, PipelineError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            // frames of a partially read previous file are drained here
            let draining = self.open.load(Ordering::SeqCst);

            let (frame, cancelled) = {
                let mut bridge = self.bridge.lock().await;
                let frame = bridge.recv().await;
                let cancelled = bridge.is_cancelled();
                (frame, cancelled)
            };

            match frame {
                Some(Frame::StartFile(metadata)) if !draining => {
                    self.open.store(true, Ordering::SeqCst);

                    return Ok(Some(PipelineData::Queue(QueuePipelineData::new(
                        self.bridge.clone(),
                        self.open.clone(),
                        metadata,
                    ))));
                }
                Some(Frame::Chunk(_)) if draining => continue,
                Some(Frame::EndFile) if draining => {
                    self.open.store(false, Ordering::SeqCst);
                }
                Some(Frame::Complete) => {
                    self.finished = true;
                    return Ok(None);
                }
                Some(Frame::Error(err)) => {
                    self.finished = true;
                    return Err(err);
                }
                Some(other) => {
                    return Err(PipelineError::BridgeProtocolViolation(format!(
                        "unexpected {} frame between files",
                        other.tag()
                    )));
                }
                None => {
                    self.finished = true;
                    return Err(if cancelled {
                        PipelineError::Cancelled
                    } else {
                        PipelineError::BridgeProtocolViolation(
                            "queue closed before complete".into(),
                        )
                    });
                }
            }
        }
    }
}
