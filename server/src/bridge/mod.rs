pub mod msg;

pub use msg::Frame;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use api::file::FileMetadata;
use common::error::PipelineError;

// a queue of one means a slow consumer pauses the worker after each chunk,
// bounding in-flight memory to a single chunk plus a frame header
pub const DEFAULT_QUEUE_SIZE: usize = 1;

// one bridge queue is shared between the file iterator and the per-file
// readers it hands out, hence the lock
pub type SharedBridge = Arc<Mutex<BridgeHandle>>;

// the worker's only output channel
//
// every method blocks while the bounded queue is full and fails once the
// consumer has gone away, which is how workers observe cancellation
// between chunk emissions.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

impl Emitter {
    fn send(&self, frame: Frame) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.tx
            .blocking_send(frame)
            .map_err(|_| PipelineError::Cancelled)
    }

    pub fn file_count(&self, count: Option<u64>) -> Result<(), PipelineError> {
        self.send(Frame::FileCount(count))
    }

    pub fn start_file(&self, metadata: FileMetadata) -> Result<(), PipelineError> {
        self.send(Frame::StartFile(metadata))
    }

    pub fn chunk(&self, bytes: Bytes) -> Result<(), PipelineError> {
        self.send(Frame::Chunk(bytes))
    }

    pub fn end_file(&self) -> Result<(), PipelineError> {
        self.send(Frame::EndFile)
    }
}

// consumer side of a running worker
pub struct BridgeHandle {
    rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
}

impl BridgeHandle {
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // shut the queue and interrupt the worker; after this the worker's
    // next emit fails and its thread unwinds
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// start a blocking worker with a bounded frame queue back to the caller
//
// the worker runs on its own blocking thread.  a clean return becomes a
// Complete frame, an error becomes an Error frame; a worker that failed
// because the consumer cancelled just exits.
pub fn run<F>(queue_size: usize, worker: F) -> BridgeHandle
where
    F: FnOnce(&Emitter) -> Result<(), PipelineError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue_size.max(1));
    let cancel = CancellationToken::new();

    let emitter = Emitter {
        tx,
        cancel: cancel.clone(),
    };

    tokio::task::spawn_blocking(move || {
        let closing = match worker(&emitter) {
            Ok(()) => Frame::Complete,
            Err(PipelineError::Cancelled) => {
                debug!("worker observed cancellation");
                return;
            }
            Err(err) => Frame::Error(err),
        };

        // the consumer may already be gone; nothing to do then
        let _ = emitter.send(closing);
    });

    BridgeHandle { rx, cancel }
}
