pub mod bytes;
pub mod queue;
pub mod url;

pub use self::bytes::BytesPipelineData;
pub use self::queue::QueuePipelineData;
pub use self::url::UrlPipelineData;

use std::io::SeekFrom;
use std::time::Duration;

use ::bytes::Bytes;
use futures::Stream;
use reqwest::Client;

use api::file::FileMetadata;
use common::error::PipelineError;

// one logical file in flight between steps
//
// a unit is created by a source (ranged url or in-memory bytes) or by a
// transforming step (bridge queue), is consumed at most once, and owns its
// underlying stream.  rewinding or re-iterating a consumed unit is a
// defect, not a supported operation.
pub enum PipelineData {
    Url(UrlPipelineData),
    Bytes(BytesPipelineData),
    Queue(QueuePipelineData),
}

impl std::fmt::Debug for PipelineData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineData::Url(_) => f.write_str("PipelineData::Url(..)"),
            PipelineData::Bytes(_) => f.write_str("PipelineData::Bytes(..)"),
            PipelineData::Queue(_) => f.write_str("PipelineData::Queue(..)"),
        }
    }
}

impl PipelineData {
    pub fn from_url(client: Client, url: &str, timeout: Duration) -> Self {
        PipelineData::Url(UrlPipelineData::new(client, url, timeout))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>, metadata: FileMetadata) -> Self {
        PipelineData::Bytes(BytesPipelineData::new(bytes.into(), metadata))
    }

    pub fn metadata(&self) -> &FileMetadata {
        match self {
            PipelineData::Url(data) => data.metadata(),
            PipelineData::Bytes(data) => data.metadata(),
            PipelineData::Queue(data) => data.metadata(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut FileMetadata {
        match self {
            PipelineData::Url(data) => data.metadata_mut(),
            PipelineData::Bytes(data) => data.metadata_mut(),
            PipelineData::Queue(data) => data.metadata_mut(),
        }
    }

    // up to n bytes; empty only at end of stream
    pub async fn read(&mut self, n: usize) -> Result<Bytes, PipelineError> {
        match self {
            PipelineData::Url(data) => data.read(n).await,
            PipelineData::Bytes(data) => Ok(data.read(n)),
            PipelineData::Queue(data) => data.read(n).await,
        }
    }

    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, PipelineError> {
        let mut out = Vec::new();

        loop {
            let chunk = self.read(api::CHUNK_SIZE).await?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    pub async fn seek(&mut self, target: SeekFrom) -> Result<u64, PipelineError> {
        match self {
            PipelineData::Url(data) => data.seek(target).await,
            PipelineData::Bytes(data) => data.seek(target),
            PipelineData::Queue(_) => Err(PipelineError::Internal(
                "seek on a queue-backed stream".into(),
            )),
        }
    }

    pub fn tell(&self) -> u64 {
        match self {
            PipelineData::Url(data) => data.tell(),
            PipelineData::Bytes(data) => data.tell(),
            PipelineData::Queue(data) => data.tell(),
        }
    }

    pub fn seekable(&self) -> bool {
        !matches!(self, PipelineData::Queue(_))
    }

    // chunked iteration for the http response body; yields until drained
    // and never restarts
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, PipelineError>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut data = state?;

            match data.read(api::CHUNK_SIZE).await {
                Ok(chunk) if chunk.is_empty() => None,
                Ok(chunk) => Some((Ok(chunk), Some(data))),
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}
