use std::io::SeekFrom;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, StatusCode};
use tracing::{Level, debug, instrument};

use common::error::PipelineError;

// how far ahead a seek may land before we abandon the open response and
// issue a fresh ranged request instead of reading past the gap
const DRAIN_FORWARD_LIMIT: u64 = 1000;

// seekable byte source over a remote http object
//
// zip central directories live at end-of-file while decryption wants the
// linear stream, so access degenerates to read-with-occasional-seek.  short
// forward seeks become reads on the open response; anything else opens a
// new GET with a Range header.  transport compression would break offset
// arithmetic, hence Accept-Encoding: identity on every request.
pub struct RangeStream {
    client: Client,
    url: String,
    reader: Option<BoxStream<'static, reqwest::Result<Bytes>>>,

    // unconsumed tail of the last network chunk
    leftover: Bytes,

    pos: u64,
    size: Option<u64>,
    media_type: Option<String>,
    timeout: Duration,
}

impl RangeStream {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        RangeStream {
            client,
            url: url.into(),
            reader: None,
            leftover: Bytes::new(),
            pos: 0,
            size: None,
            media_type: None,
            timeout,
        }
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    // content type reported by the object store, known after the first request
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn close(&mut self) {
        self.reader = None;
        self.leftover = Bytes::new();
    }

    // issue a ranged GET starting at offset and make it the current reader
    #[instrument(level = Level::DEBUG, skip(self))]
    async fn open_at(&mut self, offset: u64) -> Result<(), PipelineError> {
        self.close();

        let request = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={offset}-"))
            .header(ACCEPT_ENCODING, "identity");

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| PipelineError::ObjectStoreUnavailable("request timed out".into()))?
            .map_err(|err| PipelineError::ObjectStoreUnavailable(err.to_string()))?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            debug!({status = %response.status()}, "expected 206 partial content");
            return Err(PipelineError::RangeUnsupported);
        }

        if self.media_type.is_none() {
            self.media_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(String::from);
        }

        self.reader = Some(response.bytes_stream().boxed());
        self.pos = offset;
        Ok(())
    }

    // total object size via a one-byte probe, cached after the first call
    pub async fn size(&mut self) -> Result<u64, PipelineError> {
        if let Some(size) = self.size {
            return Ok(size);
        }

        let request = self
            .client
            .get(&self.url)
            .header(RANGE, "bytes=0-0")
            .header(ACCEPT_ENCODING, "identity");

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| PipelineError::ObjectStoreUnavailable("size probe timed out".into()))?
            .map_err(|err| PipelineError::ObjectStoreUnavailable(err.to_string()))?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(PipelineError::SizeUnavailable);
        }

        // Content-Range: bytes 0-0/<total>
        let size = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.rsplit('/').next())
            .and_then(|total| total.parse::<u64>().ok())
            .ok_or(PipelineError::SizeUnavailable)?;

        self.size = Some(size);
        Ok(size)
    }

    // read up to n bytes, accumulating network chunks; shorter results only
    // happen at end of stream
    pub async fn read(&mut self, n: usize) -> Result<Bytes, PipelineError> {
        if n == 0 {
            return Ok(Bytes::new());
        }

        if self.reader.is_none() {
            self.open_at(self.pos).await?;
        }

        let mut out = BytesMut::with_capacity(n.min(api::CHUNK_SIZE));

        while out.len() < n {
            if !self.leftover.is_empty() {
                let take = (n - out.len()).min(self.leftover.len());
                out.extend_from_slice(&self.leftover.split_to(take));
                continue;
            }

            let reader = self.reader.as_mut().expect("reader opened above");

            match reader.next().await {
                None => break,
                Some(Ok(chunk)) => self.leftover = chunk,
                Some(Err(err)) => {
                    return Err(PipelineError::ObjectStoreUnavailable(err.to_string()));
                }
            }
        }

        self.pos += out.len() as u64;
        Ok(out.freeze())
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
        // seek-to-end is a position update, no request needed yet
        if let SeekFrom::End(0) = target {
            self.pos = self.size().await?;
            self.close();
            return Ok(self.pos);
        }

        let absolute = match target {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
            SeekFrom::End(offset) => self.size().await? as i64 + offset,
        };

        if absolute < 0 {
            return Err(PipelineError::Internal("seek before start of object".into()));
        }
        let absolute = absolute as u64;

        if absolute == self.pos && self.reader.is_some() {
            return Ok(self.pos);
        }

        // short forward hops are cheaper as reads on the open response
        if self.reader.is_some()
            && absolute > self.pos
            && absolute - self.pos < DRAIN_FORWARD_LIMIT
        {
            let mut remaining = (absolute - self.pos) as usize;
            while remaining > 0 {
                let skipped = self.read(remaining).await?;
                if skipped.is_empty() {
                    break;
                }
                remaining -= skipped.len();
            }
            return Ok(self.pos);
        }

        self.open_at(absolute).await?;
        Ok(self.pos)
    }
}

impl std::fmt::Debug for RangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeStream")
            .field("url", &self.url)
            .field("pos", &self.pos)
            .field("size", &self.size)
            .finish()
    }
}
