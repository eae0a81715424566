use std::io::SeekFrom;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Url};

use crate::stream::RangeStream;
use api::file::FileMetadata;
use common::error::PipelineError;

// pipeline data backed by a remote object
//
// the file name comes from the url path so downstream steps can name their
// outputs; the media type is learned from the object store's first ranged
// response.
pub struct UrlPipelineData {
    stream: RangeStream,
    metadata: FileMetadata,
}

fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(String::from)
}

impl UrlPipelineData {
    pub fn new(client: Client, url: &str, timeout: Duration) -> Self {
        let metadata = FileMetadata {
            file_name: file_name_from_url(url),
            source_url: Some(url.to_string()),
            ..Default::default()
        };

        UrlPipelineData {
            stream: RangeStream::new(client, url, timeout),
            metadata,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut FileMetadata {
        &mut self.metadata
    }

    pub async fn read(&mut self, n: usize) -> Result<Bytes, PipelineError> {
        let chunk = self.stream.read(n).await?;

        if self.metadata.media_type.is_none() {
            self.metadata.media_type = self.stream.media_type().map(String::from);
        }

        Ok(chunk)
    }

    pub async fn seek(&mut self, target: SeekFrom) -> Result<u64, PipelineError> {
        let pos = self.stream.seek(target).await?;

        if self.metadata.media_type.is_none() {
            self.metadata.media_type = self.stream.media_type().map(String::from);
        }

        Ok(pos)
    }

    pub fn tell(&self) -> u64 {
        self.stream.tell()
    }

    pub async fn size(&mut self) -> Result<u64, PipelineError> {
        self.stream.size().await
    }
}
