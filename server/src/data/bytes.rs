use std::io::SeekFrom;

use bytes::Bytes;

use api::file::FileMetadata;
use common::error::PipelineError;

// in-memory pipeline data, used for small generated outputs like json
// reports and finished zip archives
pub struct BytesPipelineData {
    bytes: Bytes,
    pos: usize,
    metadata: FileMetadata,
}

impl BytesPipelineData {
    pub fn new(bytes: Bytes, metadata: FileMetadata) -> Self {
        BytesPipelineData {
            bytes,
            pos: 0,
            metadata,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut FileMetadata {
        &mut self.metadata
    }

    pub fn read(&mut self, n: usize) -> Bytes {
        if self.pos >= self.bytes.len() {
            return Bytes::new();
        }

        let end = (self.pos + n).min(self.bytes.len());
        let chunk = self.bytes.slice(self.pos..end);
        self.pos = end;
        chunk
    }

    pub fn seek(&mut self, target: SeekFrom) -> Result<u64, PipelineError> {
        let len = self.bytes.len() as i64;

        let absolute = match target {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
            SeekFrom::End(offset) => len + offset,
        };

        if absolute < 0 {
            return Err(PipelineError::Internal("seek before start of buffer".into()));
        }

        self.pos = absolute as usize;
        Ok(self.pos as u64)
    }

    pub fn tell(&self) -> u64 {
        self.pos as u64
    }
}
