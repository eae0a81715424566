use std::io::{Read, Seek, SeekFrom};

use tokio::runtime::Handle;

use crate::data::PipelineData;
use api::file::FileMetadata;

// blocking adapter over async pipeline data
//
// the zip and crypt4gh codecs are synchronous Read + Seek consumers, but
// pipeline data is ultimately async (ranged http, bridge queues).  workers
// own one of these and re-enter the runtime for every call; that re-entry
// is the only place a worker thread may suspend on the async side.
pub struct SyncStream {
    handle: Handle,
    data: PipelineData,
}

impl SyncStream {
    pub fn new(handle: Handle, data: PipelineData) -> Self {
        SyncStream { handle, data }
    }

    pub fn metadata(&self) -> &FileMetadata {
        self.data.metadata()
    }

    // queue-backed data cannot rewind; zip consumers must check first
    pub fn seekable(&self) -> bool {
        self.data.seekable()
    }

    pub fn into_inner(self) -> PipelineData {
        self.data
    }
}

impl Read for SyncStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let chunk = self.handle.block_on(self.data.read(buf.len()))?;

        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

impl Seek for SyncStream {
    fn seek(&mut self, target: SeekFrom) -> std::io::Result<u64> {
        Ok(self.handle.block_on(self.data.seek(target))?)
    }

    fn stream_position(&mut self) -> std::io::Result<u64> {
        Ok(self.data.tell())
    }
}
