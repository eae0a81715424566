use bytes::Bytes;

use api::file::FileMetadata;
use common::error::PipelineError;

// frames exchanged between a blocking worker and its async consumer
//
// the protocol is: one FileCount, then zero or more
// (StartFile, Chunk*, EndFile) groups, closed by Complete or Error.
// anything else observed by the consumer is a bridge bug.
#[derive(Debug)]
pub enum Frame {
    // number of files the worker will produce; None when it cannot know
    // without doing the work (directory extraction)
    FileCount(Option<u64>),

    StartFile(FileMetadata),

    // payload bytes, in order, at most CHUNK_SIZE each
    Chunk(Bytes),

    EndFile,

    // the worker function returned cleanly
    Complete,

    Error(PipelineError),
}

impl Frame {
    // tag for protocol-violation reports
    pub fn tag(&self) -> &'static str {
        match self {
            Frame::FileCount(_) => "file_count",
            Frame::StartFile(_) => "startfile",
            Frame::Chunk(_) => "chunk",
            Frame::EndFile => "endfile",
            Frame::Complete => "complete",
            Frame::Error(_) => "error",
        }
    }
}
