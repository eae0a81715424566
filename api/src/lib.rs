pub mod file;
pub mod report;
pub mod step;

// url path prefix for pipeline requests, i.e. /pipeline/<token_id>
pub const DEFAULT_URL_PREFIX: &str = "pipeline";

// unit of streaming throughout the engine -- network reads, bridge chunks,
// and response bodies all move in pieces of at most this many bytes
pub const CHUNK_SIZE: usize = 65_000;

// fallback content type whenever nothing better is known
pub const OCTET_STREAM: &str = "application/octet-stream";
