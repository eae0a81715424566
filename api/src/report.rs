use serde::{Deserialize, Serialize};

// one row of a zip preview listing, keyed by entry name in the output object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZipEntryInfo {
    pub is_dir: bool,
    pub file_size: u64,

    // zone-less archive timestamp, "YYYY-MM-DD HH:MM:SS"
    pub modified_time: String,

    pub compressed_size: u64,
    pub compress_type: String,

    // guessed from the entry's extension; empty for directories
    pub media_type: String,
}

// body of the validation step's json output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub error: Option<String>,
    pub file_name: String,
}
