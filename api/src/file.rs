use serde::{Deserialize, Serialize};

use crate::OCTET_STREAM;

// per-file metadata
//
// every file moving through a pipeline carries one of these.  steps fill in
// whichever fields they know about; the http edge only ever looks at
// file_name, media_type, and download.  the struct crosses the sync/async
// bridge inside startfile frames, so it stays plain data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    // false means "render in the response body, no attachment"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<bool>,

    // set by the image preview step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    // set by the validation step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileMetadata {
    pub fn named(file_name: impl Into<String>) -> Self {
        FileMetadata {
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    pub fn media_type(&self) -> &str {
        self.media_type.as_deref().unwrap_or(OCTET_STREAM)
    }

    pub fn file_name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.file_name.as_deref().unwrap_or(fallback)
    }

    pub fn download(&self) -> bool {
        self.download.unwrap_or(true)
    }
}
