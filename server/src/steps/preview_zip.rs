use std::io::{Read, Seek};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use zip::{CompressionMethod, ZipArchive};

use crate::bridge::{self, DEFAULT_QUEUE_SIZE, Emitter};
use crate::pipeline::StepOutput;
use crate::steps::{PipelineStep, StepContext, first_input, guess_media_type};
use crate::stream::SyncStream;
use api::file::FileMetadata;
use api::report::ZipEntryInfo;
use api::step::StepArgs;
use common::error::PipelineError;

// list a zip's central directory as a json object keyed by entry name
//
// only the directory at the tail of the archive is read; entry data is
// never decompressed.
pub struct PreviewZip;

#[async_trait]
impl PipelineStep for PreviewZip {
    async fn process(
        &self,
        mut input: StepOutput,
        args: &StepArgs,
        ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError> {
        let data = first_input(&mut input, args, ctx).await?;
        let stream = SyncStream::new(Handle::current(), data);

        let handle = bridge::run(DEFAULT_QUEUE_SIZE, move |emit| {
            preview_worker(stream, emit)
        });

        StepOutput::from_bridge(handle).await
    }
}

fn preview_worker(stream: SyncStream, emit: &Emitter) -> Result<(), PipelineError> {
    emit.file_count(Some(1))?;

    if !stream.seekable() {
        return Err(PipelineError::Internal(
            "zip preview needs a seekable input".into(),
        ));
    }

    let mut archive = ZipArchive::new(stream).map_err(|_| PipelineError::NotAZip)?;
    let listing = zip_listing(&mut archive)?;

    let body = serde_json::to_vec_pretty(&listing)
        .map_err(|err| PipelineError::Internal(err.to_string()))?;

    emit.start_file(FileMetadata {
        media_type: Some("application/json".to_string()),
        ..Default::default()
    })?;

    emit.chunk(Bytes::from(body))?;
    emit.end_file()
}

fn zip_listing<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Map<String, Value>, PipelineError> {
    let mut listing = Map::new();

    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|_| PipelineError::NotAZip)?;

        let name = entry.name().to_string();
        let is_dir = entry.is_dir();

        let info = ZipEntryInfo {
            is_dir,
            file_size: entry.size(),
            modified_time: format_modified(entry.last_modified()),
            compressed_size: entry.compressed_size(),
            compress_type: compression_name(entry.compression()),
            media_type: if is_dir {
                String::new()
            } else {
                guess_media_type(&name)
            },
        };

        listing.insert(
            name,
            serde_json::to_value(info).map_err(|err| PipelineError::Internal(err.to_string()))?,
        );
    }

    Ok(listing)
}

// archive timestamps are zone-less dos values; render them verbatim
fn format_modified(datetime: Option<zip::DateTime>) -> String {
    let datetime = datetime.unwrap_or_default();

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        datetime.year(),
        datetime.month(),
        datetime.day(),
        datetime.hour(),
        datetime.minute(),
        datetime.second()
    )
}

fn compression_name(method: CompressionMethod) -> String {
    match method {
        CompressionMethod::Stored => "stored".to_string(),
        CompressionMethod::Deflated => "deflated".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}
