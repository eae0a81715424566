use std::io::{Read, Seek};
use std::path::Path;

use async_trait::async_trait;
use tokio::runtime::Handle;
use zip::ZipArchive;

use crate::bridge::{self, DEFAULT_QUEUE_SIZE, Emitter};
use crate::pipeline::StepOutput;
use crate::steps::{PipelineStep, StepContext, emit_chunks, first_input, guess_media_type};
use crate::stream::SyncStream;
use api::file::FileMetadata;
use api::step::StepArgs;
use common::error::PipelineError;

// pull one file or one directory subtree out of a zip
//
// a file match produces exactly one output; a directory match produces one
// output per contained non-directory entry, in the archive's native order,
// named relative to the selected base.  the file count is unknowable up
// front in directory mode, since entries stream out as they decompress.
pub struct ExtractZip;

#[async_trait]
impl PipelineStep for ExtractZip {
    async fn process(
        &self,
        mut input: StepOutput,
        args: &StepArgs,
        ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError> {
        let data = first_input(&mut input, args, ctx).await?;

        let target = args
            .str("directory_or_file_name")
            .ok_or(PipelineError::MissingArgument("directory_or_file_name"))?
            .trim_matches('/')
            .to_string();

        if target.is_empty() {
            return Err(PipelineError::MissingArgument("directory_or_file_name"));
        }

        let stream = SyncStream::new(Handle::current(), data);

        let handle = bridge::run(DEFAULT_QUEUE_SIZE, move |emit| {
            extract_worker(stream, &target, emit)
        });

        StepOutput::from_bridge(handle).await
    }
}

fn extract_worker(stream: SyncStream, target: &str, emit: &Emitter) -> Result<(), PipelineError> {
    if !stream.seekable() {
        return Err(PipelineError::Internal(
            "zip extraction needs a seekable input".into(),
        ));
    }

    let mut archive = ZipArchive::new(stream).map_err(|_| PipelineError::NotAZip)?;

    // entry names in central-directory order
    let names = entry_names(&mut archive)?;

    // a plain file wins over a directory of the same name
    if let Some(name) = names
        .iter()
        .find(|name| !name.ends_with('/') && name.trim_matches('/') == target)
        .cloned()
    {
        emit.file_count(Some(1))?;

        let base = Path::new(&name)
            .parent()
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default();

        return emit_entry(&mut archive, &base, &name, emit);
    }

    if let Some(dir) = names
        .iter()
        .find(|name| name.ends_with('/') && name.trim_matches('/') == target)
        .cloned()
    {
        emit.file_count(None)?;

        for name in names
            .iter()
            .filter(|name| name.starts_with(&dir) && !name.ends_with('/'))
        {
            emit_entry(&mut archive, &dir, name, emit)?;
        }

        return Ok(());
    }

    Err(PipelineError::EntryNotFound(target.to_string()))
}

fn entry_names<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<String>, PipelineError> {
    let mut names = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|_| PipelineError::NotAZip)?;
        names.push(entry.name().to_string());
    }

    Ok(names)
}

fn emit_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    base: &str,
    name: &str,
    emit: &Emitter,
) -> Result<(), PipelineError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|err| PipelineError::StepCrashed(err.to_string()))?;

    let relative = name
        .strip_prefix(base)
        .unwrap_or(name)
        .trim_start_matches('/')
        .to_string();

    emit.start_file(FileMetadata {
        media_type: Some(guess_media_type(&relative)),
        file_name: Some(relative),
        ..Default::default()
    })?;

    emit_chunks(&mut entry, emit)?;
    emit.end_file()
}
