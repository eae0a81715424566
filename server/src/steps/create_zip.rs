use std::io::{Cursor, Write};

use async_trait::async_trait;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::data::PipelineData;
use crate::pipeline::StepOutput;
use crate::steps::{PipelineStep, StepContext};
use api::file::FileMetadata;
use api::step::StepArgs;
use common::error::PipelineError;

// entries larger than the classic zip field limits need zip64 records
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

// bundle every input into one deflate archive
//
// this is both a requestable step and the implicit terminator the executor
// inserts when a pipeline ends with more than one output.  inputs are
// pulled lazily, one at a time, so upstream workers overlap with the
// compression of earlier entries.
pub struct CreateZip;

#[async_trait]
impl PipelineStep for CreateZip {
    async fn process(
        &self,
        mut input: StepOutput,
        _args: &StepArgs,
        _ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut index = 0usize;

        while let Some(mut data) = input.next_file().await? {
            let name = data
                .metadata()
                .file_name
                .clone()
                .unwrap_or_else(|| format!("file_{index}"));

            let bytes = data.read_to_end().await?;

            // deflate work runs off the async threads
            writer = tokio::task::spawn_blocking(move || -> Result<_, PipelineError> {
                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .large_file(bytes.len() as u64 >= ZIP64_THRESHOLD);

                writer
                    .start_file(name, options)
                    .map_err(|err| PipelineError::StepCrashed(err.to_string()))?;
                writer
                    .write_all(&bytes)
                    .map_err(|err| PipelineError::StepCrashed(err.to_string()))?;

                Ok(writer)
            })
            .await
            .map_err(|err| PipelineError::Internal(err.to_string()))??;

            index += 1;
        }

        if index == 0 {
            return Err(PipelineError::EmptyPipeline);
        }

        let archive = writer
            .finish()
            .map_err(|err| PipelineError::StepCrashed(err.to_string()))?
            .into_inner();

        let metadata = FileMetadata {
            file_name: Some("created.zip".to_string()),
            media_type: Some("application/zip".to_string()),
            download: Some(true),
            ..Default::default()
        };

        Ok(StepOutput::single(PipelineData::from_bytes(
            archive, metadata,
        )))
    }
}
