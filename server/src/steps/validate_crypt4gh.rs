use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::runtime::Handle;

use crate::bridge::{self, DEFAULT_QUEUE_SIZE, Emitter};
use crate::pipeline::StepOutput;
use crate::steps::{PipelineStep, StepContext, first_input};
use crate::stream::SyncStream;
use api::file::FileMetadata;
use api::report::ValidationReport;
use api::step::StepArgs;
use common::crypt4gh::Decryptor;
use common::error::PipelineError;
use common::keys::KeyCollection;

const VALIDATION_BUFFER: usize = 64 * 1024;

// check whether the repository's own keys can fully decrypt a container
//
// decryption failures are the expected outcome here, not errors: the step
// always succeeds and reports the verdict as a json document rendered
// inline (download=false).
pub struct ValidateCrypt4gh;

#[async_trait]
impl PipelineStep for ValidateCrypt4gh {
    async fn process(
        &self,
        mut input: StepOutput,
        args: &StepArgs,
        ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError> {
        let data = first_input(&mut input, args, ctx).await?;

        let file_name = data.metadata().file_name_or("unknown").to_string();
        let keys = ctx.keys.clone();
        let stream = SyncStream::new(Handle::current(), data);

        let handle = bridge::run(DEFAULT_QUEUE_SIZE, move |emit| {
            validate_worker(stream, keys, file_name, emit)
        });

        StepOutput::from_bridge(handle).await
    }
}

fn validate_worker(
    stream: SyncStream,
    keys: Arc<KeyCollection>,
    file_name: String,
    emit: &Emitter,
) -> Result<(), PipelineError> {
    emit.file_count(Some(1))?;

    let verdict = drain_decrypted(stream, &keys);

    // cancellation is the one failure that must not become a verdict
    if matches!(verdict, Err(PipelineError::Cancelled)) {
        return Err(PipelineError::Cancelled);
    }

    let report = ValidationReport {
        valid: verdict.is_ok(),
        error: verdict.err().map(|err| err.to_string()),
        file_name,
    };

    let body = serde_json::to_vec_pretty(&report)
        .map_err(|err| PipelineError::Internal(err.to_string()))?;

    emit.start_file(FileMetadata {
        file_name: Some("validation_result.json".to_string()),
        media_type: Some("application/json".to_string()),
        download: Some(false),
        validation: Some(report.valid),
        error: report.error.clone(),
        ..Default::default()
    })?;

    emit.chunk(Bytes::from(body))?;
    emit.end_file()
}

// decrypt the whole container through a small buffer, discarding plaintext
fn drain_decrypted(stream: SyncStream, keys: &KeyCollection) -> Result<(), PipelineError> {
    let mut decryptor = Decryptor::new(stream, keys.keys())?;
    let mut buf = vec![0u8; VALIDATION_BUFFER];

    loop {
        let n = decryptor.read(&mut buf).map_err(PipelineError::from_io)?;
        if n == 0 {
            return Ok(());
        }
    }
}
