use async_trait::async_trait;
use tokio::runtime::Handle;

use crate::bridge::{self, DEFAULT_QUEUE_SIZE, Emitter};
use crate::pipeline::StepOutput;
use crate::steps::{PipelineStep, StepContext, emit_chunks, first_input};
use crate::stream::SyncStream;
use api::file::FileMetadata;
use api::step::StepArgs;
use common::crypt4gh::{Decryptor, SecretKey};
use common::error::PipelineError;

// decrypt a crypt4gh container with a caller-supplied private key
//
// the output name drops a trailing .c4gh; anything else gets .decrypted
// appended so the caller can tell the plaintext apart from the container.
pub struct DecryptCrypt4gh;

#[async_trait]
impl PipelineStep for DecryptCrypt4gh {
    async fn process(
        &self,
        mut input: StepOutput,
        args: &StepArgs,
        ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError> {
        let data = first_input(&mut input, args, ctx).await?;

        let key = SecretKey::from_pem(
            args.str("recipient_sec")
                .ok_or(PipelineError::MissingArgument("recipient_sec"))?,
        )?;

        let input_name = data.metadata().file_name_or("output.c4gh");
        let output_name = match input_name.strip_suffix(".c4gh") {
            Some(stem) => stem.to_string(),
            None => format!("{input_name}.decrypted"),
        };

        let metadata = FileMetadata {
            file_name: Some(output_name),
            media_type: Some(api::OCTET_STREAM.to_string()),
            ..Default::default()
        };

        let stream = SyncStream::new(Handle::current(), data);

        let handle = bridge::run(DEFAULT_QUEUE_SIZE, move |emit| {
            decrypt_worker(stream, &[key], metadata, emit)
        });

        StepOutput::from_bridge(handle).await
    }
}

fn decrypt_worker(
    stream: SyncStream,
    keys: &[SecretKey],
    metadata: FileMetadata,
    emit: &Emitter,
) -> Result<(), PipelineError> {
    emit.file_count(Some(1))?;

    let mut decryptor = Decryptor::new(stream, keys)?;

    emit.start_file(metadata)?;
    emit_chunks(&mut decryptor, emit)?;
    emit.end_file()
}
