use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::runtime::Handle;

use crate::bridge::{self, DEFAULT_QUEUE_SIZE, Emitter};
use crate::pipeline::StepOutput;
use crate::steps::{PipelineStep, StepContext, emit_chunks, first_input};
use crate::stream::SyncStream;
use api::file::FileMetadata;
use api::step::StepArgs;
use common::crypt4gh::{Header, PublicKey, writer::add_recipient};
use common::error::PipelineError;
use common::keys::KeyCollection;

// grant one more recipient access to a crypt4gh container
//
// only the header is rewritten; the encrypted data blocks stream through
// byte for byte, so the step costs one header regardless of file size.
pub struct AddRecipientCrypt4gh;

#[async_trait]
impl PipelineStep for AddRecipientCrypt4gh {
    async fn process(
        &self,
        mut input: StepOutput,
        args: &StepArgs,
        ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError> {
        let data = first_input(&mut input, args, ctx).await?;

        let recipient = PublicKey::from_pem(
            args.str("recipient_pub")
                .ok_or(PipelineError::MissingArgument("recipient_pub"))?,
        )?;

        let metadata = FileMetadata {
            file_name: Some(data.metadata().file_name_or("output.c4gh").to_string()),
            media_type: Some(api::OCTET_STREAM.to_string()),
            download: Some(true),
            ..Default::default()
        };

        let keys = ctx.keys.clone();
        let stream = SyncStream::new(Handle::current(), data);

        let handle = bridge::run(DEFAULT_QUEUE_SIZE, move |emit| {
            add_recipient_worker(stream, keys, recipient, metadata, emit)
        });

        StepOutput::from_bridge(handle).await
    }
}

fn add_recipient_worker(
    mut stream: SyncStream,
    keys: Arc<KeyCollection>,
    recipient: PublicKey,
    metadata: FileMetadata,
    emit: &Emitter,
) -> Result<(), PipelineError> {
    emit.file_count(Some(1))?;

    let header = Header::read_from(&mut stream)?;
    let rewritten = add_recipient(&header, keys.keys(), &recipient)?;

    emit.start_file(metadata)?;
    emit.chunk(Bytes::from(rewritten.to_bytes()))?;

    // data blocks pass through untouched
    emit_chunks(&mut stream, emit)?;
    emit.end_file()
}
