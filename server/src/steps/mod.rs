pub mod add_recipient_crypt4gh;
pub mod create_zip;
pub mod decrypt_crypt4gh;
pub mod extract_zip;
pub mod preview_image;
pub mod preview_zip;
pub mod validate_crypt4gh;

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use crate::bridge::Emitter;
use crate::data::PipelineData;
use crate::pipeline::StepOutput;
use api::step::{StepArgs, StepKind};
use common::config::FPConfig;
use common::error::PipelineError;
use common::keys::KeyCollection;

// shared read-only state handed to every step
#[derive(Clone)]
pub struct StepContext {
    pub client: Client,
    pub keys: Arc<KeyCollection>,
    pub config: Arc<FPConfig>,
}

// a transformation in the pipeline chain
//
// each step consumes the previous step's first output (or fetches
// args.source_url when it runs first) and produces its own ordered
// outputs.  blocking work never happens here directly; it goes through
// the bridge.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    async fn process(
        &self,
        input: StepOutput,
        args: &StepArgs,
        ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError>;
}

// step registry; unknown kinds never get this far
pub fn build_step(kind: StepKind) -> Box<dyn PipelineStep> {
    match kind {
        StepKind::DecryptCrypt4gh => Box::new(decrypt_crypt4gh::DecryptCrypt4gh),
        StepKind::AddRecipientCrypt4gh => Box::new(add_recipient_crypt4gh::AddRecipientCrypt4gh),
        StepKind::ValidateCrypt4gh => Box::new(validate_crypt4gh::ValidateCrypt4gh),
        StepKind::PreviewZip => Box::new(preview_zip::PreviewZip),
        StepKind::ExtractZip => Box::new(extract_zip::ExtractZip),
        StepKind::PreviewImage => Box::new(preview_image::PreviewImage),
        StepKind::CreateZip => Box::new(create_zip::CreateZip),
    }
}

// the step's input: the previous step's first output file, else a ranged
// fetch of args.source_url
pub(crate) async fn first_input(
    input: &mut StepOutput,
    args: &StepArgs,
    ctx: &StepContext,
) -> Result<PipelineData, PipelineError> {
    if let Some(data) = input.next_file().await? {
        return Ok(data);
    }

    let url = args
        .str("source_url")
        .ok_or(PipelineError::MissingArgument("source_url"))?;

    Ok(PipelineData::from_url(
        ctx.client.clone(),
        url,
        ctx.config.fetch_timeout,
    ))
}

// fill buf as far as the source allows; short only at end of stream
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, PipelineError> {
    let mut filled = 0;

    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .map_err(PipelineError::from_io)?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(filled)
}

// drain a sync reader into bounded chunk frames
pub(crate) fn emit_chunks<R: Read>(reader: &mut R, emit: &Emitter) -> Result<(), PipelineError> {
    let mut buf = vec![0u8; api::CHUNK_SIZE];

    loop {
        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            return Ok(());
        }
        emit.chunk(Bytes::copy_from_slice(&buf[..n]))?;
    }
}

pub(crate) fn guess_media_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| api::OCTET_STREAM.to_string())
}
