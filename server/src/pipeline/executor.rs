use std::sync::Arc;

use tracing::{Level, debug, info, instrument};

use crate::data::PipelineData;
use crate::pipeline::{FileCount, StepOutput};
use crate::steps::{StepContext, build_step};
use crate::token::TokenStore;
use api::step::{StepArgs, StepKind};
use common::envelope;
use common::error::PipelineError;

// per-request pipeline driver
//
// resolves a token id into a step list, folds the steps over the streaming
// outputs, and enforces the termination contract: exactly one file reaches
// the caller, with an implicit zipping step inserted when a pipeline ends
// in more than one (or an unknowable number of) outputs.
pub struct PipelineExecutor {
    ctx: StepContext,
    store: Arc<dyn TokenStore>,
    server_private_pem: String,
    repo_public_pem: String,
}

impl PipelineExecutor {
    pub fn new(
        ctx: StepContext,
        store: Arc<dyn TokenStore>,
        server_private_pem: String,
        repo_public_pem: String,
    ) -> Self {
        PipelineExecutor {
            ctx,
            store,
            server_private_pem,
            repo_public_pem,
        }
    }

    #[instrument(level = Level::DEBUG, skip(self))]
    pub async fn run(&self, token_id: &str) -> Result<PipelineData, PipelineError> {
        let token = self
            .store
            .take(token_id)
            .await?
            .ok_or(PipelineError::TokenMissing)?;

        let payload = envelope::open(&token, &self.server_private_pem, &self.repo_public_pem)?;

        if payload.pipeline_steps.is_empty() {
            return Err(PipelineError::MalformedPayload(
                "no pipeline steps in payload".into(),
            ));
        }

        info!({steps = payload.pipeline_steps.len()}, "executing pipeline");

        let mut current = StepOutput::empty();

        for descriptor in &payload.pipeline_steps {
            let kind = StepKind::from_name(&descriptor.step_type)
                .ok_or_else(|| PipelineError::UnknownStep(descriptor.step_type.clone()))?;

            debug!({step = %descriptor.step_type}, "running pipeline step");

            let step = build_step(kind);
            current = step
                .process(current, &descriptor.arguments, &self.ctx)
                .await?;
        }

        // termination contract
        match current.file_count() {
            FileCount::Known(0) => Err(PipelineError::EmptyPipeline),
            FileCount::Known(1) => current
                .next_file()
                .await?
                .ok_or(PipelineError::EmptyPipeline),
            count => {
                // a single queue cannot reveal "exactly one" without
                // draining the first file, so unknown counts zip too
                debug!({count = ?count}, "zipping multiple pipeline outputs");

                let mut zipped = build_step(StepKind::CreateZip)
                    .process(current, &StepArgs::default(), &self.ctx)
                    .await?;

                zipped
                    .next_file()
                    .await?
                    .ok_or(PipelineError::EmptyPipeline)
            }
        }
    }
}
