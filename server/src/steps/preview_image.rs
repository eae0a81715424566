use std::io::{Cursor, Read};

use async_trait::async_trait;
use bytes::Bytes;
use image::ColorType;
use tokio::runtime::Handle;

use crate::bridge::{self, DEFAULT_QUEUE_SIZE, Emitter};
use crate::pipeline::StepOutput;
use crate::steps::{PipelineStep, StepContext, first_input};
use crate::stream::SyncStream;
use api::file::FileMetadata;
use api::step::StepArgs;
use common::error::PipelineError;

// downscale an image to fit the requested bounds
//
// images inside the bounds pass through untouched; larger ones shrink
// preserving aspect ratio and are re-encoded in their original format.
// the image crate is synchronous, so the whole job runs worker-side, the
// same way the rest of the blocking steps do.
pub struct PreviewImage;

#[async_trait]
impl PipelineStep for PreviewImage {
    async fn process(
        &self,
        mut input: StepOutput,
        args: &StepArgs,
        ctx: &StepContext,
    ) -> Result<StepOutput, PipelineError> {
        let data = first_input(&mut input, args, ctx).await?;

        let max_width = args
            .u32("max_width")
            .ok_or(PipelineError::MissingArgument("max_width"))?;
        let max_height = args
            .u32("max_height")
            .ok_or(PipelineError::MissingArgument("max_height"))?;

        let file_name = data.metadata().file_name.clone();
        let stream = SyncStream::new(Handle::current(), data);

        let handle = bridge::run(DEFAULT_QUEUE_SIZE, move |emit| {
            preview_worker(stream, max_width, max_height, file_name, emit)
        });

        StepOutput::from_bridge(handle).await
    }
}

fn preview_worker(
    mut stream: SyncStream,
    max_width: u32,
    max_height: u32,
    file_name: Option<String>,
    emit: &Emitter,
) -> Result<(), PipelineError> {
    emit.file_count(Some(1))?;

    let mut bytes = Vec::new();
    stream
        .read_to_end(&mut bytes)
        .map_err(PipelineError::from_io)?;

    let format = image::guess_format(&bytes).map_err(|_| PipelineError::NotAnImage)?;
    let image = image::load_from_memory_with_format(&bytes, format)
        .map_err(|_| PipelineError::NotAnImage)?;

    // thumbnail() shrinks to fit both bounds, never enlarges
    let (image, body) = if max_width < image.width() || max_height < image.height() {
        let resized = image.thumbnail(max_width, max_height);

        let mut cursor = Cursor::new(Vec::new());
        resized
            .write_to(&mut cursor, format)
            .map_err(|err| PipelineError::StepCrashed(err.to_string()))?;

        (resized, cursor.into_inner())
    } else {
        (image, bytes)
    };

    emit.start_file(FileMetadata {
        file_name,
        media_type: Some(format.to_mime_type().to_string()),
        width: Some(image.width()),
        height: Some(image.height()),
        mode: Some(color_mode(image.color()).to_string()),
        ..Default::default()
    })?;

    for piece in body.chunks(api::CHUNK_SIZE) {
        emit.chunk(Bytes::copy_from_slice(piece))?;
    }

    emit.end_file()
}

// short tags in the style image viewers report
fn color_mode(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 => "L",
        ColorType::La8 | ColorType::La16 => "LA",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
        _ => "unknown",
    }
}
