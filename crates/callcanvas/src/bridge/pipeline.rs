//! Per-session ordered generation pipeline.
//!
//! Provider calls for one session run concurrently (up to a bound), but their
//! results are recorded and pushed strictly in dispatch order. The task exits
//! once its session is dropped from the registry and all in-flight calls have
//! settled.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesOrdered;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::generation::{GenerationError, GenerationResult, ImageGenerator};
use crate::trigger::TriggerRequest;
use crate::ws::ServerEvent;

use super::models::GeneratedImage;
use super::registry::SessionRegistry;

/// Queue handle stored on the session.
pub(crate) type PipelineSender = mpsc::UnboundedSender<PendingGeneration>;

/// A dispatched request waiting for the provider.
#[derive(Debug)]
pub(crate) struct PendingGeneration {
    pub request: TriggerRequest,
    pub reply: oneshot::Sender<GenerationResult<GeneratedImage>>,
}

/// Handle to the outcome of one dispatched generation.
///
/// Dropping the ticket does not cancel the generation.
#[derive(Debug)]
pub struct GenerationTicket {
    rx: oneshot::Receiver<GenerationResult<GeneratedImage>>,
}

impl GenerationTicket {
    pub(crate) fn new(rx: oneshot::Receiver<GenerationResult<GeneratedImage>>) -> Self {
        Self { rx }
    }

    /// Wait for the generation to settle.
    pub async fn wait(self) -> GenerationResult<GeneratedImage> {
        self.rx.await.unwrap_or(Err(GenerationError::Cancelled))
    }
}

/// Everything a pipeline task needs to know about its session.
pub(crate) struct PipelineContext {
    pub conversation_id: String,
    pub owner_user_id: String,
    pub instance: Uuid,
    pub registry: Arc<SessionRegistry>,
    pub generator: Arc<dyn ImageGenerator>,
    pub max_in_flight: usize,
}

/// Spawn the pipeline task and return its queue.
pub(crate) fn spawn_pipeline(ctx: PipelineContext) -> PipelineSender {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_pipeline(ctx, rx));
    tx
}

async fn run_pipeline(ctx: PipelineContext, mut rx: mpsc::UnboundedReceiver<PendingGeneration>) {
    let max_in_flight = ctx.max_in_flight.max(1);
    let mut in_flight = FuturesOrdered::new();
    let mut accepting = true;

    debug!("Generation pipeline started for {}", ctx.conversation_id);

    loop {
        tokio::select! {
            biased;

            Some((pending, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                deliver(&ctx, pending, outcome);
            }

            next = rx.recv(), if accepting && in_flight.len() < max_in_flight => {
                match next {
                    Some(pending) => {
                        let generator = Arc::clone(&ctx.generator);
                        let owner = ctx.owner_user_id.clone();
                        in_flight.push_back(async move {
                            let outcome = generator.generate(&owner, &pending.request).await;
                            (pending, outcome)
                        });
                    }
                    None => accepting = false,
                }
            }

            else => break,
        }
    }

    debug!("Generation pipeline for {} finished", ctx.conversation_id);
}

fn deliver(
    ctx: &PipelineContext,
    pending: PendingGeneration,
    outcome: GenerationResult<crate::generation::ImageResult>,
) {
    let PendingGeneration { request, reply } = pending;
    let id = ctx.conversation_id.as_str();

    let result = match outcome {
        Ok(result) => {
            let image = GeneratedImage::new(&request, result);
            if ctx.registry.record_image_in(id, ctx.instance, image.clone()) {
                info!("Generated image for {}: {}", id, image.url);
                ctx.registry.push_in(
                    id,
                    ctx.instance,
                    ServerEvent::ImageGenerated {
                        conversation_id: id.to_string(),
                        image: image.clone(),
                        timestamp: Utc::now(),
                    },
                );
                Ok(image)
            } else {
                debug!("Session {} ended before its image arrived", id);
                Err(GenerationError::Cancelled)
            }
        }
        Err(err) => {
            warn!("Image generation failed for {}: {}", id, err);
            ctx.registry.push_in(
                id,
                ctx.instance,
                ServerEvent::ImageError {
                    conversation_id: id.to_string(),
                    prompt: request.prompt.clone(),
                    error: err.to_string(),
                    timestamp: Utc::now(),
                },
            );
            Err(err)
        }
    };

    // Nobody may be waiting; that is fine.
    let _ = reply.send(result);
}
