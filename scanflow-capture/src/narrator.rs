//! Paces the stage projection against the real upload.
//!
//! `uploading` and `scanning` are shown for at least their minimum durations
//! while the upload runs; `scanning` then holds until the response arrives.
//! Only then is the track chosen and the remaining stages narrated. Elapsed
//! time never completes a submission on its own.

use async_trait::async_trait;
use scanflow_core::config::ProgressConfig;
use scanflow_core::progress::{Stage, StageProjector, StageUpdate, Track};
use std::future::Future;
use std::time::Duration;

/// Source of the cosmetic delays between stages.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// How the real operation ended, as far as narration cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded(Track),
    Failed(String),
}

/// Drive `projector` through the stages while awaiting `completion`.
/// Every emitted update is passed to `on_update`. Returns the completion's
/// output once the final stage has been shown.
pub async fn narrate<T, F, C, U>(
    pacer: &dyn Pacer,
    config: &ProgressConfig,
    projector: &mut StageProjector,
    completion: F,
    classify: C,
    mut on_update: U,
) -> T
where
    F: Future<Output = T>,
    C: FnOnce(&T) -> Completion,
    U: FnMut(&StageUpdate),
{
    tokio::pin!(completion);
    let mut result: Option<T> = None;

    for stage in [Stage::Uploading, Stage::Scanning] {
        advance(projector, stage, &mut on_update);

        let pause = pacer.pause(stage.min_duration(config));
        tokio::pin!(pause);
        loop {
            tokio::select! {
                output = &mut completion, if result.is_none() => result = Some(output),
                _ = &mut pause => break,
            }
        }
    }

    let result = match result {
        Some(output) => output,
        None => completion.await,
    };

    match classify(&result) {
        Completion::Failed(message) => {
            tracing::debug!(message = %message, "Narration ended in error");
            let update = projector.fail(Some(&message));
            on_update(&update);
        }
        Completion::Succeeded(track) => {
            let track = projector.select_track(track);
            let remaining: &[Stage] = match track {
                Track::Standard => &[Stage::Scanning, Stage::Extracting],
                Track::AiEnhanced => &[Stage::Analyzing, Stage::Extracting],
            };
            for stage in remaining {
                advance(projector, *stage, &mut on_update);
                if projector.current() != Some(Stage::Scanning) {
                    pacer.pause(stage.min_duration(config)).await;
                }
            }
            advance(projector, Stage::Complete, &mut on_update);
        }
    }

    result
}

fn advance<U: FnMut(&StageUpdate)>(projector: &mut StageProjector, stage: Stage, on_update: &mut U) {
    match projector.advance_to(stage) {
        Ok(update) => on_update(&update),
        Err(e) => tracing::warn!(stage = %stage, error = %e, "Stage transition rejected"),
    }
}
