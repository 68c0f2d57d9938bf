//! Stage progress projection for an in-flight receipt submission.
//!
//! Two tracks share the same start and end:
//! - standard: `uploading → scanning → extracting → complete`
//! - AI-enhanced: `uploading → scanning → analyzing → extracting → complete`
//!
//! The track is chosen once the upload response is known. `error` is reachable
//! from any state and ends the sequence. Reported progress never decreases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProgressConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uploading,
    Scanning,
    Analyzing,
    Extracting,
    Complete,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Uploading => "uploading",
            Stage::Scanning => "scanning",
            Stage::Analyzing => "analyzing",
            Stage::Extracting => "extracting",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }

    /// Minimum time the narrator holds this stage on screen.
    pub fn min_duration(&self, config: &ProgressConfig) -> Duration {
        let ms = match self {
            Stage::Uploading => config.uploading_ms,
            Stage::Scanning => config.scanning_ms,
            Stage::Analyzing => config.analyzing_ms,
            Stage::Extracting => config.extracting_ms,
            Stage::Complete | Stage::Error => 0,
        };
        Duration::from_millis(ms)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Standard,
    AiEnhanced,
}

impl Track {
    pub fn from_ai_enhanced(ai_enhanced: bool) -> Self {
        if ai_enhanced {
            Track::AiEnhanced
        } else {
            Track::Standard
        }
    }

    fn stages(&self) -> &'static [Stage] {
        match self {
            Track::Standard => &[
                Stage::Uploading,
                Stage::Scanning,
                Stage::Extracting,
                Stage::Complete,
            ],
            Track::AiEnhanced => &[
                Stage::Uploading,
                Stage::Scanning,
                Stage::Analyzing,
                Stage::Extracting,
                Stage::Complete,
            ],
        }
    }
}

/// One user-visible progress step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectorError {
    #[error("cannot move from {from} back to {to}")]
    Backward { from: Stage, to: Stage },

    #[error("cannot skip from {from} to {to}")]
    Skipped { from: Stage, to: Stage },

    #[error("stage {to} is not on the selected track")]
    OffTrack { to: Stage },

    #[error("projection already ended at {stage}")]
    Terminal { stage: Stage },
}

fn percent_for(stage: Stage, track: Option<Track>) -> u8 {
    match (stage, track) {
        (Stage::Uploading, _) => 15,
        (Stage::Scanning, Some(Track::Standard)) => 60,
        (Stage::Scanning, _) => 35,
        (Stage::Analyzing, _) => 80,
        (Stage::Extracting, _) => 95,
        (Stage::Complete, _) => 100,
        (Stage::Error, _) => 0,
    }
}

fn message_for(stage: Stage, track: Option<Track>) -> &'static str {
    match (stage, track) {
        (Stage::Uploading, _) => "Uploading receipt...",
        (Stage::Scanning, Some(Track::Standard)) => "Reading receipt details...",
        (Stage::Scanning, _) => "Scanning receipt...",
        (Stage::Analyzing, _) => "AI is reviewing low-confidence fields...",
        (Stage::Extracting, _) => "Extracting expense details...",
        (Stage::Complete, _) => "Receipt processed",
        (Stage::Error, _) => "Processing failed",
    }
}

/// Pure state machine over [`Stage`]; records every update it emits.
#[derive(Debug, Clone, Default)]
pub struct StageProjector {
    track: Option<Track>,
    current: Option<Stage>,
    percent: u8,
    history: Vec<StageUpdate>,
}

impl StageProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Stage> {
        self.current
    }

    pub fn track(&self) -> Option<Track> {
        self.track
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn history(&self) -> &[StageUpdate] {
        &self.history
    }

    /// Fix the track once the upload response is known. The first call wins.
    pub fn select_track(&mut self, track: Track) -> Track {
        *self.track.get_or_insert(track)
    }

    /// Move to `to`, which must be the current stage's successor on the
    /// selected track. Re-entering the current stage is allowed only when it
    /// raises the reported percentage (scanning once the standard track is
    /// known).
    pub fn advance_to(&mut self, to: Stage) -> Result<StageUpdate, ProjectorError> {
        if to == Stage::Error {
            return Ok(self.fail(None));
        }
        if let Some(stage) = self.current.filter(Stage::is_terminal) {
            return Err(ProjectorError::Terminal { stage });
        }

        let sequence = self.track.unwrap_or(Track::AiEnhanced).stages();
        let target = sequence
            .iter()
            .position(|s| *s == to)
            .ok_or(ProjectorError::OffTrack { to })?;
        if self.track.is_none() && target > 1 {
            return Err(ProjectorError::OffTrack { to });
        }

        let percent = percent_for(to, self.track);
        match self.current {
            None if target != 0 => {
                return Err(ProjectorError::Skipped {
                    from: Stage::Uploading,
                    to,
                })
            }
            None => {}
            Some(from) => {
                let position = sequence.iter().position(|s| *s == from).unwrap_or(0);
                if target < position || (target == position && percent <= self.percent) {
                    return Err(ProjectorError::Backward { from, to });
                }
                if target > position + 1 {
                    return Err(ProjectorError::Skipped { from, to });
                }
            }
        }

        Ok(self.emit(to, percent.max(self.percent), message_for(to, self.track).to_string()))
    }

    /// Enter the `error` state from anywhere. Progress is held, not reset.
    pub fn fail(&mut self, message: Option<&str>) -> StageUpdate {
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| message_for(Stage::Error, self.track).to_string());
        self.emit(Stage::Error, self.percent, message)
    }

    fn emit(&mut self, stage: Stage, percent: u8, message: String) -> StageUpdate {
        self.current = Some(stage);
        self.percent = percent;
        let update = StageUpdate {
            stage,
            percent,
            message,
        };
        tracing::debug!(stage = %stage, percent, "Stage advanced");
        self.history.push(update.clone());
        update
    }
}
