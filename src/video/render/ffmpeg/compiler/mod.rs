mod clips;
mod overlays;
mod program;
mod util;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

pub use self::program::{CompiledProgram, Instruction};

use crate::video::config::StudioConfig;
use crate::video::error::StudioError;
use crate::video::support::ffmpeg::PROFILE_H264_AAC_QUALITY_FASTSTART;
use crate::video::timeline::Timeline;

pub const OUTPUT_FILE_NAME: &str = "output.mp4";
const CONCAT_VIDEO_LABEL: &str = "concat_v";
const CONCAT_AUDIO_LABEL: &str = "concat_a";

#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, filters: Vec<String>) {
        self.filters.extend(filters);
    }

    pub fn join(&self) -> String {
        self.filters.join(";")
    }
}

/// Video dimensions (width x height in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

impl VideoDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Compiles a timeline snapshot into a [`CompiledProgram`].
///
/// Compilation is pure: the same timeline always yields the same program,
/// and later edits to the timeline never affect an already compiled one.
pub struct FfmpegCompiler {
    target_width: u32,
    target_height: u32,
    font_size: u32,
    font_file: Option<PathBuf>,
}

impl FfmpegCompiler {
    pub fn new(target_dimensions: VideoDimensions, font_size: u32, font_file: Option<PathBuf>) -> Self {
        Self {
            target_width: target_dimensions.width,
            target_height: target_dimensions.height,
            font_size,
            font_file,
        }
    }

    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(
            VideoDimensions::new(config.frame_width(), config.frame_height()),
            config.font_size(),
            config.font_file.clone(),
        )
    }

    /// Compile the timeline. Rendering needs at least one clip.
    pub fn compile(&self, timeline: &Timeline) -> Result<CompiledProgram, StudioError> {
        if timeline.is_empty() {
            return Err(StudioError::Validation(
                "Add at least one clip before rendering".to_string(),
            ));
        }

        let mut instructions = Vec::new();

        let (inputs, composed_duration) = self.push_clip_instructions(&mut instructions, timeline);

        let video_label = self.push_overlay_instructions(
            &mut instructions,
            timeline.overlays(),
            CONCAT_VIDEO_LABEL,
        );

        instructions.push(Instruction::MapOutput {
            video: video_label,
            audio: CONCAT_AUDIO_LABEL.to_string(),
        });

        Ok(CompiledProgram {
            inputs,
            instructions,
            output_name: OUTPUT_FILE_NAME.to_string(),
            encoding: PROFILE_H264_AAC_QUALITY_FASTSTART,
            composed_duration,
        })
    }
}
