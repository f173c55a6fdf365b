use super::program::{Instruction, ProgramInput, TimeWindow};
use super::{CONCAT_AUDIO_LABEL, CONCAT_VIDEO_LABEL, FfmpegCompiler};
use crate::video::timeline::{Clip, Timeline};

impl FfmpegCompiler {
    /// Emit one trim pair per clip followed by the concat step.
    ///
    /// Returns the engine inputs (one per clip, in sequence order) and the
    /// composed duration of the clamped segments.
    pub(super) fn push_clip_instructions(
        &self,
        instructions: &mut Vec<Instruction>,
        timeline: &Timeline,
    ) -> (Vec<ProgramInput>, f64) {
        let mut inputs = Vec::with_capacity(timeline.clips().len());
        let mut pairs = Vec::with_capacity(timeline.clips().len());
        let mut composed_duration = 0.0;

        for (idx, clip) in timeline.clips().iter().enumerate() {
            inputs.push(ProgramInput {
                name: input_file_name(idx),
                source: clip.source.clone(),
            });

            let window = clamped_window(clip);
            composed_duration += window.duration();

            let video_out = format!("v{idx}");
            let audio_out = format!("a{idx}");
            instructions.push(Instruction::TrimClip {
                input: idx,
                window,
                width: self.target_width,
                height: self.target_height,
                video_out: video_out.clone(),
                audio_out: audio_out.clone(),
            });
            pairs.push((video_out, audio_out));
        }

        instructions.push(Instruction::Concat {
            pairs,
            video_out: CONCAT_VIDEO_LABEL.to_string(),
            audio_out: CONCAT_AUDIO_LABEL.to_string(),
        });

        (inputs, composed_duration)
    }
}

pub(super) fn input_file_name(idx: usize) -> String {
    format!("input{idx}.mp4")
}

/// Clamp the trim into `0 <= start <= end <= duration`.
///
/// An inverted trim collapses to a zero-length segment at `start` rather
/// than being rejected, so every clip still yields exactly one trim pair.
pub(super) fn clamped_window(clip: &Clip) -> TimeWindow {
    let duration = clip.duration().max(0.0);
    let start = clip.trim_start.max(0.0).min(duration);
    let end = clip.trim_end.max(start).min(duration);
    TimeWindow::new(start, end)
}
