use super::FfmpegCompiler;
use super::program::{Instruction, TextStyle, TimeWindow};
use crate::video::timeline::TextOverlay;

impl FfmpegCompiler {
    fn text_style(&self) -> TextStyle {
        TextStyle {
            font_size: self.font_size,
            font_file: self.font_file.clone(),
        }
    }

    /// Chain one drawtext step per overlay, in insertion order, starting
    /// from `input_label`. Returns the label of the last video stream.
    pub(super) fn push_overlay_instructions(
        &self,
        instructions: &mut Vec<Instruction>,
        overlays: &[TextOverlay],
        input_label: &str,
    ) -> String {
        let mut current_video_label = input_label.to_string();

        for (idx, overlay) in overlays.iter().enumerate() {
            let output_label = format!("overlay_out_{idx}");
            instructions.push(Instruction::DrawText {
                video_in: current_video_label,
                video_out: output_label.clone(),
                text: overlay.text.clone(),
                window: TimeWindow::new(overlay.start_time, overlay.end_time),
                position: overlay.position,
                style: self.text_style(),
            });
            current_video_label = output_label;
        }

        current_video_label
    }
}
