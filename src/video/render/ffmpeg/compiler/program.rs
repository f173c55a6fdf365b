use std::path::PathBuf;

use crate::video::support::ffmpeg::EncodingProfile;
use crate::video::timeline::{OverlayPosition, SourceLocation};

use super::FilterChain;
use super::util::{escape_drawtext_text, escape_font_path, format_time};

/// A clip source registered with the engine under `name` before execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInput {
    pub name: String,
    pub source: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Look of the caption box drawn by [`Instruction::DrawText`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_size: u32,
    pub font_file: Option<PathBuf>,
}

/// One step of the compiled media program.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Select `window` from input `input`, rebase it to zero and normalize the
    /// frame, with a matching audio trim.
    TrimClip {
        input: usize,
        window: TimeWindow,
        width: u32,
        height: u32,
        video_out: String,
        audio_out: String,
    },
    /// Join the per-clip pairs in order into one video and one audio stream.
    Concat {
        pairs: Vec<(String, String)>,
        video_out: String,
        audio_out: String,
    },
    /// Draw `text` onto `video_in` while the composed clock is inside `window`.
    DrawText {
        video_in: String,
        video_out: String,
        text: String,
        window: TimeWindow,
        position: OverlayPosition,
        style: TextStyle,
    },
    /// Route the final streams to the program output.
    MapOutput { video: String, audio: String },
}

impl Instruction {
    /// Filtergraph fragments for this instruction; empty for output mapping.
    pub fn filters(&self) -> Vec<String> {
        match self {
            Instruction::TrimClip {
                input,
                window,
                width,
                height,
                video_out,
                audio_out,
            } => vec![
                format!(
                    "[{input}:v]trim=start={start}:end={end},setpts=PTS-STARTPTS,scale={width}:{height}:force_original_aspect_ratio=decrease,pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black,setsar=1[{video_out}]",
                    start = format_time(window.start),
                    end = format_time(window.end),
                ),
                format!(
                    "[{input}:a]atrim=start={start}:end={end},asetpts=PTS-STARTPTS,aformat=sample_rates=48000:channel_layouts=stereo[{audio_out}]",
                    start = format_time(window.start),
                    end = format_time(window.end),
                ),
            ],
            Instruction::Concat {
                pairs,
                video_out,
                audio_out,
            } => {
                let inputs = pairs
                    .iter()
                    .map(|(v, a)| format!("[{v}][{a}]"))
                    .collect::<String>();
                vec![format!(
                    "{inputs}concat=n={count}:v=1:a=1[{video_out}][{audio_out}]",
                    count = pairs.len(),
                )]
            }
            Instruction::DrawText {
                video_in,
                video_out,
                text,
                window,
                position,
                style,
            } => {
                let font = style
                    .font_file
                    .as_ref()
                    .map(|path| format!("fontfile={}:", escape_font_path(path)))
                    .unwrap_or_default();
                vec![format!(
                    "[{video_in}]drawtext={font}text={text}:x=(w-text_w)/2:y={y}:fontsize={size}:fontcolor=white:box=1:boxcolor=black@0.5:boxborderw=5:enable='between(t,{start},{end})'[{video_out}]",
                    text = escape_drawtext_text(text),
                    y = vertical_expression(*position),
                    size = style.font_size,
                    start = format_time(window.start),
                    end = format_time(window.end),
                )]
            }
            Instruction::MapOutput { .. } => Vec::new(),
        }
    }
}

fn vertical_expression(position: OverlayPosition) -> &'static str {
    match position {
        OverlayPosition::Top => "20",
        OverlayPosition::Center => "(h-text_h)/2",
        OverlayPosition::Bottom => "h-text_h-20",
    }
}

/// Ordered media program compiled from one timeline snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub inputs: Vec<ProgramInput>,
    pub instructions: Vec<Instruction>,
    pub output_name: String,
    pub encoding: EncodingProfile,
    /// Length of the composed timeline after trims were clamped.
    pub composed_duration: f64,
}

impl CompiledProgram {
    pub fn filter_complex(&self) -> String {
        let mut chain = FilterChain::new();
        for instruction in &self.instructions {
            chain.extend(instruction.filters());
        }
        chain.join()
    }

    fn output_mapping(&self) -> Option<(&str, &str)> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::MapOutput { video, audio } => Some((video.as_str(), audio.as_str())),
            _ => None,
        })
    }

    /// Render to an ffmpeg argument list, resolved relative to the engine's
    /// working directory.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.name.clone());
        }

        args.push("-filter_complex".to_string());
        args.push(self.filter_complex());

        if let Some((video, audio)) = self.output_mapping() {
            args.push("-map".to_string());
            args.push(format!("[{video}]"));
            args.push("-map".to_string());
            args.push(format!("[{audio}]"));
        }

        self.encoding.push_to(&mut args);
        args.push(self.output_name.clone());
        args
    }
}
