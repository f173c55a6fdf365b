use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

use super::generation::AspectRatio;
use super::seo::{VideoCategory, VideoLanguage};
use super::timeline::{ClipId, OverlayId, OverlayPosition};

#[derive(Subcommand, Debug, Clone)]
pub enum VideoCommands {
    /// Generate a new clip from a prompt and a seed image
    Generate(GenerateArgs),
    /// List clips and overlays on the timeline
    Clips,
    /// Append an existing video file as a clip
    Import(ImportArgs),
    /// Change the trim range of a clip
    Trim(TrimArgs),
    /// Remove a clip from the timeline
    Remove(RemoveArgs),
    /// Manage text overlays
    #[command(subcommand)]
    Overlay(OverlayCommands),
    /// Validate the timeline and report suspicious trims and overlays
    Check,
    /// Render the timeline into a single video
    Render(RenderArgs),
    /// Write titles, descriptions, tags and thumbnails for a story or video
    Seo(SeoArgs),
    /// Research search volume and competition for keywords around a topic
    Keywords {
        /// Topic to research
        topic: String,
    },
    /// Generate a single thumbnail image from a prompt
    Thumbnail(ThumbnailArgs),
    /// Show the effective configuration
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// What the clip should show
    pub prompt: String,

    /// Seed image (PNG, JPEG or WebP)
    #[arg(short = 'i', long, value_hint = ValueHint::FilePath)]
    pub image: PathBuf,

    /// Aspect ratio of the generated clip
    #[arg(short = 'a', long, value_enum, default_value_t = AspectRatio::Landscape)]
    pub aspect: AspectRatio,

    /// Use the slower, higher-quality model
    #[arg(long)]
    pub thinking: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Video file to append
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Display name (defaults to the file name)
    #[arg(short = 'n', long)]
    pub name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TrimArgs {
    /// Clip to trim (e.g. clip-2)
    pub clip: ClipId,

    /// New trim start in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub start: Option<f64>,

    /// New trim end in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub end: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Clip to remove (e.g. clip-2)
    pub clip: ClipId,
}

#[derive(Subcommand, Debug, Clone)]
pub enum OverlayCommands {
    /// Add a caption spanning the whole current timeline
    Add(OverlayAddArgs),
    /// Change an existing caption
    Set(OverlaySetArgs),
    /// Remove a caption
    Remove {
        /// Overlay to remove (e.g. overlay-1)
        overlay: OverlayId,
    },
}

#[derive(Args, Debug, Clone)]
pub struct OverlayAddArgs {
    /// Caption text
    pub text: String,

    /// Vertical placement
    #[arg(short = 'p', long, value_enum, default_value_t = OverlayPosition::Center)]
    pub position: OverlayPosition,
}

#[derive(Args, Debug, Clone)]
pub struct OverlaySetArgs {
    /// Overlay to change (e.g. overlay-1)
    pub overlay: OverlayId,

    /// New caption text
    #[arg(long)]
    pub text: Option<String>,

    /// Start time on the composed timeline, in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub start: Option<f64>,

    /// End time on the composed timeline, in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub end: Option<f64>,

    /// Vertical placement
    #[arg(short = 'p', long, value_enum)]
    pub position: Option<OverlayPosition>,
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Export the render to this path (defaults to the configured export name)
    #[arg(short = 'o', long = "out", value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,

    /// Overwrite an existing export file
    #[arg(long)]
    pub force: bool,

    /// Open the render in mpv when done
    #[arg(long)]
    pub preview: bool,

    /// Show the ffmpeg command that would be executed without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Show raw ffmpeg output instead of a progress bar
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SeoArgs {
    /// Story text or a short video idea
    #[arg(default_value = "")]
    pub text: String,

    /// Video to analyse instead of (or together with) the text
    #[arg(short = 'v', long, value_hint = ValueHint::FilePath)]
    pub video: Option<PathBuf>,

    /// Video category
    #[arg(short = 'c', long, value_enum, default_value_t = VideoCategory::Story)]
    pub category: VideoCategory,

    /// Output language
    #[arg(short = 'l', long, value_enum, default_value_t = VideoLanguage::Auto)]
    pub language: VideoLanguage,

    /// Use the slower reasoning model for text input
    #[arg(long)]
    pub thinking: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ThumbnailArgs {
    /// What the thumbnail should show
    pub prompt: String,

    /// Output file (defaults to a timestamped file under <project>/thumbnails)
    #[arg(short = 'o', long = "out", value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,
}
