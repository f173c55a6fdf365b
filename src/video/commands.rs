use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use crate::common::paths;
use crate::common::progress::{create_spinner, finish_spinner_with_success};
use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format};

use super::check::{format_duration, handle_check};
use super::cli::{
    GenerateArgs, ImportArgs, OverlayAddArgs, OverlayCommands, OverlaySetArgs, SeoArgs,
    ThumbnailArgs, TrimArgs, VideoCommands,
};
use super::config::StudioConfig;
use super::error::StudioError;
use super::generation::gemini::GeminiVideoService;
use super::generation::{GenerationOrchestrator, GenerationRequest, QualityMode, SeedImage};
use super::project::Project;
use super::render::handle_render;
use super::seo::gemini::GeminiContentService;
use super::seo::{
    KeywordResearch, SeoPack, SeoRequest, VideoAttachment, generate_seo_pack,
    generate_thumbnail, research_keywords,
};
use super::support::fetch::HttpMediaFetcher;
use super::support::ffmpeg::{FfprobeProbe, MediaProbe};
use super::timeline::{Clip, ClipId, OverlayUpdate, SourceLocation, Timeline, TrimBound};

pub async fn handle_video_command(command: VideoCommands, project_dir: &Path) -> Result<()> {
    match command {
        VideoCommands::Generate(args) => handle_generate(args, project_dir).await,
        VideoCommands::Clips => handle_clips(&Project::open(project_dir)?),
        VideoCommands::Import(args) => handle_import(args, project_dir).await,
        VideoCommands::Trim(args) => edit_timeline(project_dir, |timeline| apply_trim(timeline, &args)),
        VideoCommands::Remove(args) => remove_clip(args.clip, project_dir),
        VideoCommands::Overlay(command) => handle_overlay(command, project_dir),
        VideoCommands::Check => handle_check(&Project::open(project_dir)?),
        VideoCommands::Render(args) => {
            let config = StudioConfig::load()?;
            let mut project = Project::open(project_dir)?;
            handle_render(args, &mut project, &config).await.map(|_| ())
        }
        VideoCommands::Seo(args) => handle_seo(args, project_dir).await,
        VideoCommands::Keywords { topic } => handle_keywords(&topic).await,
        VideoCommands::Thumbnail(args) => handle_thumbnail(args, project_dir).await,
        VideoCommands::Config => handle_config(),
    }
}

fn require_api_key(config: &StudioConfig) -> Result<String> {
    match config.resolve_api_key() {
        Some(key) => Ok(key),
        None => bail!(
            "No API key configured. Set GEMINI_API_KEY or api_key in {}",
            paths::config_file_path()?.display()
        ),
    }
}

fn warn_on_invalid_key(err: &StudioError) {
    if err.is_invalid_api_key() {
        emit(
            Level::Warn,
            "video.api_key",
            "Check GEMINI_API_KEY or api_key in your vidstory config",
            None,
        );
    }
}

/// Load the project, apply `edit`, and save. Every successful edit drops the
/// cached render.
fn edit_timeline<F>(project_dir: &Path, edit: F) -> Result<()>
where
    F: FnOnce(&mut Timeline) -> Result<(), StudioError>,
{
    let mut project = Project::open(project_dir)?;
    edit(project.timeline_mut())?;
    project.invalidate_render();
    project.persist()
}

/// Owned media is deleted only after the shortened timeline has been saved.
fn remove_clip(id: ClipId, project_dir: &Path) -> Result<()> {
    let mut project = Project::open(project_dir)?;
    remove_clip_from(&mut project, id)
}

fn remove_clip_from(project: &mut Project, id: ClipId) -> Result<()> {
    let clip = project.timeline_mut().remove_clip(id)?;
    project.invalidate_render();
    project.persist()?;
    clip.release_media();

    emit(
        Level::Success,
        "video.timeline.clip_removed",
        &format!(
            "Removed {} ({}); composed duration is now {:.2}s",
            clip.id,
            clip.name,
            project.timeline().total_composed_duration()
        ),
        None,
    );
    Ok(())
}

fn apply_trim(timeline: &mut Timeline, args: &TrimArgs) -> Result<(), StudioError> {
    if args.start.is_none() && args.end.is_none() {
        return Err(StudioError::Validation(
            "Pass --start and/or --end to change the trim".to_string(),
        ));
    }
    if let Some(start) = args.start {
        timeline.set_trim(args.clip, TrimBound::Start, start)?;
    }
    if let Some(end) = args.end {
        timeline.set_trim(args.clip, TrimBound::End, end)?;
    }

    if let Some(clip) = timeline.clip(args.clip) {
        let level = if clip.is_inverted() {
            Level::Warn
        } else {
            Level::Success
        };
        emit(
            level,
            "video.timeline.trimmed",
            &format!(
                "{} now plays {:.2}s..{:.2}s (composed duration {:.2}s)",
                clip.id,
                clip.trim_start,
                clip.trim_end,
                timeline.total_composed_duration()
            ),
            None,
        );
    }
    Ok(())
}

fn handle_overlay(command: OverlayCommands, project_dir: &Path) -> Result<()> {
    match command {
        OverlayCommands::Add(OverlayAddArgs { text, position }) => {
            edit_timeline(project_dir, |timeline| {
                let id = timeline.add_overlay(&text, position)?;
                emit(
                    Level::Success,
                    "video.overlay.added",
                    &format!(
                        "Added {id} at {position}, 0.00s..{:.2}s",
                        timeline.total_composed_duration()
                    ),
                    None,
                );
                Ok(())
            })
        }
        OverlayCommands::Set(args) => edit_timeline(project_dir, |timeline| apply_overlay_set(timeline, args)),
        OverlayCommands::Remove { overlay } => edit_timeline(project_dir, |timeline| {
            timeline.remove_overlay(overlay)?;
            emit(
                Level::Success,
                "video.overlay.removed",
                &format!("Removed {overlay}"),
                None,
            );
            Ok(())
        }),
    }
}

fn apply_overlay_set(timeline: &mut Timeline, args: OverlaySetArgs) -> Result<(), StudioError> {
    let mut updates = Vec::new();
    if let Some(text) = args.text {
        updates.push(OverlayUpdate::Text(text));
    }
    if let Some(start) = args.start {
        updates.push(OverlayUpdate::StartTime(start));
    }
    if let Some(end) = args.end {
        updates.push(OverlayUpdate::EndTime(end));
    }
    if let Some(position) = args.position {
        updates.push(OverlayUpdate::Position(position));
    }
    if updates.is_empty() {
        return Err(StudioError::Validation(
            "Nothing to change; pass --text, --start, --end or --position".to_string(),
        ));
    }

    for update in updates {
        timeline.update_overlay(args.overlay, update)?;
    }
    emit(
        Level::Success,
        "video.overlay.updated",
        &format!("Updated {}", args.overlay),
        None,
    );
    Ok(())
}

async fn handle_generate(args: GenerateArgs, project_dir: &Path) -> Result<()> {
    let config = StudioConfig::load()?;
    let api_key = require_api_key(&config)?;

    let project = Project::open(project_dir)?;
    let _lock = project.lock("generation")?;

    let request = GenerationRequest {
        prompt: args.prompt,
        seed_image: Some(SeedImage::from_path(&args.image).await?),
        aspect_ratio: args.aspect,
        quality: if args.thinking {
            QualityMode::Thinking
        } else {
            QualityMode::Fast
        },
    };

    let client = reqwest::Client::new();
    let service = GeminiVideoService::new(client.clone(), &config.api_base_url, &api_key);
    let fetcher = HttpMediaFetcher::new(client).with_api_key(Some(api_key));
    let mut orchestrator = GenerationOrchestrator::new(
        Box::new(service),
        Arc::new(fetcher),
        Arc::new(FfprobeProbe),
        project.clips_dir(),
        config.poll_interval(),
    )
    .with_poll_timeout(config.poll_timeout());

    // Polling can take minutes; materialize into a scratch timeline and merge
    // into a freshly loaded project so edits made meanwhile are kept.
    let mut scratch = Timeline::new();
    let pb = create_spinner("Generating clip...".to_string());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let result = orchestrator
        .generate_until(request, &mut scratch, shutdown)
        .await;

    let clip_id = match result {
        Ok(id) => id,
        Err(err) => {
            pb.finish_and_clear();
            warn_on_invalid_key(&err);
            return Err(err).context("Clip generation failed");
        }
    };

    let generated = scratch
        .remove_clip(clip_id)
        .context("Generated clip missing from timeline")?;
    let duration = generated.duration();
    let Clip { source, name, .. } = generated;

    let mut project = Project::open(project_dir)?;
    let id = project.timeline_mut().append_clip(source, &name, duration);
    project.invalidate_render();
    project.persist()?;

    finish_spinner_with_success(pb, format!("Added {id} \"{name}\" ({duration:.1}s)"));
    Ok(())
}

async fn handle_import(args: ImportArgs, project_dir: &Path) -> Result<()> {
    import_clip(args, project_dir, &FfprobeProbe).await
}

async fn import_clip(args: ImportArgs, project_dir: &Path, probe: &dyn MediaProbe) -> Result<()> {
    let path = std::fs::canonicalize(&args.file)
        .with_context(|| format!("Video file {} not found", args.file.display()))?;
    let duration = probe.duration_seconds(&path).await?;
    let name = args.name.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Imported clip".to_string())
    });

    let mut project = Project::open(project_dir)?;
    let id = project
        .timeline_mut()
        .append_clip(SourceLocation::File(path), &name, duration);
    project.invalidate_render();
    project.persist()?;

    emit(
        Level::Success,
        "video.timeline.clip_imported",
        &format!("Imported {id} \"{name}\" ({duration:.1}s)"),
        None,
    );
    Ok(())
}

fn handle_clips(project: &Project) -> Result<()> {
    let timeline = project.timeline();

    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "video.clips",
            &format!("{} clip(s)", timeline.clips().len()),
            Some(serde_json::json!({
                "timeline": timeline,
                "composed_duration": timeline.total_composed_duration(),
                "cached_render": project.cached_render(),
            })),
        );
        return Ok(());
    }

    if timeline.is_empty() {
        emit(
            Level::Info,
            "video.clips.empty",
            "No clips yet. Use `vidstory generate` or `vidstory import` to add one.",
            None,
        );
    } else {
        println!("{}", clips_table(timeline));
    }

    if !timeline.overlays().is_empty() {
        println!("{}", overlays_table(timeline));
    }

    emit(
        Level::Info,
        "video.clips.duration",
        &format!(
            "Composed duration: {} ({:.2}s)",
            format_duration(timeline.total_composed_duration()),
            timeline.total_composed_duration()
        ),
        None,
    );
    Ok(())
}

fn clips_table(timeline: &Timeline) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Id", "Name", "Trim", "Length", "Source"]);

    for (idx, clip) in timeline.clips().iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(clip.id),
            Cell::new(&clip.name),
            Cell::new(format!(
                "{:.2}s..{:.2}s of {:.2}s",
                clip.trim_start,
                clip.trim_end,
                clip.duration()
            )),
            Cell::new(format!("{:.2}s", clip.trimmed_length())),
            Cell::new(&clip.source),
        ]);
    }
    table
}

fn overlays_table(timeline: &Timeline) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Id", "Text", "Window", "Position"]);

    for overlay in timeline.overlays() {
        table.add_row(vec![
            Cell::new(overlay.id),
            Cell::new(&overlay.text),
            Cell::new(format!(
                "{:.2}s..{:.2}s",
                overlay.start_time, overlay.end_time
            )),
            Cell::new(overlay.position),
        ]);
    }
    table
}

async fn handle_seo(args: SeoArgs, project_dir: &Path) -> Result<()> {
    let config = StudioConfig::load()?;
    let api_key = require_api_key(&config)?;

    let video = match &args.video {
        Some(path) => Some(VideoAttachment::from_path(path).await?),
        None => None,
    };
    let request = SeoRequest {
        text: args.text,
        video,
        category: args.category,
        language: args.language,
        thinking: args.thinking,
    };

    let project = Project::open(project_dir)?;
    let service = GeminiContentService::new(reqwest::Client::new(), &config.api_base_url, &api_key);

    let pb = create_spinner("Writing SEO content and thumbnails...".to_string());
    let pack = match generate_seo_pack(&service, &request, &project.thumbnails_dir()).await {
        Ok(pack) => pack,
        Err(err) => {
            pb.finish_and_clear();
            warn_on_invalid_key(&err);
            return Err(err).context("SEO generation failed");
        }
    };
    let drawn = pack.thumbnail_ideas.iter().filter(|i| i.image.is_some()).count();
    finish_spinner_with_success(
        pb,
        format!(
            "SEO score {} with {drawn}/{} thumbnail(s)",
            pack.seo_score.score,
            pack.thumbnail_ideas.len()
        ),
    );

    print_seo_pack(&pack)
}

fn print_seo_pack(pack: &SeoPack) -> Result<()> {
    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "video.seo",
            &format!("SEO score {}", pack.seo_score.score),
            Some(serde_json::to_value(pack)?),
        );
        return Ok(());
    }

    if let Some(story) = pack.generated_story.as_deref().filter(|_| pack.is_idea) {
        println!("Story\n{story}\n");
    }
    println!(
        "Language: {} ({:.0}% confidence)\n",
        pack.language_detection.language,
        pack.language_detection.confidence * 100.0
    );
    println!("{}", seo_table(pack));
    println!(
        "Score {}/100: {}",
        pack.seo_score.score, pack.seo_score.justification
    );
    Ok(())
}

fn seo_table(pack: &SeoPack) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    for (n, title) in pack.seo_titles.iter().enumerate() {
        table.add_row(vec![Cell::new(format!("Title {}", n + 1)), Cell::new(title)]);
    }
    table.add_row(vec![
        Cell::new("Short description"),
        Cell::new(&pack.seo_description.short),
    ]);
    table.add_row(vec![
        Cell::new("Description"),
        Cell::new(&pack.seo_description.long),
    ]);
    table.add_row(vec![Cell::new("Tags"), Cell::new(pack.tags.join(", "))]);
    table.add_row(vec![Cell::new("Hashtags"), Cell::new(pack.hashtags.join(" "))]);
    for (n, idea) in pack.thumbnail_ideas.iter().enumerate() {
        let image = idea
            .image
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(no image)".to_string());
        table.add_row(vec![
            Cell::new(format!("Thumbnail {}", n + 1)),
            Cell::new(format!("{}\n{image}", idea.idea)),
        ]);
    }
    table
}

async fn handle_keywords(topic: &str) -> Result<()> {
    let config = StudioConfig::load()?;
    let api_key = require_api_key(&config)?;
    let service = GeminiContentService::new(reqwest::Client::new(), &config.api_base_url, &api_key);

    let pb = create_spinner(format!("Researching keywords for \"{topic}\"..."));
    let research = match research_keywords(&service, topic).await {
        Ok(research) => research,
        Err(err) => {
            pb.finish_and_clear();
            warn_on_invalid_key(&err);
            return Err(err).context("Keyword research failed");
        }
    };
    finish_spinner_with_success(
        pb,
        format!("Found {} keyword(s)", research.suggestions.len()),
    );

    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "video.keywords",
            &format!("{} keyword(s)", research.suggestions.len()),
            Some(serde_json::to_value(&research)?),
        );
        return Ok(());
    }

    if research.suggestions.is_empty() {
        emit(
            Level::Warn,
            "video.keywords.empty",
            "The model did not return a keyword table. Try a broader topic.",
            None,
        );
    } else {
        println!("{}", keywords_table(&research));
    }
    for source in &research.sources {
        println!("  {} <{}>", source.title, source.uri);
    }
    Ok(())
}

fn keywords_table(research: &KeywordResearch) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Keyword", "Volume", "Competition"]);
    for suggestion in &research.suggestions {
        table.add_row(vec![
            Cell::new(&suggestion.keyword),
            Cell::new(suggestion.volume),
            Cell::new(suggestion.competition),
        ]);
    }
    table
}

async fn handle_thumbnail(args: ThumbnailArgs, project_dir: &Path) -> Result<()> {
    let config = StudioConfig::load()?;
    let api_key = require_api_key(&config)?;
    let service = GeminiContentService::new(reqwest::Client::new(), &config.api_base_url, &api_key);

    let out = match args.out {
        Some(out) => out,
        None => Project::open(project_dir)?.thumbnails_dir().join(format!(
            "thumbnail-{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        )),
    };

    let pb = create_spinner("Generating thumbnail...".to_string());
    match generate_thumbnail(&service, &args.prompt, &out).await {
        Ok(path) => {
            finish_spinner_with_success(pb, format!("Saved {}", path.display()));
            Ok(())
        }
        Err(err) => {
            pb.finish_and_clear();
            warn_on_invalid_key(&err);
            Err(err).context("Thumbnail generation failed")
        }
    }
}

fn handle_config() -> Result<()> {
    let path = paths::config_file_path()?;
    let config = StudioConfig::load_from_path(&path)?;

    let mut shown = config.clone();
    shown.api_key = config.resolve_api_key().map(|_| "<set>".to_string());

    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "video.config",
            &path.display().to_string(),
            Some(serde_json::to_value(&shown)?),
        );
        return Ok(());
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&shown).context("serializing config")?);
    Ok(())
}
