mod executor;
pub mod ffmpeg;
mod output;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::common::progress::{create_fraction_bar, set_fraction};
use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format};

pub use self::executor::{ProgressSink, RenderExecutor, RenderedVideo};
use self::ffmpeg::compiler::{CompiledProgram, FfmpegCompiler};
use self::ffmpeg::services::FfmpegEngine;
use self::output::{export_render, preview_render};
use super::check::report_timeline_warnings;
use super::cli::RenderArgs;
use super::config::StudioConfig;
use super::project::Project;
use super::support::fetch::HttpMediaFetcher;

fn log_event(level: Level, code: &str, message: impl Into<String>) {
    emit(level, code, &message.into(), None);
}

pub async fn handle_render(
    args: RenderArgs,
    project: &mut Project,
    config: &StudioConfig,
) -> Result<Option<PathBuf>> {
    let _lock = project.lock("render")?;

    log_event(
        Level::Info,
        "video.render.start",
        format!(
            "Compiling {} clip(s) and {} overlay(s)",
            project.timeline().clips().len(),
            project.timeline().overlays().len()
        ),
    );
    report_timeline_warnings(project.timeline());

    // Snapshot: edits made after this point do not affect the program.
    let program = FfmpegCompiler::from_config(config).compile(project.timeline())?;

    if args.dry_run {
        print_command(&program);
        log_event(
            Level::Info,
            "video.render.dry_run",
            "Dry run completed - ffmpeg command printed above",
        );
        return Ok(None);
    }

    let fetcher = HttpMediaFetcher::new(reqwest::Client::new()).with_api_key(config.resolve_api_key());
    let executor = RenderExecutor::new(Arc::new(fetcher)).with_timeout(config.render_timeout());
    let mut engine = FfmpegEngine::new(args.verbose);

    let pb = if args.verbose {
        indicatif::ProgressBar::hidden()
    } else {
        create_fraction_bar("rendering")
    };
    let sink = progress_sink(pb.clone());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let rendered = match executor
        .render_until(&mut engine, &program, sink, shutdown)
        .await
    {
        Ok(rendered) => {
            pb.finish_and_clear();
            rendered
        }
        Err(err) => {
            pb.abandon();
            return Err(err).context("Render aborted; no output was written");
        }
    };
    drop(engine);

    let stored = project.store_render(&rendered)?;
    project.persist()?;

    let destination = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.export_file_name));
    let exported = export_render(&stored, &destination, args.force)?;

    emit(
        Level::Success,
        "video.render.done",
        &format!(
            "Rendered {:.1}s to {}",
            rendered.duration,
            exported.display()
        ),
        Some(serde_json::json!({
            "output": exported.display().to_string(),
            "cached_render": stored.display().to_string(),
            "duration": rendered.duration,
        })),
    );

    if args.preview {
        preview_render(&exported).await?;
    }

    Ok(Some(exported))
}

fn progress_sink(pb: indicatif::ProgressBar) -> ProgressSink {
    let json = get_output_format() == OutputFormat::Json;
    Arc::new(move |fraction| {
        set_fraction(&pb, fraction);
        if json {
            emit(
                Level::Info,
                "video.render.progress",
                &format!("{:.0}%", fraction * 100.0),
                Some(serde_json::json!({ "fraction": fraction })),
            );
        }
    })
}

fn print_command(program: &CompiledProgram) {
    let args = program.to_ffmpeg_args();
    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "video.render.command",
            "ffmpeg command that would be executed",
            Some(serde_json::json!({
                "program": "ffmpeg",
                "args": args,
                "inputs": program
                    .inputs
                    .iter()
                    .map(|input| serde_json::json!({
                        "name": input.name,
                        "source": input.source.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            })),
        );
        return;
    }

    println!("ffmpeg command that would be executed:");
    for input in &program.inputs {
        println!("  # {} <- {}", input.name, input.source);
    }
    println!("ffmpeg -y {}", args.join(" "));
}
