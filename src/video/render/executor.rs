use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::try_join_all;

use super::ffmpeg::compiler::CompiledProgram;
use super::ffmpeg::services::MediaEngine;
use super::progress::ProgressReporter;
use crate::ui::prelude::{Level, emit};
use crate::video::error::{StudioError, classify_api_error};
use crate::video::support::deadline::with_deadline;
use crate::video::support::fetch::MediaFetcher;
use crate::video::timeline::SourceLocation;

/// Output of a successful render, held in memory until it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVideo {
    pub bytes: Bytes,
    pub duration: f64,
}

pub type ProgressSink = Arc<dyn Fn(f64) + Send + Sync>;

/// Runs one compiled program against a media engine.
///
/// Callers must not start a second render while one is running.
pub struct RenderExecutor {
    fetcher: Arc<dyn MediaFetcher>,
    timeout: Option<Duration>,
}

impl RenderExecutor {
    pub fn new(fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            fetcher,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn render<E>(
        &self,
        engine: &mut E,
        program: &CompiledProgram,
        on_progress: ProgressSink,
    ) -> Result<RenderedVideo, StudioError>
    where
        E: MediaEngine + ?Sized,
    {
        let result = with_deadline(
            self.timeout,
            "Rendering",
            self.run(engine, program, on_progress.clone()),
        )
        .await;

        // The listener must not outlive the render, whatever the outcome.
        engine.set_progress_listener(None);

        match result {
            Ok(bytes) => {
                on_progress(1.0);
                Ok(RenderedVideo {
                    bytes,
                    duration: program.composed_duration,
                })
            }
            Err(err) => {
                emit(
                    Level::Debug,
                    "video.render.abort",
                    &format!("Render aborted: {err}"),
                    None,
                );
                Err(err)
            }
        }
    }

    /// [`Self::render`] that gives up as soon as `shutdown` resolves. Dropping
    /// the in-flight render stops the engine, and nothing is returned.
    pub async fn render_until<E, F>(
        &self,
        engine: &mut E,
        program: &CompiledProgram,
        on_progress: ProgressSink,
        shutdown: F,
    ) -> Result<RenderedVideo, StudioError>
    where
        E: MediaEngine + ?Sized,
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            result = self.render(engine, program, on_progress) => Some(result),
            _ = shutdown => None,
        };

        match outcome {
            Some(result) => result,
            None => {
                engine.set_progress_listener(None);
                emit(
                    Level::Debug,
                    "video.render.abort",
                    "Render cancelled before completion",
                    None,
                );
                Err(StudioError::Cancelled("Render"))
            }
        }
    }

    async fn run<E>(
        &self,
        engine: &mut E,
        program: &CompiledProgram,
        on_progress: ProgressSink,
    ) -> Result<Bytes, StudioError>
    where
        E: MediaEngine + ?Sized,
    {
        engine
            .load()
            .await
            .map_err(|err| StudioError::Render(format!("{err:#}")))?;

        let sources = try_join_all(program.inputs.iter().enumerate().map(|(idx, input)| {
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                fetcher.fetch(&input.source).await.map_err(|err| {
                    let reason = match &input.source {
                        SourceLocation::Remote(_) => {
                            classify_api_error("downloading clip media", &format!("{err:#}"))
                        }
                        _ => format!("{err:#}"),
                    };
                    StudioError::Render(format!("Clip {} ({}): {reason}", idx + 1, input.source))
                })
            }
        }))
        .await?;

        for (input, bytes) in program.inputs.iter().zip(sources) {
            engine
                .register_file(&input.name, bytes)
                .await
                .map_err(|err| StudioError::Render(format!("{err:#}")))?;
        }

        let mut reporter = ProgressReporter::new(program.composed_duration);
        engine.set_progress_listener(Some(Box::new(move |elapsed| {
            on_progress(reporter.update(elapsed));
        })));

        emit(
            Level::Info,
            "video.render.execute",
            &format!(
                "Rendering {} clip(s), {:.1}s of composed video",
                program.inputs.len(),
                program.composed_duration
            ),
            None,
        );

        engine
            .execute(program)
            .await
            .map_err(|err| StudioError::Render(format!("{err:#}")))?;

        engine
            .read_output(&program.output_name)
            .await
            .map_err(|err| StudioError::Render(format!("{err:#}")))
    }
}
