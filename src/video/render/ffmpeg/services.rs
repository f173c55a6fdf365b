use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::compiler::CompiledProgram;
use crate::ui::prelude::{Level, emit};
use crate::video::support::ffmpeg::parse_ffmpeg_progress;

/// Receives the number of composed-timeline seconds processed so far.
pub type ProgressListener = Box<dyn FnMut(f64) + Send>;

/// Media-processing engine that runs a [`CompiledProgram`].
///
/// Inputs are registered by name before [`MediaEngine::execute`]; the output
/// is only readable after a successful execution.
#[async_trait]
pub trait MediaEngine: Send {
    async fn load(&mut self) -> Result<()>;

    async fn register_file(&mut self, name: &str, bytes: Bytes) -> Result<()>;

    fn set_progress_listener(&mut self, listener: Option<ProgressListener>);

    async fn execute(&mut self, program: &CompiledProgram) -> Result<()>;

    async fn read_output(&mut self, name: &str) -> Result<Bytes>;
}

/// Runs ffmpeg in a private scratch directory that is removed on drop.
#[derive(Default)]
pub struct FfmpegEngine {
    workdir: Option<tempfile::TempDir>,
    listener: Option<ProgressListener>,
    verbose: bool,
}

impl FfmpegEngine {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    fn workdir(&self) -> Result<&Path> {
        self.workdir
            .as_ref()
            .map(|dir| dir.path())
            .context("Media engine used before load()")
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let path = Path::new(name);
        if path.components().count() != 1 || path.is_absolute() {
            bail!("Invalid engine file name {name:?}");
        }
        Ok(self.workdir()?.join(path))
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn load(&mut self) -> Result<()> {
        if self.workdir.is_some() {
            return Ok(());
        }
        which::which("ffmpeg").context("ffmpeg not found on PATH; install ffmpeg to render")?;
        let dir = tempfile::Builder::new()
            .prefix("vidstory-render-")
            .tempdir()
            .context("Failed to create render scratch directory")?;
        emit(
            Level::Debug,
            "video.render.engine",
            &format!("Render scratch directory: {}", dir.path().display()),
            None,
        );
        self.workdir = Some(dir);
        Ok(())
    }

    async fn register_file(&mut self, name: &str, bytes: Bytes) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to stage {name} for rendering"))
    }

    fn set_progress_listener(&mut self, listener: Option<ProgressListener>) {
        self.listener = listener;
    }

    async fn execute(&mut self, program: &CompiledProgram) -> Result<()> {
        let workdir = self.workdir()?.to_path_buf();
        let args = program.to_ffmpeg_args();

        emit(
            Level::Debug,
            "video.render.ffmpeg",
            &format!("ffmpeg -y {}", args.join(" ")),
            None,
        );

        let mut child = Command::new("ffmpeg")
            .arg("-y")
            .args(&args)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        let stderr = child
            .stderr
            .take()
            .context("Failed to capture ffmpeg stderr")?;

        let mut log = StderrLog::default();
        let verbose = self.verbose;
        let listener = &mut self.listener;
        let read_result = read_ffmpeg_stderr(stderr, |line| {
            if verbose {
                eprintln!("{line}");
            }
            log.record(line);
            if let (Some(listener), Some(elapsed)) = (listener.as_mut(), parse_ffmpeg_progress(line))
            {
                listener(elapsed);
            }
        })
        .await;

        let status = child.wait().await.context("Failed to wait for ffmpeg")?;
        read_result?;

        if !status.success() {
            bail!(
                "ffmpeg exited with status {:?}: {}",
                status.code(),
                log.summary()
            );
        }

        Ok(())
    }

    async fn read_output(&mut self, name: &str) -> Result<Bytes> {
        let path = self.resolve(name)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Render finished but {name} was not produced"))?;
        Ok(Bytes::from(bytes))
    }
}

#[derive(Default)]
struct StderrLog {
    last_line: String,
    error_lines: Vec<String>,
}

impl StderrLog {
    fn record(&mut self, line: &str) {
        self.last_line = line.to_string();
        if line.contains("error") || line.contains("Error") || line.contains("ERROR") {
            self.error_lines.push(line.to_string());
        }
    }

    fn summary(&self) -> String {
        if self.error_lines.is_empty() {
            self.last_line.trim().to_string()
        } else {
            self.error_lines.join("\n").trim().to_string()
        }
    }
}

/// Split ffmpeg's stderr on both `\r` (status updates) and `\n`.
async fn read_ffmpeg_stderr<R, F>(mut stderr: R, mut on_line: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut buffer = [0u8; 4096];
    let mut accumulated = String::new();

    loop {
        let bytes_read = stderr
            .read(&mut buffer)
            .await
            .context("Failed to read ffmpeg stderr")?;
        if bytes_read == 0 {
            break;
        }

        accumulated.push_str(&String::from_utf8_lossy(&buffer[..bytes_read]));

        while let Some(pos) = accumulated.find(['\r', '\n']) {
            let line = accumulated[..pos].to_string();
            accumulated.drain(..=pos);
            if !line.is_empty() {
                on_line(&line);
            }
        }
    }

    if !accumulated.is_empty() {
        on_line(&accumulated);
    }

    Ok(())
}

/// Opens a finished render in an external player.
#[async_trait]
pub trait PreviewPlayer: Send + Sync {
    async fn play(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MpvPreviewRunner;

impl MpvPreviewRunner {
    pub fn is_available() -> bool {
        which::which("mpv").is_ok()
    }
}

#[async_trait]
impl PreviewPlayer for MpvPreviewRunner {
    async fn play(&self, path: &Path) -> Result<()> {
        let status = Command::new("mpv")
            .arg("--force-window=immediate")
            .arg("--keep-open=no")
            .arg(path)
            .status()
            .await
            .context("Failed to spawn mpv. Install mpv to preview renders.")?;

        if !status.success() {
            bail!("mpv exited with status {:?}", status.code());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stderr_is_split_on_carriage_returns() {
        let input: &[u8] = b"Input #0\nframe=1 time=00:00:01.00 bitrate\rframe=2 time=00:00:02.50 bitrate\rdone";
        let mut lines = Vec::new();
        read_ffmpeg_stderr(input, |line| lines.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(
            lines,
            vec![
                "Input #0",
                "frame=1 time=00:00:01.00 bitrate",
                "frame=2 time=00:00:02.50 bitrate",
                "done",
            ]
        );
    }

    #[test]
    fn stderr_log_prefers_error_lines() {
        let mut log = StderrLog::default();
        log.record("frame=10");
        assert_eq!(log.summary(), "frame=10");
        log.record("Error opening input0.mp4");
        log.record("Conversion failed!");
        assert_eq!(log.summary(), "Error opening input0.mp4");
    }

    #[test]
    fn file_names_cannot_escape_workdir() {
        let mut engine = FfmpegEngine::default();
        assert!(engine.resolve("input0.mp4").is_err());
        engine.workdir = Some(tempfile::tempdir().unwrap());
        assert!(engine.resolve("input0.mp4").is_ok());
        assert!(engine.resolve("../escape.mp4").is_err());
        assert!(engine.resolve("/tmp/abs.mp4").is_err());
    }

    #[tokio::test]
    async fn registered_files_are_readable() {
        let mut engine = FfmpegEngine::default();
        engine.workdir = Some(tempfile::tempdir().unwrap());
        engine
            .register_file("output.mp4", Bytes::from_static(b"data"))
            .await
            .unwrap();
        assert_eq!(
            engine.read_output("output.mp4").await.unwrap(),
            Bytes::from_static(b"data")
        );
        assert!(engine.read_output("missing.mp4").await.is_err());
    }
}
