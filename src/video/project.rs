use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::render::RenderedVideo;
use super::timeline::Timeline;
use crate::ui::prelude::{Level, emit};

pub const PROJECT_FILE_NAME: &str = "vidstory.json";
const CLIPS_DIR: &str = "clips";
const RENDERS_DIR: &str = "renders";
const THUMBNAILS_DIR: &str = "thumbnails";
const PROJECT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProjectFile {
    version: u32,
    #[serde(default)]
    timeline: Timeline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cached_render: Option<PathBuf>,
}

/// A project directory: the persisted timeline plus its media folders.
#[derive(Debug)]
pub struct Project {
    dir: PathBuf,
    timeline: Timeline,
    cached_render: Option<PathBuf>,
    dirty: bool,
}

impl Project {
    /// Open the project in `dir`, starting an empty one if no project file exists.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(PROJECT_FILE_NAME);

        if !path.exists() {
            return Ok(Self {
                dir,
                timeline: Timeline::new(),
                cached_render: None,
                dirty: false,
            });
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading project file {}", path.display()))?;
        let file: ProjectFile = serde_json::from_str(&contents)
            .with_context(|| format!("parsing project file {}", path.display()))?;
        if file.version > PROJECT_FORMAT_VERSION {
            bail!(
                "{} was written by a newer vidstory (format {}); please upgrade",
                path.display(),
                file.version
            );
        }

        Ok(Self {
            dir,
            timeline: file.timeline,
            cached_render: file.cached_render.filter(|p| p.exists()),
            dirty: false,
        })
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(PROJECT_FILE_NAME)
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.dir.join(CLIPS_DIR)
    }

    pub fn renders_dir(&self) -> PathBuf {
        self.dir.join(RENDERS_DIR)
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.dir.join(THUMBNAILS_DIR)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Mutable access marks the project dirty; membership edits should also
    /// call [`Project::invalidate_render`].
    pub fn timeline_mut(&mut self) -> &mut Timeline {
        self.dirty = true;
        &mut self.timeline
    }

    pub fn cached_render(&self) -> Option<&Path> {
        self.cached_render.as_deref()
    }

    /// Drop the cached render; it no longer matches the timeline.
    pub fn invalidate_render(&mut self) {
        if let Some(path) = self.cached_render.take() {
            self.dirty = true;
            match fs::remove_file(&path) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => emit(
                    Level::Warn,
                    "video.project.render_cleanup",
                    &format!("Could not delete stale render {}: {err}", path.display()),
                    None,
                ),
                _ => {}
            }
        }
    }

    /// Store a finished render and make it the cached render.
    pub fn store_render(&mut self, rendered: &RenderedVideo) -> Result<PathBuf> {
        let dir = self.renders_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating renders directory {}", dir.display()))?;

        let path = dir.join(format!(
            "render-{}.mp4",
            chrono::Local::now().format("%Y%m%d-%H%M%S%.3f")
        ));
        fs::write(&path, &rendered.bytes)
            .with_context(|| format!("writing render to {}", path.display()))?;

        self.invalidate_render();
        self.cached_render = Some(path.clone());
        self.dirty = true;
        Ok(path)
    }

    /// Save if anything changed.
    pub fn persist(&mut self) -> Result<()> {
        if self.dirty {
            self.save()?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Write the project file atomically (temp file in the same directory,
    /// then rename).
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating project directory {}", self.dir.display()))?;

        let file = ProjectFile {
            version: PROJECT_FORMAT_VERSION,
            timeline: self.timeline.clone(),
            cached_render: self.cached_render.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("serializing project")?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("creating temporary project file")?;
        tmp.write_all(json.as_bytes())
            .context("writing temporary project file")?;
        tmp.as_file().sync_all().context("flushing project file")?;

        let path = self.file_path();
        tmp.persist(&path)
            .with_context(|| format!("saving project file {}", path.display()))?;
        Ok(())
    }

    /// Claim `activity` (e.g. "render") for this project until the guard drops.
    ///
    /// A second claim while the first is held is rejected, so only one render
    /// and one generation can be in flight per project. A lock left behind by
    /// a process that no longer exists is reclaimed.
    pub fn lock(&self, activity: &str) -> Result<ActivityLock> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating project directory {}", self.dir.display()))?;
        let path = self.dir.join(format!(".vidstory-{activity}.lock"));

        if let Some(pid) = stale_lock_owner(&path) {
            emit(
                Level::Debug,
                "video.project.stale_lock",
                &format!("Reclaiming {activity} lock left by exited process {pid}"),
                None,
            );
            let _ = fs::remove_file(&path);
        }

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(ActivityLock { path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => bail!(
                "A {activity} is already in progress for this project (remove {} if it is stale)",
                path.display()
            ),
            Err(err) => {
                Err(err).with_context(|| format!("creating lock file {}", path.display()))
            }
        }
    }
}

/// PID recorded in a lock file whose process has exited.
fn stale_lock_owner(path: &Path) -> Option<u32> {
    let pid = fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()?;
    let alive = Path::new(&format!("/proc/{pid}")).exists();
    (!alive).then_some(pid)
}

#[derive(Debug)]
pub struct ActivityLock {
    path: PathBuf,
}

impl Drop for ActivityLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
