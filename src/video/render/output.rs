use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::ffmpeg::services::{MpvPreviewRunner, PreviewPlayer};
use crate::ui::prelude::{Level, emit};

/// Copy a stored render to `destination`.
pub(super) fn export_render(render: &Path, destination: &Path, force: bool) -> Result<PathBuf> {
    if destination == render {
        bail!(
            "Export path {} would overwrite the cached render",
            destination.display()
        );
    }

    if destination.exists() {
        if force {
            fs::remove_file(destination).with_context(|| {
                format!(
                    "Failed to remove existing export {} before overwrite",
                    destination.display()
                )
            })?;
        } else {
            bail!(
                "Output file {} already exists. Use --force to overwrite.",
                destination.display()
            );
        }
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    fs::copy(render, destination).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            render.display(),
            destination.display()
        )
    })?;

    Ok(destination.to_path_buf())
}

/// Play the render if a player is installed; otherwise just say where it is.
pub(super) async fn preview_render(render: &Path) -> Result<()> {
    if !MpvPreviewRunner::is_available() {
        emit(
            Level::Warn,
            "video.render.preview.unavailable",
            &format!(
                "mpv is not installed; open {} in any video player",
                render.display()
            ),
            None,
        );
        return Ok(());
    }

    preview_with(&MpvPreviewRunner, render).await
}

async fn preview_with(player: &dyn PreviewPlayer, render: &Path) -> Result<()> {
    emit(
        Level::Info,
        "video.render.preview",
        &format!("Previewing {}", render.display()),
        None,
    );
    player.play(render).await
}
