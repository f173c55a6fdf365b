use anyhow::Result;

use crate::ui::prelude::{Level, emit};

use super::project::Project;
use super::timeline::Timeline;

pub fn handle_check(project: &Project) -> Result<()> {
    let timeline = project.timeline();

    emit(
        Level::Info,
        "video.check.counts",
        &format!(
            "Clips: {clips}, Overlays: {overlays}",
            clips = timeline.clips().len(),
            overlays = timeline.overlays().len(),
        ),
        None,
    );

    emit(
        Level::Info,
        "video.check.duration",
        &format!(
            "Composed duration: {}",
            format_duration(timeline.total_composed_duration())
        ),
        None,
    );

    if timeline.is_empty() {
        emit(
            Level::Warn,
            "video.check.empty",
            "The timeline has no clips; generate or import one before rendering",
            None,
        );
        return Ok(());
    }

    if report_timeline_warnings(timeline) == 0 {
        emit(
            Level::Success,
            "video.check.valid",
            &format!("{} is ready to render", project.file_path().display()),
            None,
        );
    }

    Ok(())
}

/// Warn about trims that will render as empty segments and overlays that
/// reach past the composed timeline. Returns the number of warnings.
pub(super) fn report_timeline_warnings(timeline: &Timeline) -> usize {
    let mut warnings = 0;

    for clip in timeline.inverted_clips() {
        warnings += 1;
        emit(
            Level::Warn,
            "video.check.inverted_trim",
            &format!(
                "{} ({}) has trim {:.2}s..{:.2}s; it will render as an empty segment",
                clip.id, clip.name, clip.trim_start, clip.trim_end
            ),
            None,
        );
    }

    for clip in timeline.clips() {
        if clip.trim_start < 0.0 || clip.trim_end > clip.duration() {
            warnings += 1;
            emit(
                Level::Warn,
                "video.check.trim_out_of_range",
                &format!(
                    "{} trim {:.2}s..{:.2}s exceeds its source (0..{:.2}s) and will be clamped",
                    clip.id,
                    clip.trim_start,
                    clip.trim_end,
                    clip.duration()
                ),
                None,
            );
        }
    }

    let total = timeline.total_composed_duration();
    for overlay in timeline.stale_overlays() {
        warnings += 1;
        emit(
            Level::Warn,
            "video.check.stale_overlay",
            &format!(
                "{} spans {:.2}s..{:.2}s but the timeline is {:.2}s long",
                overlay.id, overlay.start_time, overlay.end_time, total
            ),
            None,
        );
    }

    warnings
}

pub(super) fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.round().max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
