//! Editing state for the clip assembler.
//!
//! The timeline holds an ordered clip sequence (insertion order is render
//! order) and an independent set of text overlays. Overlay times are measured
//! against the *composed* timeline, i.e. the concatenation of every clip's
//! trimmed range, whose length is [`Timeline::total_composed_duration`].
//!
//! The model deliberately does not correct anything after the fact:
//! inverted trims are stored as given and overlay bounds are never re-clamped
//! when clips are trimmed or removed. [`Timeline::inverted_clips`] and
//! [`Timeline::stale_overlays`] expose those cases so callers can warn.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::StudioError;
use crate::ui::prelude::{Level, emit};

const TIME_EPSILON: f64 = 1e-6;

macro_rules! timeline_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = StudioError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s
                    .trim()
                    .strip_prefix(concat!($prefix, "-"))
                    .unwrap_or(s.trim());
                digits.parse::<u64>().map($name).map_err(|_| {
                    StudioError::Validation(format!(
                        concat!("'{}' is not a valid ", $prefix, " id"),
                        s
                    ))
                })
            }
        }
    };
}

timeline_id!(ClipId, "clip");
timeline_id!(OverlayId, "overlay");

/// Where a clip's media bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum SourceLocation {
    /// Materialized by the generator and owned by the clip; deleted on removal.
    Owned(PathBuf),
    /// A user-supplied file, never deleted.
    File(PathBuf),
    /// Fetched over HTTP when rendering.
    Remote(String),
}

impl SourceLocation {
    /// Release the resource if the clip holds it exclusively.
    pub fn release(&self) -> io::Result<()> {
        match self {
            SourceLocation::Owned(path) => match std::fs::remove_file(path) {
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
            SourceLocation::File(_) | SourceLocation::Remote(_) => Ok(()),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, SourceLocation::Owned(_))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Owned(path) | SourceLocation::File(path) => {
                write!(f, "{}", path.display())
            }
            SourceLocation::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// One generated (or imported) video segment placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub source: SourceLocation,
    pub name: String,
    /// Total decodable length of the source, fixed at creation.
    duration: f64,
    pub trim_start: f64,
    pub trim_end: f64,
}

impl Clip {
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Length this clip contributes to the composed timeline (may be negative
    /// for an inverted trim).
    pub fn trimmed_length(&self) -> f64 {
        self.trim_end - self.trim_start
    }

    pub fn is_inverted(&self) -> bool {
        self.trim_start >= self.trim_end
    }

    /// Delete the media this clip owns. Call only once the removal is saved.
    pub fn release_media(&self) {
        if let Err(err) = self.source.release() {
            emit(
                Level::Warn,
                "video.timeline.release",
                &format!("Could not delete media for {}: {}", self.id, err),
                None,
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

impl fmt::Display for OverlayPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayPosition::Top => write!(f, "top"),
            OverlayPosition::Center => write!(f, "center"),
            OverlayPosition::Bottom => write!(f, "bottom"),
        }
    }
}

/// A caption drawn over the composed timeline between `start_time` and `end_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub id: OverlayId,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub position: OverlayPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimBound {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayUpdate {
    StartTime(f64),
    EndTime(f64),
    Text(String),
    Position(OverlayPosition),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    clips: Vec<Clip>,
    overlays: Vec<TextOverlay>,
    next_clip_id: u64,
    next_overlay_id: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn overlays(&self) -> &[TextOverlay] {
        &self.overlays
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn overlay(&self, id: OverlayId) -> Option<&TextOverlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    /// Append a new clip spanning its whole source and return its id.
    pub fn append_clip(
        &mut self,
        source: SourceLocation,
        name: impl Into<String>,
        duration: f64,
    ) -> ClipId {
        self.next_clip_id += 1;
        let id = ClipId(self.next_clip_id);
        let duration = if duration.is_finite() {
            duration.max(0.0)
        } else {
            0.0
        };
        self.clips.push(Clip {
            id,
            source,
            name: name.into(),
            duration,
            trim_start: 0.0,
            trim_end: duration,
        });
        id
    }

    /// Remove a clip, leaving overlays untouched. The returned clip still
    /// holds its media until [`Clip::release_media`] is called.
    pub fn remove_clip(&mut self, id: ClipId) -> Result<Clip, StudioError> {
        let index = self
            .clips
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| unknown_clip(id))?;
        Ok(self.clips.remove(index))
    }

    /// Set one trim bound. An inverted result (`start >= end`) is accepted.
    pub fn set_trim(&mut self, id: ClipId, bound: TrimBound, value: f64) -> Result<(), StudioError> {
        let value = finite_seconds(value, "Trim")?;
        let clip = self
            .clips
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| unknown_clip(id))?;
        match bound {
            TrimBound::Start => clip.trim_start = value,
            TrimBound::End => clip.trim_end = value,
        }
        Ok(())
    }

    /// Add an overlay covering the whole composed timeline as it is right now.
    pub fn add_overlay(
        &mut self,
        text: &str,
        position: OverlayPosition,
    ) -> Result<OverlayId, StudioError> {
        if text.trim().is_empty() {
            return Err(empty_overlay_text());
        }

        self.next_overlay_id += 1;
        let id = OverlayId(self.next_overlay_id);
        self.overlays.push(TextOverlay {
            id,
            text: text.to_string(),
            start_time: 0.0,
            end_time: self.total_composed_duration(),
            position,
        });
        Ok(id)
    }

    pub fn update_overlay(&mut self, id: OverlayId, update: OverlayUpdate) -> Result<(), StudioError> {
        let overlay = self
            .overlays
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| unknown_overlay(id))?;
        match update {
            OverlayUpdate::StartTime(value) => {
                overlay.start_time = finite_seconds(value, "Overlay start")?
            }
            OverlayUpdate::EndTime(value) => overlay.end_time = finite_seconds(value, "Overlay end")?,
            OverlayUpdate::Text(text) => {
                if text.trim().is_empty() {
                    return Err(empty_overlay_text());
                }
                overlay.text = text;
            }
            OverlayUpdate::Position(position) => overlay.position = position,
        }
        Ok(())
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> Result<TextOverlay, StudioError> {
        let index = self
            .overlays
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| unknown_overlay(id))?;
        Ok(self.overlays.remove(index))
    }

    /// Sum of every clip's `trim_end - trim_start`, in sequence order.
    pub fn total_composed_duration(&self) -> f64 {
        self.clips.iter().map(Clip::trimmed_length).sum()
    }

    /// Clips whose trim range is empty or inverted.
    pub fn inverted_clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(|c| c.is_inverted())
    }

    /// Overlays whose window no longer fits the composed timeline.
    pub fn stale_overlays(&self) -> impl Iterator<Item = &TextOverlay> {
        let total = self.total_composed_duration();
        self.overlays
            .iter()
            .filter(move |o| o.end_time > total + TIME_EPSILON || o.start_time > o.end_time)
    }
}

fn unknown_clip(id: ClipId) -> StudioError {
    StudioError::Validation(format!("No clip with id {id}"))
}

fn unknown_overlay(id: OverlayId) -> StudioError {
    StudioError::Validation(format!("No overlay with id {id}"))
}

/// NaN and infinities cannot be stored in the project file.
fn finite_seconds(value: f64, what: &str) -> Result<f64, StudioError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(StudioError::Validation(format!(
            "{what} must be a finite number of seconds, got {value}"
        )))
    }
}

fn empty_overlay_text() -> StudioError {
    StudioError::Validation("Overlay text must not be empty".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(name: &str) -> SourceLocation {
        SourceLocation::Remote(format!("https://example.test/{name}.mp4"))
    }

    fn two_clip_timeline() -> (Timeline, ClipId, ClipId) {
        let mut timeline = Timeline::new();
        let a = timeline.append_clip(remote("a"), "a", 10.0);
        let b = timeline.append_clip(remote("b"), "b", 8.0);
        (timeline, a, b)
    }

    #[test]
    fn composed_duration_sums_untrimmed_clips() {
        let (timeline, _, _) = two_clip_timeline();
        assert_eq!(timeline.total_composed_duration(), 18.0);
    }

    #[test]
    fn overlay_defaults_to_full_timeline() {
        let (mut timeline, _, _) = two_clip_timeline();
        let id = timeline.add_overlay("Hello", OverlayPosition::Top).unwrap();
        let overlay = timeline.overlay(id).unwrap();
        assert_eq!(overlay.start_time, 0.0);
        assert_eq!(overlay.end_time, 18.0);
    }

    #[test]
    fn trimming_updates_duration_immediately() {
        let (mut timeline, a, b) = two_clip_timeline();
        timeline.set_trim(a, TrimBound::Start, 2.0).unwrap();
        timeline.set_trim(b, TrimBound::End, 5.0).unwrap();
        assert_eq!(timeline.total_composed_duration(), 13.0);
        timeline.set_trim(a, TrimBound::Start, 0.0).unwrap();
        assert_eq!(timeline.total_composed_duration(), 15.0);
    }

    #[test]
    fn removing_a_clip_keeps_overlay_bounds() {
        let (mut timeline, a, b) = two_clip_timeline();
        let overlay = timeline.add_overlay("Caption", OverlayPosition::Bottom).unwrap();

        timeline.remove_clip(a).unwrap();

        assert_eq!(timeline.clips().len(), 1);
        assert_eq!(timeline.clips()[0].id, b);
        assert_eq!(timeline.total_composed_duration(), 8.0);
        assert_eq!(timeline.overlay(overlay).unwrap().end_time, 18.0);
        assert_eq!(timeline.stale_overlays().count(), 1);
    }

    #[test]
    fn whitespace_overlay_is_rejected() {
        let (mut timeline, _, _) = two_clip_timeline();
        let err = timeline.add_overlay("   \t", OverlayPosition::Center).unwrap_err();
        assert!(matches!(err, StudioError::Validation(_)));
        assert!(timeline.overlays().is_empty());
    }

    #[test]
    fn inverted_trim_is_stored_as_given() {
        let (mut timeline, a, _) = two_clip_timeline();
        timeline.set_trim(a, TrimBound::Start, 9.0).unwrap();
        timeline.set_trim(a, TrimBound::End, 4.0).unwrap();
        let clip = timeline.clip(a).unwrap();
        assert_eq!((clip.trim_start, clip.trim_end), (9.0, 4.0));
        assert_eq!(timeline.inverted_clips().count(), 1);
        assert_eq!(timeline.total_composed_duration(), 3.0);
    }

    #[test]
    fn ids_are_never_reused() {
        let (mut timeline, _, b) = two_clip_timeline();
        timeline.remove_clip(b).unwrap();
        let c = timeline.append_clip(remote("c"), "c", 3.0);
        assert_ne!(b, c);
        assert_eq!(c.to_string(), "clip-3");
    }

    #[test]
    fn removing_owned_clip_deletes_media() {
        let dir = tempfile::tempdir().unwrap();
        let owned = dir.path().join("clip.mp4");
        let imported = dir.path().join("imported.mp4");
        std::fs::write(&owned, b"bytes").unwrap();
        std::fs::write(&imported, b"bytes").unwrap();

        let mut timeline = Timeline::new();
        let a = timeline.append_clip(SourceLocation::Owned(owned.clone()), "gen", 4.0);
        let b = timeline.append_clip(SourceLocation::File(imported.clone()), "imp", 4.0);
        let removed = [timeline.remove_clip(a).unwrap(), timeline.remove_clip(b).unwrap()];
        assert!(owned.exists());

        for clip in &removed {
            clip.release_media();
        }
        assert!(!owned.exists());
        assert!(imported.exists());
    }

    #[test]
    fn update_overlay_does_not_revalidate_bounds() {
        let (mut timeline, _, _) = two_clip_timeline();
        let id = timeline.add_overlay("x", OverlayPosition::Center).unwrap();
        timeline.update_overlay(id, OverlayUpdate::EndTime(99.0)).unwrap();
        timeline
            .update_overlay(id, OverlayUpdate::Position(OverlayPosition::Top))
            .unwrap();
        let overlay = timeline.overlay(id).unwrap();
        assert_eq!(overlay.end_time, 99.0);
        assert_eq!(overlay.position, OverlayPosition::Top);
        assert!(timeline.update_overlay(id, OverlayUpdate::Text(" ".into())).is_err());
    }

    #[test]
    fn non_finite_times_are_rejected() {
        let (mut timeline, a, _) = two_clip_timeline();
        let overlay = timeline.add_overlay("x", OverlayPosition::Center).unwrap();

        for bad in ["nan", "inf", "-inf"] {
            let value: f64 = bad.parse().unwrap();
            assert!(matches!(
                timeline.set_trim(a, TrimBound::Start, value),
                Err(StudioError::Validation(_))
            ));
            assert!(matches!(
                timeline.update_overlay(overlay, OverlayUpdate::EndTime(value)),
                Err(StudioError::Validation(_))
            ));
        }

        let clip = timeline.clip(a).unwrap();
        assert_eq!((clip.trim_start, clip.trim_end), (0.0, 10.0));
        assert_eq!(timeline.overlay(overlay).unwrap().end_time, 18.0);
    }

    #[test]
    fn ids_parse_with_or_without_prefix() {
        assert_eq!("clip-4".parse::<ClipId>().unwrap(), ClipId(4));
        assert_eq!("4".parse::<ClipId>().unwrap(), ClipId(4));
        assert_eq!("overlay-2".parse::<OverlayId>().unwrap(), OverlayId(2));
        assert!("clip-x".parse::<ClipId>().is_err());
    }

    #[test]
    fn unknown_ids_are_validation_errors() {
        let mut timeline = Timeline::new();
        assert!(matches!(
            timeline.remove_clip(ClipId(7)),
            Err(StudioError::Validation(_))
        ));
        assert!(timeline.remove_overlay(OverlayId(1)).is_err());
    }
}
