//! Publishing helpers: SEO metadata, keyword research and thumbnails.
//!
//! Thumbnails for an SEO pack are generated concurrently and each one is
//! best-effort. A failed image leaves its idea without a file and never
//! fails the pack.

pub mod gemini;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::Context;
use futures_util::future::join_all;

pub use self::types::{
    ContentService, Demand, GeneratedImage, KeywordResearch, KeywordSuggestion, SeoPack,
    SeoRequest, SourceLink, VideoAttachment, VideoCategory, VideoLanguage,
};

use super::error::{StudioError, classify_api_error};
use crate::ui::prelude::{Level, emit};

const THUMBNAIL_FILE_PREFIX: &str = "thumbnail";

/// Generate an SEO pack and one thumbnail per idea into `thumbnails_dir`.
pub async fn generate_seo_pack(
    service: &dyn ContentService,
    request: &SeoRequest,
    thumbnails_dir: &Path,
) -> Result<SeoPack, StudioError> {
    request.validate()?;

    let mut pack = service.generate_pack(request).await.map_err(|err| {
        StudioError::Content(classify_api_error(
            "generating SEO content",
            &format!("{err:#}"),
        ))
    })?;

    let images = join_all(pack.thumbnail_ideas.iter().enumerate().map(|(index, idea)| {
        thumbnail_for_idea(service, &idea.idea, thumbnails_dir, index + 1)
    }))
    .await;

    for (idea, image) in pack.thumbnail_ideas.iter_mut().zip(images) {
        idea.image = image;
    }
    Ok(pack)
}

async fn thumbnail_for_idea(
    service: &dyn ContentService,
    idea: &str,
    dir: &Path,
    number: usize,
) -> Option<PathBuf> {
    let prompt = format!("A vibrant, eye-catching YouTube thumbnail, 16:9, no small text: {idea}");
    let outcome = match service.generate_image(&prompt).await {
        Ok(Some(image)) => {
            let stem = format!("{THUMBNAIL_FILE_PREFIX}-{number}");
            write_image(&image, dir, &stem).await.map(Some)
        }
        Ok(None) => Ok(None),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(Some(path)) => Some(path),
        Ok(None) => {
            emit(
                Level::Warn,
                "video.seo.thumbnail",
                &format!("No image was returned for thumbnail idea {number}"),
                None,
            );
            None
        }
        Err(err) => {
            emit(
                Level::Warn,
                "video.seo.thumbnail",
                &format!("Thumbnail idea {number} failed: {err:#}"),
                None,
            );
            None
        }
    }
}

async fn write_image(image: &GeneratedImage, dir: &Path, stem: &str) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{stem}.{}", image.extension()));
    tokio::fs::write(&path, &image.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Generate a single standalone thumbnail and write it to `out`.
///
/// Unlike the per-idea thumbnails of an SEO pack, a missing image is an error
/// here because it is the only thing the caller asked for.
pub async fn generate_thumbnail(
    service: &dyn ContentService,
    prompt: &str,
    out: &Path,
) -> Result<PathBuf, StudioError> {
    if prompt.trim().is_empty() {
        return Err(StudioError::Validation(
            "Please describe the thumbnail.".to_string(),
        ));
    }

    let classify =
        |raw: String| StudioError::Content(classify_api_error("generating thumbnail", &raw));

    let image = service
        .generate_image(prompt)
        .await
        .map_err(|err| classify(format!("{err:#}")))?
        .ok_or_else(|| classify("The model did not return an image.".to_string()))?;

    let dir = out.parent().unwrap_or(Path::new("."));
    let stem = out
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(THUMBNAIL_FILE_PREFIX);
    let path = match out.extension() {
        Some(_) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| StudioError::Content(format!("{}: {err}", dir.display())))?;
            tokio::fs::write(out, &image.bytes)
                .await
                .map_err(|err| StudioError::Content(format!("{}: {err}", out.display())))?;
            out.to_path_buf()
        }
        None => write_image(&image, dir, stem)
            .await
            .map_err(|err| StudioError::Content(format!("{err:#}")))?,
    };
    Ok(path)
}

/// Ask for keyword ideas around `topic`, grounded on a web search.
pub async fn research_keywords(
    service: &dyn ContentService,
    topic: &str,
) -> Result<KeywordResearch, StudioError> {
    if topic.trim().is_empty() {
        return Err(StudioError::Validation(
            "Please enter a topic to research.".to_string(),
        ));
    }

    let (text, sources) = service.research_keywords(topic).await.map_err(|err| {
        StudioError::Content(classify_api_error(
            "generating keyword suggestions",
            &format!("{err:#}"),
        ))
    })?;

    Ok(KeywordResearch {
        suggestions: parse_keyword_table(&text),
        sources,
    })
}

/// Parse the `| keyword | volume | competition |` rows of a markdown table.
///
/// Header, separator and prose lines are skipped, as are rows whose volume or
/// competition is not High, Medium or Low.
pub fn parse_keyword_table(text: &str) -> Vec<KeywordSuggestion> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let inner = line.strip_prefix('|')?;
            let inner = inner.strip_suffix('|').unwrap_or(inner);
            let cells: Vec<&str> = inner.split('|').map(str::trim).collect();
            let [keyword, volume, competition] = cells.as_slice() else {
                return None;
            };
            if keyword.is_empty() {
                return None;
            }
            Some(KeywordSuggestion {
                keyword: keyword.to_string(),
                volume: volume.parse().ok()?,
                competition: competition.parse().ok()?,
            })
        })
        .collect()
}
