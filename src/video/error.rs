use thiserror::Error;

/// Failure classes surfaced by the generation and render paths.
///
/// Every variant carries an already human-readable message; raw collaborator
/// errors are classified through [`classify_api_error`] before they get here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StudioError {
    #[error("Could not start clip generation: {0}")]
    Submission(String),

    #[error("Checking generation status failed: {0}")]
    Polling(String),

    #[error("Generation finished, but the clip could not be retrieved: {0}")]
    Materialization(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("{0}")]
    Validation(String),

    #[error("{operation} did not finish within {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    #[error("{0} was cancelled")]
    Cancelled(&'static str),

    #[error("Content generation failed: {0}")]
    Content(String),
}

impl StudioError {
    /// Whether the error suggests the configured API key is unusable.
    pub fn is_invalid_api_key(&self) -> bool {
        match self {
            StudioError::Submission(msg) | StudioError::Polling(msg) | StudioError::Content(msg) => {
                msg.starts_with(INVALID_API_KEY_MESSAGE)
            }
            _ => false,
        }
    }
}

const INVALID_API_KEY_MESSAGE: &str = "Invalid API key.";

/// Turn a raw collaborator error into a stable, actionable message.
///
/// `context` describes what was being attempted, e.g. "starting video generation".
pub fn classify_api_error(context: &str, raw: &str) -> String {
    let message = raw.to_lowercase();

    if [
        "api key not valid",
        "api key is invalid",
        "permission denied",
        "requested entity was not found",
    ]
    .iter()
    .any(|needle| message.contains(needle))
        || mentions_status(&message, 403)
    {
        return format!(
            "{INVALID_API_KEY_MESSAGE} Set a valid key in the config file or the GEMINI_API_KEY environment variable and make sure it has the necessary permissions."
        );
    }

    if message.contains("failed to fetch")
        || message.contains("error sending request")
        || message.contains("connection")
        || message.contains("dns")
    {
        return "Network error. Could not connect to the API. Please check your internet connection and try again.".to_string();
    }

    if message.contains("quota") || message.contains("rate limit") || mentions_status(&message, 429) {
        return "API quota exceeded. You may have run out of credits or hit a rate limit. Please try again later.".to_string();
    }

    if message.contains("safety") || message.contains("blocked") {
        return "The request was blocked due to safety settings. Please adjust your input and try again.".to_string();
    }

    if message.contains("did not return an image") {
        return "The model could not generate an image for this prompt. Please try a different, more descriptive prompt.".to_string();
    }

    if message.contains("unexpected response format") {
        return "The model returned an unexpected response format. This might be a temporary issue. Please try again.".to_string();
    }

    if message.contains("server error")
        || mentions_status(&message, 500)
        || mentions_status(&message, 503)
    {
        return "The generation service is temporarily unavailable. Please try again later."
            .to_string();
    }

    format!("An unexpected error occurred while {context}.")
}

/// Whether a lower-cased error message reports HTTP status `code`, e.g.
/// `(403 forbidden)`, `status 503`, `"code": 429` or a leading `500 `.
/// Bare digits inside URLs, ids or sizes do not count.
fn mentions_status(message: &str, code: u16) -> bool {
    let code = code.to_string();
    ["", "(", "status ", "http ", "\"code\": "]
        .iter()
        .any(|prefix| {
            let needle = format!("{prefix}{code}");
            message.match_indices(&needle).any(|(idx, _)| {
                let anchored = !prefix.is_empty() || idx == 0;
                let next = message[idx + needle.len()..].chars().next();
                anchored && !next.is_some_and(|c| c.is_ascii_alphanumeric())
            })
        })
}
