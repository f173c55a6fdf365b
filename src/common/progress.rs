use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::prelude::{OutputFormat, get_output_format};

/// Resolution of the render progress bar; fractions are scaled to this length.
pub const PROGRESS_BAR_LEN: u64 = 1000;

pub fn create_spinner(message: String) -> ProgressBar {
    if get_output_format() == OutputFormat::Json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner} {msg}")
        .map(|s| s.tick_chars("⠁⠉⠙⠚⠒⠂⠒⠲⠴⠤⠄⠤⠠⠤⠦⠖⠒⠐⠒⠓⠋ "))
    {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Bar driven by fractional progress in `[0, 1]`.
pub fn create_fraction_bar(message: &str) -> ProgressBar {
    if get_output_format() == OutputFormat::Json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(PROGRESS_BAR_LEN);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
        .map(|s| s.progress_chars("█▉▊▋▌▍▎▏ "))
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

pub fn set_fraction(pb: &ProgressBar, fraction: f64) {
    pb.set_position((fraction.clamp(0.0, 1.0) * PROGRESS_BAR_LEN as f64) as u64);
}

/// Finish a spinner and print a success message with a checkmark
/// This clears the spinner line entirely and prints a clean message
pub fn finish_spinner_with_success(pb: ProgressBar, message: impl Into<String>) {
    pb.finish_and_clear();
    crate::ui::emit(
        crate::ui::Level::Success,
        "progress.done",
        &format!("✓ {}", message.into()),
        None,
    );
}
