mod check;
pub mod cli;
pub mod commands;
mod config;
mod error;
mod generation;
mod project;
mod render;
mod seo;
mod support;
mod timeline;

pub use cli::VideoCommands;
pub use commands::handle_video_command;
