pub mod deadline;
pub mod fetch;
pub mod ffmpeg;
