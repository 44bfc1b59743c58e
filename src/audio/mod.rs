pub mod capture;
pub mod file;

pub use capture::AudioCapture;
pub use file::AudioFile;
