//! Utility functions and types.

pub mod file_system;
pub mod format;
pub mod platform;

pub use format::{format_file_size, format_time, sanitize_file_name};

/// Converts a list of string slices into owned strings, for process arguments.
pub fn to_owned(args: Vec<impl AsRef<str>>) -> Vec<String> {
    args.into_iter().map(|arg| arg.as_ref().to_string()).collect()
}

/// Returns the file name of an executable on the current platform.
///
/// `find_executable("ffmpeg")` is `ffmpeg.exe` on Windows and `ffmpeg` elsewhere.
pub fn find_executable(name: impl AsRef<str>) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", name.as_ref())
    } else {
        name.as_ref().to_string()
    }
}
