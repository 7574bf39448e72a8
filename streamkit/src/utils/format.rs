//! Human-readable rendering of sizes, durations and file names.

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Renders a byte count with the largest fitting unit (1024 base, up to two decimals).
///
/// `1536` renders as `1.5 KB`, `1024` as `1 KB`.
pub fn format_file_size(bytes: u64) -> String {
    let mut len = bytes as f64;
    let mut order = 0;

    while len >= 1024.0 && order < SIZE_UNITS.len() - 1 {
        order += 1;
        len /= 1024.0;
    }

    let rendered = format!("{len:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');

    format!("{} {}", rendered, SIZE_UNITS[order])
}

/// Renders a number of seconds as `45s`, `2m 5s`, `1h 2m 3s`, `1h 2m` or `1h 0m`.
pub fn format_time(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }

    if seconds < 3600 {
        return format!("{}m {}s", seconds / 60, seconds % 60);
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match (minutes, secs) {
        (_, s) if s > 0 => format!("{hours}h {minutes}m {s}s"),
        (m, _) if m > 0 => format!("{hours}h {m}m"),
        _ => format!("{hours}h 0m"),
    }
}

fn is_replaced(c: char) -> bool {
    c.is_control() || matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/' | '.' | ' ')
}

/// Turns an arbitrary title into a file name that is valid on every platform.
///
/// Runs of path-hostile characters (including dots and spaces) collapse into one `_`,
/// trailing dots and underscores are removed.
pub fn sanitize_file_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for c in name.chars() {
        if is_replaced(c) {
            if !last_was_underscore {
                result.push('_');
                last_was_underscore = true;
            }
        } else {
            result.push(c);
            last_was_underscore = false;
        }
    }

    result.trim_end_matches(['.', '_']).to_string()
}
