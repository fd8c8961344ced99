use chrono::Local;

/// Local timestamp used in log file names (`YYYYmmdd_HHMMSS`).
///
/// Lexical order of these stamps matches chronological order, which log
/// rotation relies on.
pub fn file_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
