//! Human-readable duration parsing for configuration values.

use std::time::Duration;

/// Parse a duration string like `"2h30m"`, `"1d"`, or `"90s"`.
///
/// Supports components `Xd` (days), `Xh` (hours), `Xm` (minutes), `Xs`
/// (seconds), combined: "2h30m", "1d12h". A bare number is seconds, and
/// `"0"` is a valid zero duration (configuration uses zero for "disabled").
/// Returns `None` if the string is empty or unparseable.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();
    let mut found_unit = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
        } else {
            let n: u64 = num_buf.parse().ok()?;
            num_buf.clear();
            match ch {
                'd' => total_secs += n * 86_400,
                'h' => total_secs += n * 3_600,
                'm' => total_secs += n * 60,
                's' => total_secs += n,
                _ => return None,
            }
            found_unit = true;
        }
    }

    // A trailing number is seconds, but only when no unit preceded it;
    // "30m15" is ambiguous and rejected.
    if !num_buf.is_empty() {
        if found_unit {
            return None;
        }
        let n: u64 = num_buf.parse().ok()?;
        total_secs += n;
    }

    Some(Duration::from_secs(total_secs))
}
