//! Console progress for long-running commands.

mod reporter;

pub use reporter::MigrationReporter;

use std::time::Duration;

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let millis = d.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis >= 100 {
            format!("{}.{}s", total_secs, millis / 100)
        } else {
            format!("{}s", total_secs)
        }
    } else if total_secs < 3600 {
        let (mins, secs) = (total_secs / 60, total_secs % 60);
        if secs > 0 {
            format!("{}m{}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let (hours, mins) = (total_secs / 3600, (total_secs % 3600) / 60);
        if mins > 0 {
            format!("{}h{}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_millis(5), "5ms")]
    #[case(Duration::from_millis(999), "999ms")]
    #[case(Duration::from_secs(1), "1s")]
    #[case(Duration::from_millis(1050), "1s")]
    #[case(Duration::from_millis(2300), "2.3s")]
    #[case(Duration::from_secs(90), "1m30s")]
    #[case(Duration::from_secs(300), "5m")]
    #[case(Duration::from_secs(3660), "1h1m")]
    #[case(Duration::from_secs(7200), "2h")]
    fn test_format_duration(#[case] input: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(input), expected);
    }
}
