//! Time display helpers

/// Split a duration into whole minutes and remaining whole seconds
///
/// Negative and non-finite durations count as zero.
pub fn format_duration(secs: f64) -> (u64, u64) {
    if !secs.is_finite() || secs <= 0.0 {
        return (0, 0);
    }
    let total = secs.floor() as u64;
    (total / 60, total % 60)
}

/// `mm:ss` rendering of a duration
pub fn format_time(secs: f64) -> String {
    let (mins, secs) = format_duration(secs);
    format!("{:02}:{:02}", mins, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), (0, 0));
        assert_eq!(format_duration(59.99), (0, 59));
        assert_eq!(format_duration(60.0), (1, 0));
        assert_eq!(format_duration(185.4), (3, 5));
        assert_eq!(format_duration(-3.0), (0, 0));
        assert_eq!(format_duration(f64::NAN), (0, 0));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(7.5), "00:07");
        assert_eq!(format_time(3725.0), "62:05");
    }
}
