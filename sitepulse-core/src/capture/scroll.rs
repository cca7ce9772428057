//! Scroll-depth milestone detection

/// Milestone percentages that produce a `scroll_milestone` event
pub const SCROLL_MILESTONES: [u32; 4] = [25, 50, 75, 100];

/// Compute the scroll milestone hit by a scroll position, if any.
///
/// The rounded scroll percentage must exactly equal a milestone; intermediate
/// values emit nothing. No de-duplication happens here: hitting the same
/// milestone twice reports it twice. A page that cannot scroll (track height
/// zero or negative) never reports.
pub fn scroll_milestone(scroll_y: f64, scroll_height: f64, viewport_height: f64) -> Option<u32> {
    let track = scroll_height - viewport_height;
    if track <= 0.0 {
        return None;
    }

    let percent = (scroll_y / track * 100.0).round() as i64;
    SCROLL_MILESTONES
        .iter()
        .find(|&&m| i64::from(m) == percent)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_milestones() {
        // 2000px document, 500px viewport: 1500px of track
        assert_eq!(scroll_milestone(375.0, 2000.0, 500.0), Some(25));
        assert_eq!(scroll_milestone(750.0, 2000.0, 500.0), Some(50));
        assert_eq!(scroll_milestone(1125.0, 2000.0, 500.0), Some(75));
        assert_eq!(scroll_milestone(1500.0, 2000.0, 500.0), Some(100));
    }

    #[test]
    fn test_intermediate_values_emit_nothing() {
        assert_eq!(scroll_milestone(765.0, 2000.0, 500.0), None); // 51%
        assert_eq!(scroll_milestone(0.0, 2000.0, 500.0), None);
        assert_eq!(scroll_milestone(600.0, 2000.0, 500.0), None); // 40%
    }

    #[test]
    fn test_rounding_snaps_to_milestone() {
        // 749px of 1500px track is 49.93%, rounds to 50
        assert_eq!(scroll_milestone(749.0, 2000.0, 500.0), Some(50));
        // 741px is 49.4%, rounds to 49
        assert_eq!(scroll_milestone(741.0, 2000.0, 500.0), None);
    }

    #[test]
    fn test_unscrollable_page() {
        assert_eq!(scroll_milestone(0.0, 500.0, 500.0), None);
        assert_eq!(scroll_milestone(0.0, 400.0, 500.0), None);
    }
}
