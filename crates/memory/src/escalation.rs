//! Turning hot-tier entries into collaborator input, and collaborator output
//! back into fixed-size point lists.

use convmem_core::message::Turn;
use tracing::{debug, warn};

/// Bullet markers accepted at the start of an extracted point.
const BULLETS: [&str; 3] = ["- ", "• ", "* "];

/// Decode JSON-encoded turns, skipping entries that do not parse.
pub fn decode_turns(raw: &[String]) -> Vec<Turn> {
    raw.iter()
        .filter_map(|entry| match serde_json::from_str::<Turn>(entry) {
            Ok(turn) => Some(turn),
            Err(e) => {
                debug!(error = %e, "Skipping undecodable hot-tier entry");
                None
            }
        })
        .collect()
}

/// Decode a newest-first slice of the recent buffer into oldest-first turns.
pub fn oldest_first(newest_first: &[String]) -> Vec<Turn> {
    let mut turns = decode_turns(newest_first);
    turns.reverse();
    turns
}

/// Parse an extraction response into exactly `count` points.
///
/// Only bullet-marked lines are kept. Short responses are padded with
/// `Context point {i}` placeholders (1-based position), long ones truncated.
pub fn parse_points(text: &str, count: usize) -> Vec<String> {
    let mut points: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            BULLETS
                .iter()
                .find_map(|bullet| line.strip_prefix(bullet))
                .map(|rest| rest.trim().to_string())
        })
        .collect();

    if points.len() < count {
        warn!(
            recovered = points.len(),
            expected = count,
            "Extraction returned too few points, padding"
        );
        while points.len() < count {
            points.push(format!("Context point {}", points.len() + 1));
        }
    }
    points.truncate(count);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use convmem_core::message::Role;

    #[test]
    fn parses_bulleted_lines_only() {
        let text = "Key Points:\n- likes tea\n• lives in Oslo\n* has a cat\nplain line\n  - works nights  \n- fifth\n- sixth";
        let points = parse_points(text, 5);
        assert_eq!(
            points,
            vec!["likes tea", "lives in Oslo", "has a cat", "works nights", "fifth"]
        );
    }

    #[test]
    fn pads_with_positional_placeholders() {
        let points = parse_points("- only one\nnot a bullet", 5);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], "only one");
        assert_eq!(points[1], "Context point 2");
        assert_eq!(points[4], "Context point 5");
    }

    #[test]
    fn empty_response_is_all_placeholders() {
        let points = parse_points("", 3);
        assert_eq!(points, vec!["Context point 1", "Context point 2", "Context point 3"]);
    }

    #[test]
    fn hyphen_without_space_is_not_a_bullet() {
        let points = parse_points("-dash\n1. numbered", 1);
        assert_eq!(points, vec!["Context point 1"]);
    }

    #[test]
    fn oldest_first_reverses_and_skips_garbage() {
        let a = serde_json::to_string(&Turn::user("first")).unwrap();
        let b = serde_json::to_string(&Turn::assistant("second")).unwrap();
        let raw = vec![b, "not json".to_string(), a];

        let turns = oldest_first(&raw);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[1].content(), "second");
    }
}
