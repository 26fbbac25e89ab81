use super::model::{SpeakerRole, SpeakerTurn};
use crate::domain::resilience::PipelineError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Lines made only of dashes, stars, equals or underscores separate blocks
static SEPARATOR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:-{3,}|\*{3,}|={3,}|_{3,})\s*$").expect("valid separator pattern"));

/// Leading "Name:" label, optionally wrapped in markdown bold
static LEADING_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\**\s*([^:\n*]{1,40}?)\s*\**[ \t]*:\**").expect("valid label pattern")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Consecutive non-blank lines of the raw script
struct Block {
    text: String,
    /// (byte offset within `text`, line index in the raw script)
    line_starts: Vec<(usize, usize)>,
}

impl Block {
    fn line_at(&self, offset: usize) -> usize {
        let position = self.line_starts.partition_point(|(start, _)| *start <= offset);
        self.line_starts[position.saturating_sub(1)].1
    }
}

/// A speaker marker found inside a block
struct Marker {
    start: usize,
    end: usize,
    role: SpeakerRole,
    name: String,
}

/// Splits a raw dialogue script into ordered speaker turns.
///
/// Known identifiers in any case followed by a colon start a new turn. Co-host
/// identifiers win over host identifiers when both match.
pub struct ScriptSegmenter {
    marker_pattern: Option<Regex>,
    /// lowercase identifier -> role
    roles: HashMap<String, SpeakerRole>,
    /// identifiers in match priority order: co-host first, then longest first
    identifiers: Vec<(String, SpeakerRole)>,
}

impl ScriptSegmenter {
    pub fn new<S: AsRef<str>>(host_identifiers: &[S], cohost_identifiers: &[S]) -> Self {
        let clean = |ids: &[S], role: SpeakerRole| -> Vec<(String, SpeakerRole)> {
            ids.iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty())
                .map(|id| (id, role))
                .collect()
        };

        let hosts = clean(host_identifiers, SpeakerRole::Host);
        let cohosts = clean(cohost_identifiers, SpeakerRole::CoHost);

        let mut roles = HashMap::new();
        for (id, role) in hosts.iter().chain(cohosts.iter()) {
            roles.insert(id.to_lowercase(), *role);
        }

        let mut identifiers: Vec<(String, SpeakerRole)> = cohosts.into_iter().chain(hosts).collect();
        identifiers.sort_by(|(a, role_a), (b, role_b)| {
            let cohost_first = |role: &SpeakerRole| u8::from(*role != SpeakerRole::CoHost);
            cohost_first(role_a)
                .cmp(&cohost_first(role_b))
                .then_with(|| b.len().cmp(&a.len()))
        });

        let marker_pattern = if identifiers.is_empty() {
            None
        } else {
            // longest identifiers first so "Alex Chen" wins over "Alex"
            let mut by_length: Vec<&str> = identifiers.iter().map(|(id, _)| id.as_str()).collect();
            by_length.sort_by_key(|id| std::cmp::Reverse(id.len()));
            let alternatives = by_length
                .iter()
                .map(|id| regex::escape(id))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?im)(?P<marker>\**(?P<name>{})\**[ \t]*:\**)", alternatives);
            Regex::new(&pattern).ok()
        };

        Self {
            marker_pattern,
            roles,
            identifiers,
        }
    }

    /// Segment `raw_script` into turns ordered by (line, sequence).
    ///
    /// A script that yields no turns is a segmentation failure.
    pub fn segment(&self, raw_script: &str) -> Result<Vec<SpeakerTurn>, PipelineError> {
        let mut pending: Vec<(usize, SpeakerRole, String)> = Vec::new();

        for block in split_blocks(raw_script) {
            self.segment_block(&block, &mut pending);
        }

        let mut turns = Vec::with_capacity(pending.len());
        let mut previous_line = None;
        let mut sequence_index = 0;
        for (line, role, text) in pending {
            if previous_line == Some(line) {
                sequence_index += 1;
            } else {
                sequence_index = 0;
                previous_line = Some(line);
            }
            turns.push(SpeakerTurn {
                original_line_index: line,
                sequence_index,
                role,
                text,
            });
        }

        if turns.is_empty() {
            return Err(PipelineError::Segmentation(
                "script produced no speaker turns".to_string(),
            ));
        }

        tracing::debug!(turn_count = turns.len(), "Script segmented");
        Ok(turns)
    }

    fn segment_block(&self, block: &Block, out: &mut Vec<(usize, SpeakerRole, String)>) {
        let markers = self.find_markers(&block.text);

        let Some(first) = markers.first() else {
            let (role, text) = self.infer_speaker(&block.text);
            push_turn(out, block.line_at(0), role, &text);
            return;
        };

        let preamble = &block.text[..first.start];
        if !preamble.trim().is_empty() {
            let (role, text) = self.infer_speaker(preamble);
            push_turn(out, block.line_at(0), role, &text);
        }

        for (i, marker) in markers.iter().enumerate() {
            let end = markers.get(i + 1).map_or(block.text.len(), |next| next.start);
            let text = &block.text[marker.end..end];
            push_turn(out, block.line_at(marker.start), marker.role, text);
        }
    }

    /// Markers in order, with "Name: Name:" repetitions collapsed into one
    fn find_markers(&self, text: &str) -> Vec<Marker> {
        let Some(pattern) = &self.marker_pattern else {
            return Vec::new();
        };

        let mut markers: Vec<Marker> = Vec::new();
        let mut at = 0;
        while let Some(captures) = pattern.captures_at(text, at) {
            let (Some(marker), Some(name)) = (captures.name("marker"), captures.name("name")) else {
                break;
            };
            if !starts_word(text, marker.start()) {
                at = marker.start() + text[marker.start()..].chars().next().map_or(1, char::len_utf8);
                continue;
            }
            at = marker.end();

            let name = name.as_str().to_lowercase();
            let Some(role) = self.roles.get(&name).copied() else {
                continue;
            };

            if let Some(previous) = markers.last_mut() {
                let between = &text[previous.end..marker.start()];
                if previous.name == name && between.trim().is_empty() {
                    previous.end = marker.end();
                    continue;
                }
            }

            markers.push(Marker {
                start: marker.start(),
                end: marker.end(),
                role,
                name,
            });
        }
        markers
    }

    /// Attribute an unmarked block: leading label, then containment, then HOST
    fn infer_speaker(&self, text: &str) -> (SpeakerRole, String) {
        if let Some((role, rest)) = self.strip_leading_label(text) {
            return (role, rest);
        }

        let lowered = text.to_lowercase();
        let role = self
            .identifiers
            .iter()
            .find(|(id, _)| lowered.contains(&id.to_lowercase()))
            .map_or(SpeakerRole::Host, |(_, role)| *role);

        (role, text.to_string())
    }

    fn strip_leading_label(&self, text: &str) -> Option<(SpeakerRole, String)> {
        let mut rest = text;
        let mut found: Option<(String, SpeakerRole)> = None;

        while let Some(captures) = LEADING_LABEL.captures(rest) {
            let label = captures.get(1)?.as_str().trim().to_lowercase();
            let Some(role) = self.roles.get(&label).copied() else {
                break;
            };
            match &found {
                Some((previous, _)) if *previous != label => break,
                _ => {}
            }
            rest = &rest[captures.get(0)?.end()..];
            found = Some((label, role));
        }

        found.map(|(_, role)| (role, rest.to_string()))
    }
}

/// Convenience wrapper building a one-off segmenter
pub fn segment<S: AsRef<str>>(
    raw_script: &str,
    host_identifiers: &[S],
    cohost_identifiers: &[S],
) -> Result<Vec<SpeakerTurn>, PipelineError> {
    ScriptSegmenter::new(host_identifiers, cohost_identifiers).segment(raw_script)
}

fn push_turn(out: &mut Vec<(usize, SpeakerRole, String)>, line: usize, role: SpeakerRole, raw: &str) {
    let text = WHITESPACE.replace_all(raw, " ");
    let text = text.trim();
    if !text.is_empty() {
        out.push((line, role, text.to_string()));
    }
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#') || SEPARATOR_LINE.is_match(trimmed)
}

fn split_blocks(raw_script: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for (index, line) in raw_script.lines().enumerate() {
        if is_separator(line) {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }

        let block = current.get_or_insert_with(|| Block {
            text: String::new(),
            line_starts: Vec::new(),
        });
        if !block.text.is_empty() {
            block.text.push('\n');
        }
        block.line_starts.push((block.text.len(), index));
        block.text.push_str(line);
    }

    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

/// Markers must not continue a word: "Bobby" never hides a "Bob:" marker
fn starts_word(text: &str, offset: usize) -> bool {
    text[..offset]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '*'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roles_and_text(turns: &[SpeakerTurn]) -> Vec<(SpeakerRole, &str)> {
        turns.iter().map(|t| (t.role, t.text.as_str())).collect()
    }

    #[test]
    fn test_three_line_dialogue() {
        let turns = segment(
            "Alice: Hi Bob.\nBob: Hi Alice!\nAlice: Great weather.",
            &["Alice"],
            &["Bob"],
        )
        .unwrap();

        assert_eq!(
            roles_and_text(&turns),
            vec![
                (SpeakerRole::Host, "Hi Bob."),
                (SpeakerRole::CoHost, "Hi Alice!"),
                (SpeakerRole::Host, "Great weather."),
            ]
        );
        assert_eq!(
            turns.iter().map(SpeakerTurn::order_key).collect::<Vec<_>>(),
            vec![(0, 0), (1, 0), (2, 0)]
        );
    }

    #[test]
    fn test_duplicate_prefix_collapsed() {
        let turns = segment("Hari: Hari: Welcome back.", &["Hari"], &["Priya"]).unwrap();
        assert_eq!(roles_and_text(&turns), vec![(SpeakerRole::Host, "Welcome back.")]);
    }

    #[test]
    fn test_duplicate_prefix_in_other_case_collapsed() {
        let turns = segment("Hari: hari: Welcome back.", &["Hari"], &["Priya"]).unwrap();
        assert_eq!(roles_and_text(&turns), vec![(SpeakerRole::Host, "Welcome back.")]);
    }

    #[test]
    fn test_duplicate_prefix_without_space_collapsed() {
        let turns = segment("Bob:Bob: hello", &["Alice"], &["Bob"]).unwrap();
        assert_eq!(roles_and_text(&turns), vec![(SpeakerRole::CoHost, "hello")]);
    }

    #[test]
    fn test_upper_case_markers_split_one_line() {
        let turns = segment("ALICE: So what? BOB: It rained.", &["Alice"], &["Bob"]).unwrap();
        assert_eq!(
            roles_and_text(&turns),
            vec![(SpeakerRole::Host, "So what?"), (SpeakerRole::CoHost, "It rained.")]
        );
        assert_eq!(
            turns.iter().map(SpeakerTurn::order_key).collect::<Vec<_>>(),
            vec![(0, 0), (0, 1)]
        );
    }

    #[test]
    fn test_mixed_speakers_on_one_line_are_split() {
        let turns = segment(
            "Alice: So what happened? Bob: It rained. Alice: Again?",
            &["Alice"],
            &["Bob"],
        )
        .unwrap();

        assert_eq!(
            roles_and_text(&turns),
            vec![
                (SpeakerRole::Host, "So what happened?"),
                (SpeakerRole::CoHost, "It rained."),
                (SpeakerRole::Host, "Again?"),
            ]
        );
        assert_eq!(
            turns.iter().map(SpeakerTurn::order_key).collect::<Vec<_>>(),
            vec![(0, 0), (0, 1), (0, 2)]
        );
    }

    #[test]
    fn test_continuation_lines_stay_with_their_speaker() {
        let script = "Alice: First part\nstill Alice talking.\n\nBob: Reply.";
        let turns = segment(script, &["Alice"], &["Bob"]).unwrap();

        assert_eq!(
            roles_and_text(&turns),
            vec![
                (SpeakerRole::Host, "First part still Alice talking."),
                (SpeakerRole::CoHost, "Reply."),
            ]
        );
        assert_eq!(turns[1].original_line_index, 3);
    }

    #[test]
    fn test_case_insensitive_leading_label_for_unmarked_block() {
        let turns = segment("BOB: shouting now", &["Alice"], &["Bob"]).unwrap();
        assert_eq!(roles_and_text(&turns), vec![(SpeakerRole::CoHost, "shouting now")]);
    }

    #[test]
    fn test_containment_then_default_host() {
        let script = "Thanks for that, says bob.\n\nAnd now the weather.";
        let turns = segment(script, &["Alice"], &["Bob"]).unwrap();
        assert_eq!(
            roles_and_text(&turns),
            vec![
                (SpeakerRole::CoHost, "Thanks for that, says bob."),
                (SpeakerRole::Host, "And now the weather."),
            ]
        );
    }

    #[test]
    fn test_cohost_identifier_wins_when_both_match() {
        let turns = segment("Sam: hello there", &["Sam"], &["Sam"]).unwrap();
        assert_eq!(turns[0].role, SpeakerRole::CoHost);

        let turns = segment("Alex Chen: hi", &["Alex"], &["Alex Chen"]).unwrap();
        assert_eq!(roles_and_text(&turns), vec![(SpeakerRole::CoHost, "hi")]);
    }

    #[test]
    fn test_markdown_bold_markers_and_separators() {
        let script = "## Introduction\n**Alice:** Welcome!\n---\n**Bob**: Thanks.";
        let turns = segment(script, &["Alice"], &["Bob"]).unwrap();
        assert_eq!(
            roles_and_text(&turns),
            vec![(SpeakerRole::Host, "Welcome!"), (SpeakerRole::CoHost, "Thanks.")]
        );
        assert_eq!(turns[0].original_line_index, 1);
        assert_eq!(turns[1].original_line_index, 3);
    }

    #[test]
    fn test_identifier_inside_word_is_not_a_marker() {
        let turns = segment("Alice: I met Bobby: he was nice.", &["Alice"], &["Bob"]).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "I met Bobby: he was nice.");
    }

    #[test]
    fn test_empty_turns_dropped_and_empty_script_fails() {
        let turns = segment("Alice:\nBob: Only me.", &["Alice"], &["Bob"]).unwrap();
        assert_eq!(roles_and_text(&turns), vec![(SpeakerRole::CoHost, "Only me.")]);

        let err = segment("   \n\n---\n", &["Alice"], &["Bob"]).unwrap_err();
        assert!(matches!(err, PipelineError::Segmentation(_)));
    }

    #[test]
    fn test_order_matches_source_and_is_idempotent() {
        let script = "Intro words.\nAlice: One. Bob: Two.\n\nBob: Three.\nAlice: Four. Bob: Five.";
        let segmenter = ScriptSegmenter::new(&["Alice"], &["Bob"]);

        let first = segmenter.segment(script).unwrap();
        let second = segmenter.segment(script).unwrap();
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_by_key(SpeakerTurn::order_key);
        let texts: Vec<&str> = sorted.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Intro words.", "One.", "Two.", "Three.", "Four.", "Five."]);

        let mut cursor = 0;
        for text in texts {
            let found = script[cursor..].find(text).expect("turn text appears in source");
            cursor += found + text.len();
        }
    }
}
