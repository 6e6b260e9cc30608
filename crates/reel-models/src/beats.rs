//! Story segmentation into beats.

use serde::{Deserialize, Serialize};

/// Explicit beat separator inside story text.
pub const BREAK_MARKER: &str = "[BREAK]";

/// Ordered, non-empty text segments of a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoryBeats {
    beats: Vec<String>,
    /// Whether the split came from explicit markers
    explicit: bool,
}

impl StoryBeats {
    /// Split on [`BREAK_MARKER`] when present, otherwise on blank-line paragraphs.
    ///
    /// Segments are trimmed and empty segments dropped, so a marker at the very
    /// start or end of the text does not produce an empty beat.
    pub fn segment(text: &str) -> Self {
        if text.contains(BREAK_MARKER) {
            return Self {
                beats: text.split(BREAK_MARKER).filter_map(clean).collect(),
                explicit: true,
            };
        }

        let mut beats = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                if let Some(beat) = clean(&current.join("\n")) {
                    beats.push(beat);
                }
                current.clear();
            } else {
                current.push(line);
            }
        }
        if let Some(beat) = clean(&current.join("\n")) {
            beats.push(beat);
        }

        Self { beats, explicit: false }
    }

    /// Keep only the first beat when cliffhanger mode applies to an explicit split.
    pub fn for_narration(self, cliffhanger: bool) -> Self {
        if cliffhanger && self.explicit && self.beats.len() > 1 {
            let mut beats = self.beats;
            beats.truncate(1);
            return Self { beats, explicit: true };
        }
        self
    }

    pub fn beats(&self) -> &[String] {
        &self.beats
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Whitespace-separated word count per beat.
    pub fn word_counts(&self) -> Vec<usize> {
        self.beats.iter().map(|b| word_count(b)).collect()
    }

    /// Text handed to the narration provider: optional title, then each beat.
    pub fn narration_text(&self, title: Option<&str>) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.beats.len() + 1);
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(title);
        }
        parts.extend(self.beats.iter().map(String::as_str));
        parts.join("\n\n")
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn clean(segment: &str) -> Option<String> {
    let trimmed = segment.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_marker_yields_two_beats() {
        let beats = StoryBeats::segment("A. [BREAK] B.");
        assert_eq!(beats.beats(), &["A.".to_string(), "B.".to_string()]);
        assert!(beats.is_explicit());
    }

    #[test]
    fn test_marker_takes_precedence_over_paragraphs() {
        let beats = StoryBeats::segment("one\n\ntwo [BREAK] three");
        assert_eq!(beats.len(), 2);
        assert_eq!(beats.beats()[0], "one\n\ntwo");
    }

    #[test]
    fn test_paragraph_fallback() {
        let beats = StoryBeats::segment("First paragraph\nstill first.\n\n   \nSecond paragraph.");
        assert_eq!(beats.len(), 2);
        assert_eq!(beats.beats()[0], "First paragraph\nstill first.");
        assert_eq!(beats.beats()[1], "Second paragraph.");
        assert!(!beats.is_explicit());
    }

    #[test]
    fn test_edge_markers_and_empty_text() {
        assert_eq!(StoryBeats::segment("[BREAK] A [BREAK]").len(), 1);
        assert!(StoryBeats::segment("   ").is_empty());
        assert_eq!(StoryBeats::segment("no breaks at all").len(), 1);
    }

    #[test]
    fn test_cliffhanger_keeps_first_beat() {
        let beats = StoryBeats::segment("setup [BREAK] reveal").for_narration(true);
        assert_eq!(beats.beats(), &["setup".to_string()]);

        let paragraphs = StoryBeats::segment("a\n\nb").for_narration(true);
        assert_eq!(paragraphs.len(), 2);
    }

    #[test]
    fn test_narration_text() {
        let beats = StoryBeats::segment("A. [BREAK] B.");
        assert_eq!(beats.narration_text(Some("Title")), "Title\n\nA.\n\nB.");
        assert_eq!(beats.narration_text(None), "A.\n\nB.");
        assert_eq!(beats.word_counts(), vec![1, 1]);
    }
}
