//! Narration timing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One spoken word and its position in the narration audio, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }
}

/// Time range of one story beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatSpan {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl BeatSpan {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Synthesized narration timing, produced once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Total narration length in seconds
    pub duration: f64,
    pub words: Vec<WordTiming>,
    /// Persisted copy of the timing map, if written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_map: Option<PathBuf>,
}

impl AlignmentResult {
    pub fn new(duration: f64, words: Vec<WordTiming>) -> Self {
        Self {
            duration,
            words,
            timing_map: None,
        }
    }

    /// Map beats onto narration time.
    ///
    /// `leading_words` counts words spoken before the first beat (the title).
    /// Beats are contiguous: each ends where the next starts and the last one
    /// ends at `duration`. When the provider tokenised the text differently,
    /// word indices are scaled proportionally; with no word timings at all the
    /// duration is divided by word count.
    pub fn beat_spans(&self, word_counts: &[usize], leading_words: usize) -> Vec<BeatSpan> {
        let expected = leading_words + word_counts.iter().sum::<usize>();
        if word_counts.is_empty() || expected == 0 {
            return Vec::new();
        }

        let mut boundaries = Vec::with_capacity(word_counts.len() + 1);
        let mut offset = leading_words;
        boundaries.push(offset);
        for count in word_counts {
            offset += count;
            boundaries.push(offset);
        }

        let times: Vec<f64> = boundaries
            .iter()
            .map(|&k| self.time_at_word(k, expected))
            .collect();

        times
            .windows(2)
            .enumerate()
            .map(|(index, pair)| BeatSpan {
                index,
                start: pair[0],
                end: pair[1].max(pair[0]),
            })
            .collect()
    }

    fn time_at_word(&self, k: usize, expected: usize) -> f64 {
        if k >= expected {
            return self.duration;
        }
        if self.words.is_empty() {
            return self.duration * k as f64 / expected as f64;
        }
        let scaled = if self.words.len() == expected {
            k
        } else {
            (k as f64 * self.words.len() as f64 / expected as f64).floor() as usize
        };
        self.words[scaled.min(self.words.len() - 1)].start.min(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> Vec<WordTiming> {
        (0..n)
            .map(|i| WordTiming::new(format!("w{i}"), i as f64, i as f64 + 0.8))
            .collect()
    }

    #[test]
    fn test_exact_word_match() {
        let alignment = AlignmentResult::new(6.0, words(6));
        let spans = alignment.beat_spans(&[2, 3], 1);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (1.0, 3.0));
        assert_eq!((spans[1].start, spans[1].end), (3.0, 6.0));
    }

    #[test]
    fn test_proportional_fallback() {
        let alignment = AlignmentResult::new(8.0, words(8));
        let spans = alignment.beat_spans(&[2, 2], 0);
        assert_eq!(spans[0].start, 0.0);
        assert_eq!(spans[1].start, 4.0);
        assert_eq!(spans[1].end, 8.0);
    }

    #[test]
    fn test_no_word_timings() {
        let alignment = AlignmentResult::new(10.0, Vec::new());
        let spans = alignment.beat_spans(&[1, 3], 1);
        assert_eq!(spans[0].start, 2.0);
        assert_eq!(spans[1].start, 4.0);
        assert_eq!(spans[1].end, 10.0);
    }

    #[test]
    fn test_empty_beats() {
        assert!(AlignmentResult::new(3.0, words(3)).beat_spans(&[], 0).is_empty());
    }
}
