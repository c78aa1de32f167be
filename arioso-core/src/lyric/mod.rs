//! Word-level timed lyric model.
//!
//! Normalizes the two raw encodings served by the catalog into one
//! structure the renderer can animate word by word: line-timestamped LRC
//! (word timing synthesized) and word-timestamped YRC (timing trusted).

pub mod chorus;
pub mod parse;

pub use chorus::{annotate_chorus, detect_chorus_lines};
pub use parse::parse;

use serde::{Deserialize, Serialize};

/// Raw lyric text encodings accepted by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricFormat {
    /// Line-level timestamps only (`[mm:ss.xx]text`)
    Lrc,
    /// Word-level timestamps (`[start,dur](start,dur,0)word...`)
    Yrc,
}

/// Visual treatment the renderer applies to a chorus line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChorusEffect {
    Bars,
    Circles,
    Beams,
}

/// The smallest timed unit within a line: a whitespace-delimited word, or a
/// single character for CJK scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    /// Seconds from track start
    pub start: f64,
    pub end: f64,
}

/// One time-coded unit of lyric text with word-level timing.
///
/// Lines are immutable after parsing except for the chorus-annotation
/// enrichment pass ([`annotate_chorus`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub tokens: Vec<WordToken>,
    pub start: f64,
    pub end: f64,
    pub full_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default)]
    pub is_chorus: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chorus_effect: Option<ChorusEffect>,
}

impl LyricLine {
    #[must_use]
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A parsed lyric document, lines sorted ascending by start time.
///
/// An empty document is a valid state (no lyrics / instrumental track).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyricDocument {
    pub lines: Vec<LyricLine>,
}

impl LyricDocument {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Find the line active at `position` seconds.
    #[must_use]
    pub fn line_at(&self, position: f64) -> Option<&LyricLine> {
        self.lines
            .iter()
            .rev()
            .find(|line| line.start <= position)
    }

    /// Find the index of the line active at `position` seconds.
    #[must_use]
    pub fn line_index_at(&self, position: f64) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .rev()
            .find(|(_, line)| line.start <= position)
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(start: f64, end: f64, text: &str) -> LyricLine {
        LyricLine {
            tokens: Vec::new(),
            start,
            end,
            full_text: text.to_string(),
            translation: None,
            is_chorus: false,
            chorus_effect: None,
        }
    }

    #[test]
    fn test_line_at() {
        let doc = LyricDocument {
            lines: vec![
                line(5.0, 10.0, "First"),
                line(10.0, 15.0, "Second"),
                line(15.0, 20.0, "Third"),
            ],
        };

        assert!(doc.line_at(0.0).is_none());
        assert_eq!(doc.line_at(7.0).unwrap().full_text, "First");
        assert_eq!(doc.line_at(12.0).unwrap().full_text, "Second");
        assert_eq!(doc.line_at(30.0).unwrap().full_text, "Third");
    }

    #[test]
    fn test_line_index_at() {
        let doc = LyricDocument {
            lines: vec![line(5.0, 10.0, "First"), line(10.0, 15.0, "Second")],
        };

        assert_eq!(doc.line_index_at(4.9), None);
        assert_eq!(doc.line_index_at(5.0), Some(0));
        assert_eq!(doc.line_index_at(11.0), Some(1));
    }

    #[test]
    fn test_duration_clamps_negative() {
        let l = line(10.0, 8.0, "backwards");
        assert_eq!(l.duration(), 0.0);
    }

    #[test]
    fn test_document_serde_round_trip() {
        let doc = LyricDocument {
            lines: vec![LyricLine {
                tokens: vec![WordToken {
                    text: "Hello".to_string(),
                    start: 1.0,
                    end: 1.5,
                }],
                start: 1.0,
                end: 3.0,
                full_text: "Hello".to_string(),
                translation: Some("Bonjour".to_string()),
                is_chorus: true,
                chorus_effect: Some(ChorusEffect::Bars),
            }],
        };

        let json = serde_json::to_value(&doc).unwrap();
        let back: LyricDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
