//! Frequency-based chorus detection and deterministic effect assignment.

use super::{ChorusEffect, LyricDocument};
use std::collections::{HashMap, HashSet};

/// Placeholder text the player renders during vocal-free passages
const SILENCE_PLACEHOLDER: &str = "♪";
/// Lines shorter than this carry too little signal to count as a chorus
const MIN_CHORUS_CHARS: usize = 2;

/// Normalize one line for frequency counting; `None` means the line is
/// excluded from detection entirely.
fn normalize(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.chars().count() < MIN_CHORUS_CHARS || trimmed == SILENCE_PLACEHOLDER {
        return None;
    }
    Some(trimmed)
}

/// Detect the chorus line(s) of a document: the normalized texts with the
/// single highest exact-repeat frequency.
///
/// No repetition at all (`max count <= 1`) means no chorus; ties at the
/// maximum are all included.
#[must_use]
pub fn detect_chorus_lines<'a, I>(lines: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in lines {
        if let Some(normalized) = normalize(line) {
            *counts.entry(normalized).or_insert(0) += 1;
        }
    }

    let Some(max_count) = counts.values().copied().max() else {
        return HashSet::new();
    };
    if max_count <= 1 {
        return HashSet::new();
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count == max_count)
        .map(|(text, _)| text.to_string())
        .collect()
}

/// Pick the visual effect for a chorus text.
///
/// The choice is a pure hash of the normalized text, so a given chorus
/// keeps the same effect within and across sessions.
#[must_use]
pub fn effect_for(normalized_text: &str) -> ChorusEffect {
    match fnv1a(normalized_text) % 3 {
        0 => ChorusEffect::Bars,
        1 => ChorusEffect::Circles,
        _ => ChorusEffect::Beams,
    }
}

/// Enrich a parsed document in place with chorus flags and effects.
pub fn annotate_chorus(document: &mut LyricDocument) {
    let chorus = detect_chorus_lines(document.lines.iter().map(|l| l.full_text.as_str()));
    if chorus.is_empty() {
        return;
    }

    for line in &mut document.lines {
        let Some(normalized) = normalize(&line.full_text) else {
            continue;
        };
        if chorus.contains(normalized) {
            line.is_chorus = true;
            line.chorus_effect = Some(effect_for(normalized));
        }
    }
}

fn fnv1a(text: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyric::{parse, LyricFormat};

    #[test]
    fn test_unique_max_detected() {
        let lines = ["Aa", "Bb", "Aa", "Aa", "Cc"];
        let chorus = detect_chorus_lines(lines);
        assert_eq!(chorus.len(), 1);
        assert!(chorus.contains("Aa"));
    }

    #[test]
    fn test_no_repetition_means_no_chorus() {
        let lines = ["Aa", "Bb", "Cc"];
        assert!(detect_chorus_lines(lines).is_empty());
    }

    #[test]
    fn test_ties_all_included() {
        let lines = ["Aa", "Aa", "Bb", "Bb", "Cc"];
        let chorus = detect_chorus_lines(lines);
        assert_eq!(chorus.len(), 2);
        assert!(chorus.contains("Aa"));
        assert!(chorus.contains("Bb"));
    }

    #[test]
    fn test_short_and_placeholder_lines_excluded() {
        let lines = ["♪", "♪", "♪", "x", "x", "Chorus line", "Chorus line"];
        let chorus = detect_chorus_lines(lines);
        assert_eq!(chorus.len(), 1);
        assert!(chorus.contains("Chorus line"));
    }

    #[test]
    fn test_normalization_trims() {
        let lines = ["  Chorus  ", "Chorus", "Verse"];
        let chorus = detect_chorus_lines(lines);
        assert!(chorus.contains("Chorus"));
    }

    #[test]
    fn test_effect_is_deterministic() {
        let first = effect_for("Never gonna give you up");
        let second = effect_for("Never gonna give you up");
        assert_eq!(first, second);
    }

    #[test]
    fn test_annotate_marks_chorus_lines() {
        let input = "[00:05.00]Chorus line\n[00:10.00]Verse one\n[00:15.00]Chorus line\n[00:20.00]Verse two";
        let mut doc = parse(LyricFormat::Lrc, input, None);
        annotate_chorus(&mut doc);

        assert!(doc.lines[0].is_chorus);
        assert!(doc.lines[0].chorus_effect.is_some());
        assert!(doc.lines[2].is_chorus);
        assert_eq!(doc.lines[0].chorus_effect, doc.lines[2].chorus_effect);
        assert!(!doc.lines[1].is_chorus);
        assert!(doc.lines[1].chorus_effect.is_none());
    }

    #[test]
    fn test_annotate_without_repetition_is_noop() {
        let input = "[00:05.00]One line\n[00:10.00]Another line";
        let mut doc = parse(LyricFormat::Lrc, input, None);
        annotate_chorus(&mut doc);
        assert!(doc.lines.iter().all(|l| !l.is_chorus));
    }
}
