//! Parsers that normalize raw lyric encodings into [`LyricDocument`]s.
//!
//! Malformed source lines are skipped, never fatal: a completely
//! unparseable input yields an empty document.

use super::{LyricDocument, LyricFormat, LyricLine, WordToken};

/// Duration assigned to the final line, which has no successor gap
const DEFAULT_LAST_LINE_SECS: f64 = 5.0;
/// Gaps longer than this are assumed to run into an instrumental break
const GAP_CAP_THRESHOLD_SECS: f64 = 5.0;
/// Reading-speed heuristic: seconds per character plus a flat pad
const READ_SECS_PER_CHAR: f64 = 0.5;
const READ_PAD_SECS: f64 = 2.0;
/// Share of each line's duration reserved as trailing pad
const TRAILING_PAD_RATIO: f64 = 0.1;
/// Zero-weight tokens render instantly but still advance the cursor
const PUNCT_CURSOR_STEP_SECS: f64 = 0.05;
/// Extra weight per character for Latin-script words
const LATIN_WEIGHT_PER_CHAR: f64 = 0.15;
/// Translation lines must start within this window of the primary line
const LRC_TRANSLATION_TOLERANCE_SECS: f64 = 1.0;
const YRC_TRANSLATION_TOLERANCE_SECS: f64 = 0.5;

/// Parse raw lyric text into a normalized, word-level timed document.
///
/// `translation` is line-timestamped LRC regardless of the primary
/// encoding; matching lines are attached by timestamp proximity.
#[must_use]
pub fn parse(format: LyricFormat, primary: &str, translation: Option<&str>) -> LyricDocument {
    let mut lines = match format {
        LyricFormat::Lrc => parse_lrc(primary),
        LyricFormat::Yrc => parse_yrc(primary),
    };

    if let Some(translation) = translation {
        let tolerance = match format {
            LyricFormat::Lrc => LRC_TRANSLATION_TOLERANCE_SECS,
            LyricFormat::Yrc => YRC_TRANSLATION_TOLERANCE_SECS,
        };
        attach_translations(&mut lines, translation, tolerance);
    }

    LyricDocument { lines }
}

// ---------------------------------------------------------------------------
// Encoding A: LRC (line timestamps only, word timing synthesized)
// ---------------------------------------------------------------------------

fn parse_lrc(input: &str) -> Vec<LyricLine> {
    let mut entries = parse_lrc_entries(input);
    entries.sort_by(|a, b| a.0.total_cmp(&b.0));

    let starts: Vec<f64> = entries.iter().map(|(start, _)| *start).collect();
    let mut lines = Vec::with_capacity(entries.len());

    for (i, (start, text)) in entries.into_iter().enumerate() {
        let duration = line_duration(start, starts.get(i + 1).copied(), &text);
        let end = start + duration;
        let tokens = allocate_weighted(&text, start, duration);
        lines.push(LyricLine {
            tokens,
            start,
            end,
            full_text: text,
            translation: None,
            is_chorus: false,
            chorus_effect: None,
        });
    }

    lines
}

/// Scan an LRC body into `(start_secs, text)` entries.
///
/// Handles multi-timestamp lines (`[a][b]text` repeats the text at both
/// times) and skips metadata tags and untimed lines.
fn parse_lrc_entries(input: &str) -> Vec<(f64, String)> {
    let mut entries = Vec::new();

    for raw in input.lines() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let mut remaining = raw;
        let mut timestamps = Vec::new();

        while remaining.starts_with('[') {
            let Some(end) = remaining.find(']') else {
                break;
            };
            match parse_timestamp_secs(&remaining[1..end]) {
                Some(secs) => {
                    timestamps.push(secs);
                    remaining = &remaining[end + 1..];
                }
                // ID tag ([ti:...], [offset:...]) or garbage; not a timed line
                None => break,
            }
        }

        if timestamps.is_empty() {
            continue;
        }

        let text = remaining.trim();
        if text.is_empty() {
            continue;
        }

        for timestamp in timestamps {
            entries.push((timestamp, text.to_string()));
        }
    }

    entries
}

/// Parse a timestamp string like "00:12.34", "00:12:34" or "00:12"
fn parse_timestamp_secs(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();

    match parts.len() {
        2 => {
            let minutes: u32 = parts[0].parse().ok()?;
            let seconds: f64 = parts[1].parse().ok()?;
            if seconds.is_sign_negative() {
                return None;
            }
            Some(f64::from(minutes) * 60.0 + seconds)
        }
        3 => {
            // mm:ss:xx (hundredths)
            let minutes: u32 = parts[0].parse().ok()?;
            let seconds: u32 = parts[1].parse().ok()?;
            let hundredths: u32 = parts[2].parse().ok()?;
            Some(f64::from(minutes) * 60.0 + f64::from(seconds) + f64::from(hundredths) / 100.0)
        }
        _ => None,
    }
}

/// Infer a line's duration from the gap to its successor.
///
/// A gap beyond [`GAP_CAP_THRESHOLD_SECS`] is assumed to run into an
/// instrumental break; the line is then held only as long as the
/// reading-speed heuristic allows rather than hanging through the break.
fn line_duration(start: f64, next_start: Option<f64>, text: &str) -> f64 {
    let Some(next_start) = next_start else {
        return DEFAULT_LAST_LINE_SECS;
    };

    let gap = (next_start - start).max(0.0);
    if gap > GAP_CAP_THRESHOLD_SECS {
        let reading_time = char_count_f64(text) * READ_SECS_PER_CHAR + READ_PAD_SECS;
        gap.min(reading_time)
    } else {
        gap
    }
}

// ---------------------------------------------------------------------------
// Weighted duration allocation
// ---------------------------------------------------------------------------

struct WeightedToken {
    text: String,
    weight: f64,
}

/// Split a line into weighted tokens: CJK-bearing words become one token
/// per character (punctuation weighted zero), Latin words stay whole with
/// weight growing by character count.
fn tokenize(text: &str) -> Vec<WeightedToken> {
    let mut tokens = Vec::new();

    for word in text.split_whitespace() {
        if word.chars().any(|c| is_cjk(c) || is_cjk_punctuation(c)) {
            for ch in word.chars() {
                let weight = if is_cjk_punctuation(ch) { 0.0 } else { 1.0 };
                tokens.push(WeightedToken {
                    text: ch.to_string(),
                    weight,
                });
            }
        } else {
            tokens.push(WeightedToken {
                text: word.to_string(),
                weight: 1.0 + LATIN_WEIGHT_PER_CHAR * char_count_f64(word),
            });
        }
    }

    tokens
}

/// Distribute a line's duration across its tokens proportionally to
/// weight, reserving [`TRAILING_PAD_RATIO`] of the line as trailing pad.
///
/// Zero-duration (and malformed negative-duration) lines produce tokens
/// pinned to the line start rather than trusting upstream ordering.
fn allocate_weighted(text: &str, start: f64, duration: f64) -> Vec<WordToken> {
    let duration = duration.max(0.0);
    let weighted = tokenize(text);
    if weighted.is_empty() {
        return Vec::new();
    }

    let total_weight: f64 = weighted.iter().map(|t| t.weight).sum();
    let usable = duration * (1.0 - TRAILING_PAD_RATIO);
    let line_end = start + duration;

    let mut cursor = start;
    let mut tokens = Vec::with_capacity(weighted.len());

    for token in weighted {
        let share = if token.weight > 0.0 && total_weight > 0.0 {
            token.weight * usable / total_weight
        } else {
            0.0
        };

        let token_start = cursor;
        let token_end = token_start + share;
        cursor = if share > 0.0 {
            token_end
        } else {
            cursor + PUNCT_CURSOR_STEP_SECS
        };

        tokens.push(WordToken {
            text: token.text,
            start: token_start,
            end: token_end,
        });
    }

    rescale_into_bounds(&mut tokens, start, line_end);
    tokens
}

/// Linearly rescale token times into `[start, end]` when the last token
/// overshoots the line end (float drift or punctuation cursor bumps).
fn rescale_into_bounds(tokens: &mut [WordToken], start: f64, end: f64) {
    let Some(last) = tokens.last() else {
        return;
    };
    if last.end <= end {
        return;
    }

    let span = last.end - start;
    let bounds = (end - start).max(0.0);

    if span <= f64::EPSILON {
        for token in tokens {
            token.start = start;
            token.end = start;
        }
        return;
    }

    let scale = bounds / span;
    for token in tokens {
        token.start = start + (token.start - start) * scale;
        token.end = start + (token.end - start) * scale;
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'     // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'   // CJK Extension A
        | '\u{F900}'..='\u{FAFF}'   // CJK Compatibility Ideographs
        | '\u{3040}'..='\u{309F}'   // Hiragana
        | '\u{30A0}'..='\u{30FF}'   // Katakana
        | '\u{AC00}'..='\u{D7AF}'   // Hangul Syllables
    )
}

fn is_cjk_punctuation(ch: char) -> bool {
    matches!(ch,
        '\u{3000}'..='\u{303F}'     // CJK Symbols and Punctuation
        | '\u{FF01}'..='\u{FF0F}'   // Fullwidth punctuation ranges
        | '\u{FF1A}'..='\u{FF20}'
        | '\u{FF3B}'..='\u{FF40}'
        | '\u{FF5B}'..='\u{FF65}'
    )
}

fn char_count_f64(s: &str) -> f64 {
    f64::from(u32::try_from(s.chars().count()).unwrap_or(u32::MAX))
}

// ---------------------------------------------------------------------------
// Encoding B: YRC (word timestamps, trusted directly)
// ---------------------------------------------------------------------------

fn parse_yrc(input: &str) -> Vec<LyricLine> {
    let mut lines: Vec<LyricLine> = input.lines().filter_map(parse_yrc_line).collect();
    lines.sort_by(|a, b| a.start.total_cmp(&b.start));
    lines
}

/// Parse one YRC line: `[start,dur](start,dur,0)word(start,dur,0)word...`
///
/// JSON metadata headers and anything else that does not match are
/// skipped by returning `None`.
fn parse_yrc_line(raw: &str) -> Option<LyricLine> {
    let raw = raw.trim();
    let rest = raw.strip_prefix('[')?;
    let header_end = rest.find(']')?;
    let (line_start_ms, line_dur_ms) = parse_ms_pair(&rest[..header_end])?;

    let mut remaining = &rest[header_end + 1..];
    let mut tokens = Vec::new();
    let mut full_text = String::new();

    while let Some(open) = remaining.find('(') {
        let after_open = &remaining[open + 1..];
        let Some(close) = after_open.find(')') else {
            break;
        };
        let tag = &after_open[..close];
        remaining = &after_open[close + 1..];

        let Some((word_start_ms, word_dur_ms)) = parse_ms_pair(tag) else {
            continue;
        };

        let text_end = remaining.find('(').unwrap_or(remaining.len());
        let text = &remaining[..text_end];
        remaining = &remaining[text_end..];

        if text.is_empty() {
            continue;
        }

        full_text.push_str(text);
        tokens.push(WordToken {
            text: text.to_string(),
            start: ms_to_secs(word_start_ms),
            end: ms_to_secs(word_start_ms + word_dur_ms),
        });
    }

    if tokens.is_empty() {
        return None;
    }

    let start = ms_to_secs(line_start_ms);
    let end = ms_to_secs(line_start_ms + line_dur_ms);
    rescale_into_bounds(&mut tokens, start, end);

    Some(LyricLine {
        tokens,
        start,
        end,
        full_text: full_text.trim().to_string(),
        translation: None,
        is_chorus: false,
        chorus_effect: None,
    })
}

/// Parse the first two comma-separated millisecond fields of a YRC tag
/// ("13540,2750" or "13540,550,0").
fn parse_ms_pair(s: &str) -> Option<(u64, u64)> {
    let mut fields = s.split(',');
    let start: u64 = fields.next()?.trim().parse().ok()?;
    let duration: u64 = fields.next()?.trim().parse().ok()?;
    Some((start, duration))
}

fn ms_to_secs(ms: u64) -> f64 {
    f64::from(u32::try_from(ms).unwrap_or(u32::MAX)) / 1000.0
}

// ---------------------------------------------------------------------------
// Translation alignment
// ---------------------------------------------------------------------------

/// Attach translation text to primary lines by timestamp proximity.
///
/// Translations are timestamped independently; the candidate closest to
/// each primary line's start wins, and lines without a candidate inside
/// `tolerance` stay untranslated.
fn attach_translations(lines: &mut [LyricLine], translation: &str, tolerance: f64) {
    let entries = parse_lrc_entries(translation);
    if entries.is_empty() {
        return;
    }

    for line in lines {
        let best = entries
            .iter()
            .map(|(start, text)| ((start - line.start).abs(), text))
            .filter(|(diff, _)| *diff <= tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((_, text)) = best {
            line.translation = Some(text.clone());
        }
    }
}
