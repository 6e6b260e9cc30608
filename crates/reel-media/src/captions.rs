//! ASS subtitle generation for burned-in captions.

use std::fmt::Write as _;

use reel_models::options::parse_hex_color;
use reel_models::{BeatSpan, CaptionPosition, CaptionStyle, WordTiming};

/// Output canvas, portrait 9:16.
pub const PLAY_RES_X: u32 = 1080;
pub const PLAY_RES_Y: u32 = 1920;

/// Shortest caption that is still readable, in seconds.
const MIN_EVENT_SECS: f64 = 0.08;

/// One on-screen caption.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEvent {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub style: &'static str,
}

/// Group word timings into caption events of `words_per_caption` words.
///
/// `time_scale` divides every timestamp, matching narration played back
/// faster (> 1.0) or slower. Each event ends no later than the next starts.
pub fn group_words(words: &[WordTiming], words_per_caption: u8, time_scale: f64) -> Vec<CaptionEvent> {
    let per = usize::from(words_per_caption.max(1));
    let scale = if time_scale > 0.0 { time_scale } else { 1.0 };

    let chunks: Vec<&[WordTiming]> = words.chunks(per).collect();
    let mut events = Vec::with_capacity(chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
            continue;
        };
        let start = first.start / scale;
        let mut end = last.end / scale;
        if let Some(next) = chunks.get(i + 1).and_then(|c| c.first()) {
            end = end.min(next.start / scale);
        }
        let end = end.max(start + MIN_EVENT_SECS);

        let text = chunk
            .iter()
            .map(|w| sanitize(&w.word))
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            continue;
        }

        events.push(CaptionEvent {
            start,
            end,
            text: text.to_uppercase(),
            style: "Caption",
        });
    }

    events
}

/// Like [`group_words`], but a caption never spans two beats.
///
/// Words are assigned to the last beat starting at or before them; words
/// ahead of the first beat (a narrated title) form their own run. `spans`
/// must be ordered by start time.
pub fn group_words_by_beat(
    words: &[WordTiming],
    spans: &[BeatSpan],
    words_per_caption: u8,
    time_scale: f64,
) -> Vec<CaptionEvent> {
    if spans.is_empty() {
        return group_words(words, words_per_caption, time_scale);
    }

    let beat_of = |word: &WordTiming| spans.partition_point(|span| span.start <= word.start);

    let mut events = Vec::new();
    let mut run_start = 0;
    for i in 1..=words.len() {
        if i == words.len() || beat_of(&words[i]) != beat_of(&words[run_start]) {
            events.extend(group_words(&words[run_start..i], words_per_caption, time_scale));
            run_start = i;
        }
    }
    events
}

/// Render a complete ASS document.
pub fn build_ass(style: &CaptionStyle, events: &[CaptionEvent]) -> String {
    let mut out = String::new();

    out.push_str("[Script Info]\n");
    out.push_str("ScriptType: v4.00+\n");
    let _ = writeln!(out, "PlayResX: {}", PLAY_RES_X);
    let _ = writeln!(out, "PlayResY: {}", PLAY_RES_Y);
    out.push_str("WrapStyle: 0\n");
    out.push_str("ScaledBorderAndShadow: yes\n\n");

    out.push_str("[V4+ Styles]\n");
    out.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, \
         Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, \
         Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );

    let (alignment, margin_v) = match style.position {
        CaptionPosition::Top => (8, 300),
        CaptionPosition::Center => (5, 0),
        CaptionPosition::Bottom => (2, 300),
    };
    let _ = writeln!(
        out,
        "Style: Caption,{},{},{},&H000000FF,{},{},-1,0,0,0,100,100,0,0,1,{},{},{},60,60,{},1",
        style.font,
        style.size,
        ass_color(&style.color),
        ass_color(&style.outline_color),
        ass_color(&style.shadow_color),
        style.outline_width,
        style.shadow_offset,
        alignment,
        margin_v,
    );
    let _ = writeln!(
        out,
        "Style: Title,{},{},&H00000000,&H000000FF,&H00FFFFFF,&H00FFFFFF,-1,0,0,0,100,100,0,0,3,24,0,8,90,90,360,1",
        style.font,
        (style.size * 3 / 4).max(12),
    );
    out.push('\n');

    out.push_str("[Events]\n");
    out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for event in events {
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},{},,0,0,0,,{}",
            ass_time(event.start),
            ass_time(event.end),
            event.style,
            event.text
        );
    }

    out
}

/// `#RRGGBB` to ASS `&HAABBGGRR`. Unparseable colors fall back to white.
fn ass_color(hex: &str) -> String {
    let (r, g, b) = parse_hex_color(hex).unwrap_or((255, 255, 255));
    format!("&H00{:02X}{:02X}{:02X}", b, g, r)
}

/// Seconds to `H:MM:SS.cc`.
fn ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_s = total_cs / 100;
    format!("{}:{:02}:{:02}.{:02}", total_s / 3600, (total_s / 60) % 60, total_s % 60, cs)
}

/// Strip characters ASS treats as override or escape syntax.
pub(crate) fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '{' | '}' | '\\'))
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}
