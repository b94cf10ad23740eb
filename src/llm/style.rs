//! Local reshaping of explanation text into a style and reading level.
//!
//! Pure and deterministic: the same text, style and level always render the same output, so the
//! UI can switch styles without another round trip to the explanation service.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use super::options::{ExplainStyle, ReadingLevel};
use crate::analysis::format_thousands;

static NEXT_ACTIONS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)next actions\s*:").expect("valid regex"));
static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[-*•·]|\d{1,2}[.)])\s+").expect("valid regex"));
static SOURCE_ASIDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\((?:actual|forecast)[^)]*\)").expect("valid regex"));
static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)").expect("valid regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static BIG_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?").expect("valid regex"));
static CLAUSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;](?:\s|$)|\s[-–]\s|—").expect("valid regex"));

const IMPERATIVE_VERBS: [&str; 12] = [
    "investigate", "analyze", "review", "check", "compare", "reduce",
    "increase", "monitor", "validate", "prioritize", "explore", "confirm",
];

static PLAIN_WORDS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("decreased", "went down"),
        ("increased", "went up"),
        ("approximately", "about"),
        ("investigate", "look into"),
        ("analyze", "look at"),
        ("determine", "find"),
    ]
    .into_iter()
    .map(|(word, plain)| (Regex::new(&format!(r"(?i)\b{}\b", word)).expect("valid regex"), plain))
    .collect()
});

/// Reshape `text` into `style` at `level`.
pub fn apply_style_and_level(text: &str, style: ExplainStyle, level: ReadingLevel) -> String {
    let (body, actions) = split_sections(text);
    let body_lines = clean_lines(body);
    let action_lines = actions.map(clean_lines).unwrap_or_default();

    match style {
        ExplainStyle::Actions => {
            let picked = if !action_lines.is_empty() {
                action_lines
            } else {
                let imperative: Vec<String> = body_lines.iter().filter(|l| starts_with_imperative(l)).cloned().collect();
                if imperative.is_empty() { body_lines } else { imperative }
            };
            render_bullets(&picked, level)
        }
        ExplainStyle::Narrative => {
            let sentences: Vec<String> = body_lines
                .iter()
                .chain(action_lines.iter())
                .map(|l| SOURCE_ASIDE_RE.replace_all(l, "").into_owned())
                .map(|l| apply_level(&l, level))
                .map(|l| ensure_terminal_punctuation(&collapse_ws(&l)))
                .filter(|l| !l.is_empty())
                .collect();
            sentences.join(" ")
        }
        ExplainStyle::Bullets => {
            let all: Vec<String> = body_lines.into_iter().chain(action_lines).collect();
            render_bullets(&all, level)
        }
    }
}

/// Body before the first "Next actions:" marker, and whatever follows it.
pub fn split_sections(text: &str) -> (&str, Option<&str>) {
    match NEXT_ACTIONS_RE.find(text) {
        Some(m) => (&text[..m.start()], Some(&text[m.end()..])),
        None => (text, None),
    }
}

fn clean_lines(section: &str) -> Vec<String> {
    section
        .lines()
        .map(|l| BULLET_RE.replace(l.trim(), "").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn starts_with_imperative(line: &str) -> bool {
    let first: String = line.chars().take_while(|c| c.is_alphabetic()).collect();
    let first = first.to_lowercase();
    IMPERATIVE_VERBS.contains(&first.as_str())
}

fn render_bullets(lines: &[String], level: ReadingLevel) -> String {
    lines
        .iter()
        .map(|l| collapse_ws(&apply_level(l, level)))
        .filter(|l| !l.is_empty())
        .map(|l| format!("- {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-line reading level transform.
pub fn apply_level(line: &str, level: ReadingLevel) -> String {
    match level {
        ReadingLevel::Pro => line.to_string(),
        ReadingLevel::Balanced | ReadingLevel::Advanced => round_big_numbers(line),
        ReadingLevel::Simple => {
            let s = PAREN_RE.replace_all(line, "");
            let s = plain_words(&s);
            let s = round_big_numbers(&s);
            truncate_sentences(&collapse_ws(&s))
        }
    }
}

fn plain_words(text: &str) -> String {
    PLAIN_WORDS.iter().fold(text.to_string(), |acc, (re, plain)| {
        re.replace_all(&acc, |caps: &Captures| {
            let starts_upper = caps[0].chars().next().map(char::is_uppercase).unwrap_or(false);
            if starts_upper { capitalize(plain) } else { plain.to_string() }
        })
        .into_owned()
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "12,345.67" -> "12,346". Only numbers written with thousands separators are touched.
pub fn round_big_numbers(text: &str) -> String {
    BIG_NUMBER_RE
        .replace_all(text, |caps: &Captures| {
            let raw = caps[0].replace(',', "");
            match raw.parse::<f64>() {
                Ok(v) => format_thousands(v.round() as i64),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Cut every sentence at its first comma, semicolon or dash, keeping its closing punctuation.
fn truncate_sentences(text: &str) -> String {
    split_sentences(text)
        .into_iter()
        .map(|sentence| {
            let terminal = sentence.chars().last().filter(|c| matches!(c, '.' | '!' | '?'));
            match CLAUSE_RE.find(sentence) {
                Some(m) => {
                    let head = sentence[..m.start()].trim_end();
                    match terminal {
                        Some(p) => format!("{}{}", head, p),
                        None => head.to_string(),
                    }
                }
                None => sentence.to_string(),
            }
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sentence boundaries are `.`, `!` or `?` followed by whitespace or the end of the text, so
/// decimals like "2.5" stay intact.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => true,
            };
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = end;
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn collapse_ws(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

fn ensure_terminal_punctuation(text: &str) -> String {
    match text.chars().last() {
        None => String::new(),
        Some('.' | '!' | '?' | ':') => text.to_string(),
        Some(_) => format!("{}.", text),
    }
}
