//! Mock response mini-language.
//!
//! ```text
//! +250ms
//! [201]
//! headers:
//!   Content-Type: application/json
//! body:
//! {"id": "{{ uuid }}"}
//! ```
//!
//! Every section is optional but they must appear in this order. Blank lines
//! between sections are ignored; the first unrecognized line ends parsing.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;
use std::time::Duration;

static DELAY_REGEX: OnceLock<Regex> = OnceLock::new();
static STATUS_REGEX: OnceLock<Regex> = OnceLock::new();

fn delay_regex() -> &'static Regex {
    DELAY_REGEX.get_or_init(|| Regex::new(r"^\+(\d+)(ms|s|m|h)$").expect("Invalid delay regex"))
}

fn status_regex() -> &'static Regex {
    STATUS_REGEX.get_or_init(|| Regex::new(r"^\[(\d{3})\]$").expect("Invalid status regex"))
}

pub const DEFAULT_STATUS: u16 = 200;

/// Decoded mock response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTemplate {
    pub delay: Duration,
    pub status_code: u16,
    /// Declaration order is kept; repeated names are all emitted.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Default for ParsedTemplate {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            status_code: DEFAULT_STATUS,
            headers: Vec::new(),
            body: String::new(),
        }
    }
}

/// Parse response DSL text. Never fails; missing sections keep their defaults.
pub fn parse(text: &str) -> ParsedTemplate {
    let mut parsed = ParsedTemplate::default();
    let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let mut idx = 0;

    skip_blank(&lines, &mut idx);
    if let Some(delay) = lines.get(idx).and_then(|l| parse_delay(l.trim())) {
        parsed.delay = delay;
        idx += 1;
        skip_blank(&lines, &mut idx);
    }

    if let Some(status) = lines.get(idx).and_then(|l| parse_status(l.trim())) {
        parsed.status_code = status;
        idx += 1;
        skip_blank(&lines, &mut idx);
    }

    if lines.get(idx).map(|l| l.trim()) == Some("headers:") {
        idx += 1;
        while let Some(line) = lines.get(idx) {
            let trimmed = line.trim();
            let indented = line.starts_with(' ') || line.starts_with('\t');
            if trimmed.is_empty() || !indented || trimmed == "body" || trimmed == "body:" {
                break;
            }
            if let Some((key, value)) = trimmed.split_once(':') {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                parsed
                    .headers
                    .push((key.trim().to_string(), value.to_string()));
            }
            idx += 1;
        }
        skip_blank(&lines, &mut idx);
    }

    if lines.get(idx).map(|l| l.trim()) == Some("body:") {
        parsed.body = lines[idx + 1..].join("\n");
    }

    parsed
}

/// Render a template back to DSL text.
pub fn format(template: &ParsedTemplate) -> String {
    let mut out = String::new();

    if !template.delay.is_zero() {
        let _ = writeln!(out, "{}", format_delay(template.delay));
    }
    let _ = writeln!(out, "[{}]", template.status_code);

    if !template.headers.is_empty() {
        out.push_str("headers:\n");
        for (key, value) in &template.headers {
            let _ = writeln!(out, "  {key}: {value}");
        }
    }

    if !template.body.is_empty() {
        out.push_str("body:\n");
        out.push_str(&template.body);
    }

    out
}

fn skip_blank(lines: &[&str], idx: &mut usize) {
    while lines.get(*idx).is_some_and(|l| l.trim().is_empty()) {
        *idx += 1;
    }
}

fn parse_delay(line: &str) -> Option<Duration> {
    let caps = delay_regex().captures(line)?;
    let value: u64 = caps[1].parse().ok()?;
    match &caps[2] {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        _ => None,
    }
}

fn parse_status(line: &str) -> Option<u16> {
    status_regex().captures(line)?[1].parse().ok()
}

/// Largest unit that represents the delay exactly.
fn format_delay(delay: Duration) -> String {
    let ms = delay.as_millis();
    if ms % 3_600_000 == 0 {
        format!("+{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 {
        format!("+{}m", ms / 60_000)
    } else if ms % 1000 == 0 {
        format!("+{}s", ms / 1000)
    } else {
        format!("+{ms}ms")
    }
}
