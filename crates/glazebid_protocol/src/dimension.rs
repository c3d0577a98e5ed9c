//! Dimension grammar: parsing callout strings to inches and formatting
//! inches back for display.
//!
//! Accepted tokens: feet (`6'` or `6′`), inches (`36"` or `36″`), bare
//! fractions (`1/2`), and mixed numbers (`36 1/2`, `36-1/2`). A full
//! dimension is either `F'-I"`, bare inches, a `W x H` pair, or a labeled
//! form (`Width:`, `W:`, `W=`, …). Labels are tried in the fixed order
//! width, height, depth, return, and the long surface form wins over the
//! single letter, so the result never depends on scan order.

use std::sync::OnceLock;

use regex::Regex;

/// Labeled values outside this range (inches) are treated as noise.
const MIN_LABELED_IN: f64 = 3.0;
const MAX_LABELED_IN: f64 = 240.0;

/// A single dimension token: feet-and-inches or bare inches, with an
/// optional fraction. Shared by the pair and labeled scanners.
const TOKEN: &str = r#"\d+\s*['′]\s*-?\s*(?:\d+(?:[ -]\d+/\d+)?|\d+/\d+)?\s*["″]?|\d+(?:[ -]\d+/\d+)?\s*["″]?|\d+/\d+\s*["″]?"#;

fn feet_inches_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(\d+)\s*'\s*-?\s*((?:\d+(?:[ -]\d+/\d+)?)|(?:\d+/\d+))?\s*"?$"#).unwrap()
    })
}

fn mixed_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*[ -]\s*(\d+)/(\d+)$").unwrap())
}

fn fraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)/(\d+)$").unwrap())
}

fn pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"({TOKEN})\s*[xX×]\s*({TOKEN})")).unwrap())
}

/// Normalize unicode primes so the core parsers only see ASCII.
fn normalize(s: &str) -> String {
    s.trim().replace('′', "'").replace('″', "\"")
}

/// Parse a bare inches string (`36`, `36 1/2`, `36-1/2`, `1/2`).
fn parse_bare_inches(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(caps) = mixed_number_re().captures(s) {
        let whole: f64 = caps[1].parse().ok()?;
        let num: f64 = caps[2].parse().ok()?;
        let den: f64 = caps[3].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(whole + num / den);
    }
    if let Some(caps) = fraction_re().captures(s) {
        let num: f64 = caps[1].parse().ok()?;
        let den: f64 = caps[2].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    s.parse::<f64>().ok()
}

/// Parse a single dimension token to inches.
///
/// Returns `None` when the string is not a dimension.
pub fn parse_inches(s: &str) -> Option<f64> {
    let s = normalize(s);

    if let Some(caps) = feet_inches_re().captures(&s) {
        let feet: f64 = caps[1].parse().ok()?;
        let inches = match caps.get(2) {
            Some(m) => parse_bare_inches(m.as_str())?,
            None => 0.0,
        };
        return Some(feet * 12.0 + inches);
    }

    parse_bare_inches(s.trim_end_matches('"').trim_end_matches('\'').trim())
}

/// Find the first `W x H` pair in a block of text.
pub fn parse_pair(text: &str) -> Option<(f64, f64)> {
    let text = normalize(text);
    let caps = pair_re().captures(&text)?;
    let w = parse_inches(&caps[1])?;
    let h = parse_inches(&caps[2])?;
    Some((w, h))
}

/// Labeled dimensions pulled out of a text block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabeledDims {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
}

fn labeled_res() -> &'static [(Regex, usize)] {
    // One entry per surface form, ordered: the word form of a label
    // outranks its single letter anywhere on the page, and labels fill
    // slots in width, height, depth, return order. `return` is an alias
    // for depth; single-letter labels require an explicit separator.
    static RES: OnceLock<Vec<(Regex, usize)>> = OnceLock::new();
    RES.get_or_init(|| {
        let forms: [(&str, usize); 7] = [
            (r"(?i)\bwidth\s*[:=]?\s*", 0),
            (r"(?i)\bw\s*[:=]\s*", 0),
            (r"(?i)\bheight\s*[:=]?\s*", 1),
            (r"(?i)\bh\s*[:=]\s*", 1),
            (r"(?i)\bdepth\s*[:=]?\s*", 2),
            (r"(?i)\bd\s*[:=]\s*", 2),
            (r"(?i)\breturn\s*[:=]?\s*", 2),
        ];
        forms
            .iter()
            .map(|(label, idx)| (Regex::new(&format!(r"{label}({TOKEN})")).unwrap(), *idx))
            .collect()
    })
}

/// Scan a block for labeled dimensions.
///
/// Forms are tried in declaration order; the first hit for a slot wins
/// and out-of-range values are discarded.
pub fn parse_labeled(text: &str) -> LabeledDims {
    let text = normalize(text);
    let mut out = [None; 3];

    for (re, idx) in labeled_res() {
        if out[*idx].is_some() {
            continue;
        }
        if let Some(caps) = re.captures(&text) {
            if let Some(v) = parse_inches(&caps[1]) {
                if (MIN_LABELED_IN..=MAX_LABELED_IN).contains(&v) {
                    out[*idx] = Some(v);
                }
            }
        }
    }

    LabeledDims {
        width: out[0],
        height: out[1],
        depth: out[2],
    }
}

fn fmt_num(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Display formatter: `None` → `TBV`, under a foot → `7"`, otherwise
/// feet-and-inches (`78` → `6'-6"`, `240` → `20'-0"`).
pub fn format_inches(value: Option<f64>) -> String {
    let v = match value {
        Some(v) => v,
        None => return "TBV".to_string(),
    };
    if v < 12.0 {
        return format!("{}\"", fmt_num(v));
    }
    let feet = (v / 12.0).floor();
    let inches = v - feet * 12.0;
    format!("{}'-{}\"", feet as i64, fmt_num(inches))
}
