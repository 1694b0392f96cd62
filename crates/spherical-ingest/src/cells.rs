//! Single-cell interpretation: availability markers, multi-value splitting,
//! per-configuration disambiguation, and structured value parsing.

use spherical_core::{
  fact::{Availability, SpecValue},
  variant::PowertrainConfig,
};

/// Cell contents meaning "not fitted", compared case-insensitively.
const NEGATIVE_MARKERS: &[&str] = &[
  "", "-", "–", "—", "n", "no", "x", "✗", "✕", "×", "na", "n/a", "not available",
];

/// Cell contents meaning "available at extra cost", compared
/// case-insensitively.
const OPTIONAL_MARKERS: &[&str] = &["o", "opt", "opt.", "(o)"];

// ─── Availability ────────────────────────────────────────────────────────────

/// Map a (disambiguated) cell to an availability state. Never returns
/// [`Availability::NotMentioned`].
pub fn classify_availability(cell: &str) -> Availability {
  let t = cell.trim().to_lowercase();
  if NEGATIVE_MARKERS.contains(&t.as_str()) {
    Availability::NotAvailable
  } else if OPTIONAL_MARKERS.contains(&t.as_str()) || t.contains("optional") {
    Availability::Optional
  } else {
    Availability::Standard
  }
}

fn is_marker(cell: &str) -> bool {
  let t = cell.trim().to_lowercase();
  NEGATIVE_MARKERS.contains(&t.as_str()) || OPTIONAL_MARKERS.contains(&t.as_str())
}

// ─── Multi-value cells ───────────────────────────────────────────────────────

/// Split a cell holding several configuration-specific values, e.g.
/// `32 (Petrol) / 60 (Water equivalent)` or `1,000\n1,200`.
///
/// Newlines always split. A slash splits unless it sits between two
/// lowercase letters, which keeps units like `km/l` intact, or joins two
/// numbers that the text goes on to qualify, as in `195/55 R16` or
/// `1197/998 cc`.
pub fn split_multi_value(cell: &str) -> Vec<String> {
  let mut parts = Vec::new();
  for line in cell.split('\n') {
    let chars: Vec<char> = line.chars().collect();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
      let unit_slash = c == '/'
        && i > 0
        && chars[i - 1].is_lowercase()
        && chars.get(i + 1).is_some_and(|n| n.is_lowercase());
      if c == '/' && !unit_slash && !is_compound_number(&chars, i) {
        parts.push(std::mem::take(&mut current));
      } else {
        current.push(c);
      }
    }
    parts.push(current);
  }
  parts
    .into_iter()
    .map(|p| p.trim().to_owned())
    .filter(|p| !p.is_empty())
    .collect()
}

/// The slash at `i` sits tight between two digits and the number after it
/// runs straight into more words.
fn is_compound_number(chars: &[char], i: usize) -> bool {
  if i == 0 || !chars[i - 1].is_ascii_digit() {
    return false;
  }
  let mut j = i + 1;
  if !chars.get(j).is_some_and(char::is_ascii_digit) {
    return false;
  }
  while chars.get(j).is_some_and(|c| c.is_ascii_digit() || *c == '.') {
    j += 1;
  }
  while chars.get(j).is_some_and(|c| *c == ' ') {
    j += 1;
  }
  chars.get(j).is_some_and(|c| c.is_alphanumeric())
}

/// The part of `cell` that applies to `config`: the first sub-value naming
/// the configuration's fuel, engine, or transmission (in that priority),
/// else the first sub-value. Bare markers such as `N/A` are never split.
pub fn disambiguate(cell: &str, config: &PowertrainConfig) -> String {
  let trimmed = cell.trim();
  if is_marker(trimmed) {
    return trimmed.to_owned();
  }
  let parts = split_multi_value(trimmed);
  if parts.len() <= 1 {
    return parts.into_iter().next().unwrap_or_default();
  }
  for token in config.match_tokens() {
    if let Some(part) = parts.iter().find(|p| contains_token(p, token)) {
      return part.clone();
    }
  }
  parts.into_iter().next().unwrap_or_default()
}

/// Case-insensitive whole-token containment: `MT` matches `1.2L MT` but not
/// `AMT`.
fn contains_token(text: &str, token: &str) -> bool {
  let text = text.to_lowercase();
  let token = token.to_lowercase();
  text.match_indices(&token).any(|(start, _)| {
    let before = text[..start].chars().next_back();
    let after = text[start + token.len()..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
  })
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// Parse cell text into a structured value.
///
/// A leading number (thousands separators allowed) followed by nothing, or
/// by a digit-free unit, becomes [`SpecValue::Numeric`]; parenthesised
/// qualifiers are dropped from the unit. Units glued to the number must be
/// lowercase (`1197cc`), so codes like `2WD` stay text. Everything else is
/// [`SpecValue::Text`]; blank input is [`SpecValue::Empty`].
pub fn parse_value(text: &str) -> SpecValue {
  let t = text.trim();
  if t.is_empty() {
    return SpecValue::Empty;
  }
  parse_numeric(t).unwrap_or_else(|| SpecValue::text(t))
}

fn parse_numeric(t: &str) -> Option<SpecValue> {
  let (number, rest) = split_leading_number(t)?;
  let value: f64 = number.replace(',', "").parse().ok()?;

  let glued = rest.chars().next().is_some_and(char::is_alphabetic);
  if glued && rest.chars().any(char::is_uppercase) {
    return None;
  }
  if !glued && !rest.is_empty() && !rest.starts_with([' ', '(', '\t']) {
    return None;
  }

  let unit = strip_parenthesised(rest);
  if unit.chars().any(|c| c.is_ascii_digit()) {
    return None;
  }
  let unit = unit.split_whitespace().collect::<Vec<_>>().join(" ");
  Some(SpecValue::Numeric {
    value,
    unit: (!unit.is_empty()).then_some(unit),
  })
}

/// `("1,000", " kg")` for `"1,000 kg"`. Commas only count between digits.
fn split_leading_number(t: &str) -> Option<(&str, &str)> {
  let bytes = t.as_bytes();
  let mut end = 0;
  if bytes.first() == Some(&b'-') {
    end = 1;
  }
  let digits_start = end;
  let mut seen_dot = false;
  while end < bytes.len() {
    let b = bytes[end];
    let next_is_digit = bytes.get(end + 1).is_some_and(u8::is_ascii_digit);
    match b {
      b'0'..=b'9' => end += 1,
      b',' if end > digits_start && next_is_digit && !seen_dot => end += 1,
      b'.' if end > digits_start && next_is_digit && !seen_dot => {
        seen_dot = true;
        end += 1;
      }
      _ => break,
    }
  }
  if end == digits_start {
    return None;
  }
  Some((&t[..end], &t[end..]))
}

fn strip_parenthesised(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut depth = 0usize;
  for c in s.chars() {
    match c {
      '(' => depth += 1,
      ')' => depth = depth.saturating_sub(1),
      _ if depth == 0 => out.push(c),
      _ => {}
    }
  }
  out.trim().to_owned()
}
