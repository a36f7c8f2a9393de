//! Scrubbing of free-text fields arriving over HTTP.
//!
//! Strips angle brackets, `javascript:` and inline `on…=` handler prefixes,
//! trims, and caps the result at [`MAX_LEN`] characters. Chat relayed over
//! the socket is not passed through here.

use std::sync::LazyLock;

use regex::Regex;

pub const MAX_LEN: usize = 500;

static SCRIPT_SCHEME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("literal pattern"));
static INLINE_HANDLER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)on\w+=").expect("literal pattern"));

pub fn text(input: &str) -> String {
  let mut out: String = input.chars().filter(|c| !matches!(c, '<' | '>')).collect();
  for pattern in [&*SCRIPT_SCHEME, &*INLINE_HANDLER] {
    out = pattern.replace_all(&out, "").into_owned();
  }
  out.trim().chars().take(MAX_LEN).collect()
}

/// [`text`] over an optional field, treating blank results as absent.
pub fn optional(input: Option<&str>) -> Option<String> {
  input.map(text).filter(|s| !s.is_empty())
}
