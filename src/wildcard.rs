//! Wildcard resolution for `{a|b|c}` alternative groups.
//!
//! A pure string transformation with no coupling to the download engine:
//! groups may nest (`{a|{b|c}}`), `|` splits options only at the top level
//! of a group, and backslash escapes (`\{`, `\|`, `\}`) produce literal
//! characters. An unmatched `{` is kept as a literal character and the
//! rest of the string is processed normally.
//!
//! Randomness is injected by the caller, so resolution is reproducible
//! under a seeded RNG and fresh under an entropy-seeded one.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Resolves every alternative group in `input`, picking options with `rng`.
///
/// Nested groups inside the picked option are resolved recursively; options
/// that were not picked are never evaluated.
pub fn expand<R: Rng + ?Sized>(input: &str, rng: &mut R) -> String {
    let chars: Vec<char> = input.chars().collect();
    expand_slice(&chars, rng)
}

/// Resolves alternative groups with an RNG seeded from `seed`.
///
/// The same `(input, seed)` pair always produces the same output.
#[must_use]
pub fn expand_seeded(input: &str, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    expand(input, &mut rng)
}

fn expand_slice<R: Rng + ?Sized>(s: &[char], rng: &mut R) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            '\\' => {
                // Escape sequence: keep the next char literally if present
                if i + 1 < s.len() {
                    out.push(s[i + 1]);
                    i += 2;
                } else {
                    out.push('\\');
                    i += 1;
                }
            }
            '{' => {
                if let Some((options, close)) = read_group(s, i + 1) {
                    let picked = options.choose(rng).cloned().unwrap_or_default();
                    out.push_str(&expand_slice(&picked, rng));
                    i = close + 1;
                } else {
                    out.push('{');
                    i += 1;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Reads from `s[start..]` until the matching `}` at depth 0, splitting
/// options on `|` only at depth 0 and preserving escape sequences verbatim
/// for the recursive pass. Returns the options and the index of the closing
/// brace, or `None` when the group never closes.
fn read_group(s: &[char], start: usize) -> Option<(Vec<Vec<char>>, usize)> {
    let mut options = Vec::new();
    let mut buf: Vec<char> = Vec::new();
    let mut depth = 0usize;
    let mut i = start;

    while i < s.len() {
        let c = s[i];
        if c == '\\' {
            buf.push(c);
            if i + 1 < s.len() {
                buf.push(s[i + 1]);
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }
        match c {
            '{' => {
                depth += 1;
                buf.push(c);
            }
            '}' if depth == 0 => {
                options.push(buf);
                return Some((options, i));
            }
            '}' => {
                depth -= 1;
                buf.push(c);
            }
            '|' if depth == 0 => {
                options.push(std::mem::take(&mut buf));
            }
            other => buf.push(other),
        }
        i += 1;
    }

    None
}
