//! Trigger-phrase parsing.
//!
//! A submission is triggered by mentioning the bot account in a comment:
//! `@benchbot runbenchmarks("linalg" || "sort", vs = "acme/base:master")`.
//! The argument list is split into positional arguments (forwarded
//! verbatim, e.g. the tag predicate) and `key = value` keyword arguments.

use std::collections::HashMap;

use benchbot_core::TriggerArgs;

/// Scan a comment body for a trigger phrase aimed at `bot`.
///
/// Returns `None` when the bot is not mentioned or no command follows the
/// mention. Argument errors (an unbalanced list) also yield `None`; deeper
/// validation of the arguments happens at job construction.
pub fn parse_trigger(body: &str, bot: &str) -> Option<TriggerArgs> {
    // ASCII-case-insensitive search keeps byte offsets stable even when
    // the surrounding comment contains multi-byte characters.
    let mention = format!("@{bot}").to_ascii_lowercase();
    let at = body.to_ascii_lowercase().find(&mention)?;

    let rest = body[at + mention.len()..].trim_start();
    let command: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if command.is_empty() {
        return None;
    }

    let after = rest[command.len()..].trim_start();
    let (positional, keyword) = if after.starts_with('(') {
        let list = balanced_parens(after)?;
        split_args(list)?
    } else {
        (Vec::new(), HashMap::new())
    };

    Some(TriggerArgs {
        command,
        positional,
        keyword,
    })
}

/// Return the text between the leading `(` and its matching `)`,
/// honoring nesting and string literals.
fn balanced_parens(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split an argument list on top-level commas and separate `key = value`
/// pairs from positional arguments.
fn split_args(list: &str) -> Option<(Vec<String>, HashMap<String, String>)> {
    let mut positional = Vec::new();
    let mut keyword = HashMap::new();

    for piece in top_level_split(list) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match keyword_pair(piece) {
            Some((key, value)) => {
                keyword.insert(key.to_string(), unquote(value).to_string());
            }
            None => positional.push(piece.to_string()),
        }
    }
    Some((positional, keyword))
}

fn top_level_split(list: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                pieces.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&list[start..]);
    pieces
}

/// `ident = value` at the top level; anything else is positional.
fn keyword_pair(piece: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = piece.split_once('=')?;
    let key = lhs.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, rhs.trim()))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
