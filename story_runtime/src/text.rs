//! Placeholder substitution for dialogue lines.
//!
//! Names to be coloured by the host are wrapped in `<...>`.

use std::collections::HashMap;

use crate::commands::CommandParser;

/// Placeholder replaced by the player's name.
pub const PLAYER_PLACEHOLDER: &str = "[nome_jogador]";

/// Speaker tokens naming the player, compared lowercase.
pub const PLAYER_SPEAKER_TOKENS: [&str; 3] = ["nome_jogador", "nome_player", "player_name"];

/// Lowercase and map anything outside `[a-z0-9]` to `_`.
pub fn normalize_token(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect()
}

/// Resolve the placeholders of a line whose commands were already stripped.
///
/// - `[nome_jogador]` (any case) becomes the player name
/// - `[token]` matching a known character name (after [`normalize_token`])
///   becomes `<Name>`; unknown tokens are kept verbatim
/// - bare occurrences of the player name are wrapped as `<Name>`
pub fn replace_placeholders<'a>(
    line: &str,
    player_name: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> String {
    let by_token: HashMap<String, &str> = names
        .into_iter()
        .map(|name| (normalize_token(name), name))
        .collect();

    let text = replace_ignore_ascii_case(line, PLAYER_PLACEHOLDER, player_name);
    let text = replace_tokens(&text, &by_token);
    wrap_bare_name(&text, player_name)
}

/// Split a leading speaker token off a line: `{Yuno}: Hello` gives
/// `("Yuno", "Hello")`. The colon is optional. Command spans before the token
/// are skipped, and a line whose first non-command span is not at the start
/// has no speaker.
pub fn split_speaker(line: &str) -> Option<(&str, &str)> {
    let mut rest = line.trim_start();
    loop {
        let open = rest.strip_prefix('{')?;
        let end = open.find('}')?;
        let token = &open[..end];
        let tail = open[end + 1..].trim_start();
        if token.is_empty() {
            return None;
        }
        if CommandParser::is_command_token(token) {
            rest = tail;
            continue;
        }
        let dialogue = tail.strip_prefix(':').unwrap_or(tail).trim_start();
        return Some((token.trim(), dialogue));
    }
}

/// Display name for a speaker token: the player for the player tokens,
/// else the character whose [`normalize_token`] form matches.
pub fn resolve_speaker<'a>(
    token: &str,
    player_name: &'a str,
    names: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let lowered = token.to_lowercase();
    if PLAYER_SPEAKER_TOKENS.contains(&lowered.as_str()) {
        return Some(player_name);
    }
    let wanted = normalize_token(token);
    names.into_iter().find(|name| normalize_token(name) == wanted)
}

fn replace_ignore_ascii_case(text: &str, pattern: &str, replacement: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let haystack = text.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in haystack.match_indices(&pattern) {
        out.push_str(&text[last..start]);
        out.push_str(replacement);
        last = start + pattern.len();
    }
    out.push_str(&text[last..]);
    out
}

fn replace_tokens(text: &str, by_token: &HashMap<String, &str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(']') {
            Some(end) if end > 0 => {
                let token = &after[..end];
                match by_token.get(&normalize_token(token)) {
                    Some(name) => {
                        out.push('<');
                        out.push_str(name);
                        out.push('>');
                    }
                    None => out.push_str(&rest[start..start + end + 2]),
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Wrap occurrences of `name` that are not already wrapped.
fn wrap_bare_name(text: &str, name: &str) -> String {
    if name.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 2);
    let mut last = 0;
    for (start, _) in text.match_indices(name) {
        let end = start + name.len();
        let wrapped = text[..start].ends_with('<') && text[end..].starts_with('>');
        out.push_str(&text[last..start]);
        if wrapped {
            out.push_str(name);
        } else {
            out.push('<');
            out.push_str(name);
            out.push('>');
        }
        last = end;
    }
    out.push_str(&text[last..]);
    out
}
