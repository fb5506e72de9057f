//! Inline stage commands embedded in dialogue lines as `{...}` tokens.
//!
//! Supported tokens, scanned as independent families in this order:
//! 1. `{sprite:name:position[:expression]}`
//! 2. `{sprite_clear:position}` / `{sprite_clear:all}`
//! 3. `{expr:position:expression}`
//! 4. `{img_esquerda:name}` (legacy, left slot) / `{img_esquerda:}` (clear)
//! 5. `{img_clear}` (legacy, reported once per line)

use serde::{Deserialize, Serialize};

/// Slot used by the legacy `img_esquerda` token.
pub const LEGACY_POSITION: &str = "left";

/// A parsed stage command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageCommand {
    Add {
        character: String,
        position: String,
        expression: Option<String>,
    },
    Remove {
        position: String,
    },
    ClearAll,
    Expression {
        position: String,
        expression: String,
    },
}

impl StageCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StageCommand::Add { .. } => "add",
            StageCommand::Remove { .. } => "remove",
            StageCommand::ClearAll => "clear_all",
            StageCommand::Expression { .. } => "expression",
        }
    }
}

/// Token prefixes of the command families.
const COMMAND_PREFIXES: [&str; 4] = ["sprite:", "sprite_clear:", "expr:", "img_esquerda:"];

/// Stateless parser for stage command tokens.
pub struct CommandParser;

impl CommandParser {
    /// All commands in a line, grouped by family, left to right within a family.
    pub fn parse(line: &str) -> Vec<StageCommand> {
        let mut commands = Vec::new();
        scan_family(line, COMMAND_PREFIXES[0], parse_sprite, &mut commands);
        scan_family(line, COMMAND_PREFIXES[1], parse_clear, &mut commands);
        scan_family(line, COMMAND_PREFIXES[2], parse_expression, &mut commands);
        scan_family(line, COMMAND_PREFIXES[3], parse_legacy, &mut commands);
        if line.contains("{img_clear}") {
            commands.push(StageCommand::ClearAll);
        }
        commands
    }

    /// The line with every `{...}` span removed, trimmed.
    pub fn strip_commands(line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) if end > 0 => rest = &after[end + 1..],
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out.trim().to_string()
    }

    /// Whether the body of a `{...}` span belongs to a command family,
    /// well-formed or not.
    pub fn is_command_token(body: &str) -> bool {
        body == "img_clear" || COMMAND_PREFIXES.iter().any(|prefix| body.starts_with(prefix))
    }

    pub fn has_commands(line: &str) -> bool {
        spans(line).next().is_some()
    }

    /// True when nothing visible remains after stripping commands.
    pub fn is_command_only(line: &str) -> bool {
        Self::strip_commands(line).is_empty()
    }
}

/// Bodies of the non-empty `{...}` spans of a line.
fn spans(line: &str) -> impl Iterator<Item = &str> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = line[cursor..].find('{') {
            let body_start = cursor + offset + 1;
            match line[body_start..].find('}') {
                Some(len) if len > 0 => {
                    cursor = body_start + len + 1;
                    return Some(&line[body_start..body_start + len]);
                }
                _ => cursor = body_start,
            }
        }
        None
    })
}

/// Scan every `{` for `{<prefix>...}`. After a match the scan resumes past
/// the closing brace; otherwise at the next character.
fn scan_family(
    line: &str,
    prefix: &str,
    parse: fn(&str) -> Option<StageCommand>,
    commands: &mut Vec<StageCommand>,
) {
    let mut cursor = 0;
    while let Some(offset) = line[cursor..].find('{') {
        let body_start = cursor + offset + 1;
        let candidate = line[body_start..].find('}').and_then(|len| {
            let args = line[body_start..body_start + len].strip_prefix(prefix)?;
            parse(args).map(|command| (command, body_start + len + 1))
        });
        match candidate {
            Some((command, end)) => {
                commands.push(command);
                cursor = end;
            }
            None => cursor = body_start,
        }
    }
}

/// `name:position[:expression]`, each part non-empty before trimming.
fn parse_sprite(args: &str) -> Option<StageCommand> {
    let parts: Vec<&str> = args.split(':').collect();
    if !(2..=3).contains(&parts.len()) || parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    Some(StageCommand::Add {
        character: parts[0].trim().to_string(),
        position: parts[1].trim().to_string(),
        expression: parts
            .get(2)
            .map(|expression| expression.trim().to_string())
            .filter(|expression| !expression.is_empty()),
    })
}

fn parse_clear(args: &str) -> Option<StageCommand> {
    if args.is_empty() {
        return None;
    }
    match args.trim() {
        "all" => Some(StageCommand::ClearAll),
        position => Some(StageCommand::Remove {
            position: position.to_string(),
        }),
    }
}

/// `position:expression`; the expression may itself contain colons.
fn parse_expression(args: &str) -> Option<StageCommand> {
    let (position, expression) = args.split_once(':')?;
    if position.is_empty() || expression.is_empty() {
        return None;
    }
    Some(StageCommand::Expression {
        position: position.trim().to_string(),
        expression: expression.trim().to_string(),
    })
}

fn parse_legacy(args: &str) -> Option<StageCommand> {
    match args.trim() {
        "" => Some(StageCommand::ClearAll),
        name => Some(StageCommand::Add {
            character: name.to_string(),
            position: LEGACY_POSITION.to_string(),
            expression: None,
        }),
    }
}
