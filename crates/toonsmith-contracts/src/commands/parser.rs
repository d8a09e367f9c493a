use crate::backends::BackendVariant;
use crate::credentials::CredentialSource;
use crate::styles::ArtStyle;

use super::registry::find_command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Noop,
    Plan {
        style: Option<ArtStyle>,
        subject: String,
    },
    Edit {
        field: String,
        value: String,
    },
    Recompose,
    Image {
        backend: Option<BackendVariant>,
    },
    Show,
    Save {
        path: Option<String>,
    },
    Key {
        source: Option<CredentialSource>,
    },
    Verify,
    Styles,
    Help,
    Quit,
    /// Known command with arguments that do not parse.
    Invalid {
        command: String,
        reason: String,
    },
    Unknown {
        command: String,
    },
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    }
}

/// Free-form tail: a single quoted token is unwrapped, anything else is kept raw.
fn free_text(arg: &str) -> String {
    let trimmed = arg.trim();
    let parts = split_args(trimmed);
    if parts.len() == 1 {
        return parts[0].clone();
    }
    trimmed.to_string()
}

fn split_head(arg: &str) -> (&str, &str) {
    let trimmed = arg.trim();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].trim()),
        None => (trimmed, ""),
    }
}

fn parse_plan(arg: &str) -> SessionCommand {
    let (head, tail) = split_head(arg);
    if let Ok(style) = head.parse::<ArtStyle>() {
        if tail.is_empty() {
            return SessionCommand::Invalid {
                command: "plan".to_string(),
                reason: "missing subject".to_string(),
            };
        }
        return SessionCommand::Plan {
            style: Some(style),
            subject: free_text(tail),
        };
    }
    if arg.trim().is_empty() {
        return SessionCommand::Invalid {
            command: "plan".to_string(),
            reason: "missing subject".to_string(),
        };
    }
    SessionCommand::Plan {
        style: None,
        subject: free_text(arg),
    }
}

fn parse_edit(arg: &str) -> SessionCommand {
    let (field, value) = split_head(arg);
    if field.is_empty() {
        return SessionCommand::Invalid {
            command: "edit".to_string(),
            reason: "usage: /edit <field> <value...>".to_string(),
        };
    }
    SessionCommand::Edit {
        field: field.to_string(),
        value: free_text(value),
    }
}

pub fn parse_command(text: &str) -> SessionCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return SessionCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return SessionCommand::Plan {
            style: None,
            subject: raw_trimmed.to_string(),
        };
    };

    let (command, arg) = split_head(slash_tail);
    let command = command.to_ascii_lowercase();
    let Some(spec) = find_command(&command) else {
        return SessionCommand::Unknown { command };
    };

    match spec.command {
        "plan" => parse_plan(arg),
        "edit" => parse_edit(arg),
        "recompose" => SessionCommand::Recompose,
        "image" => {
            if arg.is_empty() {
                return SessionCommand::Image { backend: None };
            }
            match arg.parse::<BackendVariant>() {
                Ok(backend) => SessionCommand::Image {
                    backend: Some(backend),
                },
                Err(reason) => SessionCommand::Invalid {
                    command: spec.command.to_string(),
                    reason,
                },
            }
        }
        "show" => SessionCommand::Show,
        "save" => SessionCommand::Save {
            path: Some(free_text(arg)).filter(|path| !path.is_empty()),
        },
        "key" => {
            if arg.is_empty() {
                return SessionCommand::Key { source: None };
            }
            match arg.parse::<CredentialSource>() {
                Ok(source) => SessionCommand::Key {
                    source: Some(source),
                },
                Err(reason) => SessionCommand::Invalid {
                    command: spec.command.to_string(),
                    reason,
                },
            }
        }
        "verify" => SessionCommand::Verify,
        "styles" => SessionCommand::Styles,
        "help" => SessionCommand::Help,
        "quit" => SessionCommand::Quit,
        _ => SessionCommand::Unknown { command },
    }
}
