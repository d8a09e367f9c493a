#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub command: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
}

impl CommandSpec {
    pub(crate) fn matches(&self, command: &str) -> bool {
        self.command == command || self.aliases.iter().any(|alias| *alias == command)
    }
}

pub const SESSION_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "plan",
        aliases: &["new"],
        usage: "/plan [style] <subject...>",
        summary: "synthesize a fresh plan (bare text works too)",
    },
    CommandSpec {
        command: "edit",
        aliases: &["set"],
        usage: "/edit <field> <value...>",
        summary: "replace one plan field",
    },
    CommandSpec {
        command: "recompose",
        aliases: &["prompt"],
        usage: "/recompose",
        summary: "rebuild the image prompt from the edited plan",
    },
    CommandSpec {
        command: "image",
        aliases: &["render", "draw"],
        usage: "/image [fast|pro|alternate]",
        summary: "render the current prompt",
    },
    CommandSpec {
        command: "show",
        aliases: &["plan?"],
        usage: "/show",
        summary: "print the current plan",
    },
    CommandSpec {
        command: "save",
        aliases: &[],
        usage: "/save [path]",
        summary: "write the plan (and last image) to disk",
    },
    CommandSpec {
        command: "key",
        aliases: &["source"],
        usage: "/key [user|platform]",
        summary: "show or switch the active API key source",
    },
    CommandSpec {
        command: "verify",
        aliases: &[],
        usage: "/verify",
        summary: "check the active API key",
    },
    CommandSpec {
        command: "styles",
        aliases: &[],
        usage: "/styles",
        summary: "list art styles",
    },
    CommandSpec {
        command: "help",
        aliases: &["?"],
        usage: "/help",
        summary: "list commands",
    },
    CommandSpec {
        command: "quit",
        aliases: &["exit", "q"],
        usage: "/quit",
        summary: "leave the session",
    },
];

pub fn find_command(command: &str) -> Option<&'static CommandSpec> {
    SESSION_COMMANDS.iter().find(|spec| spec.matches(command))
}

/// `/help` text, one command per line.
pub fn help_lines() -> Vec<String> {
    let width = SESSION_COMMANDS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    SESSION_COMMANDS
        .iter()
        .map(|spec| format!("{:width$}  {}", spec.usage, spec.summary))
        .collect()
}
