/// Which interactive loop a command is available in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    Single,
    Multichat,
}

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub single: bool,
    pub multichat: bool,
}

impl Command {
    pub fn available_in(&self, mode: CommandMode) -> bool {
        match mode {
            CommandMode::Single => self.single,
            CommandMode::Multichat => self.multichat,
        }
    }
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str, mode: CommandMode) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name) && command.available_in(mode))
}

/// Help text for every command available in `mode`.
pub fn help_text(mode: CommandMode) -> String {
    let mut lines = vec!["Commands:".to_string()];
    for command in all_commands().iter().filter(|c| c.available_in(mode)) {
        lines.push(format!("  {:<26} {}", command.usage, command.help));
    }
    if mode == CommandMode::Multichat {
        lines.push(format!(
            "  {:<26} {}",
            "/ai <gpt|gem> [prompt]", "Address one model; without a prompt it continues."
        ));
        lines.push("  Anything else is sent to both models.".to_string());
    }
    lines.join("\n")
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        single: true,
        multichat: true,
    },
    Command {
        name: "exit",
        usage: "/exit [name]",
        help: "Leave, updating memory and naming the transcript.",
        single: true,
        multichat: true,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave without updating memory or renaming.",
        single: true,
        multichat: true,
    },
    Command {
        name: "stream",
        usage: "/stream [on|off]",
        help: "Toggle or set streaming output.",
        single: true,
        multichat: false,
    },
    Command {
        name: "debug",
        usage: "/debug [on|off]",
        help: "Toggle or set raw API logging.",
        single: true,
        multichat: true,
    },
    Command {
        name: "max-tokens",
        usage: "/max-tokens [n|off]",
        help: "Show or set the response token limit.",
        single: true,
        multichat: true,
    },
    Command {
        name: "model",
        usage: "/model [name]",
        help: "List models or switch to another model.",
        single: true,
        multichat: false,
    },
    Command {
        name: "model",
        usage: "/model <engine> <name>",
        help: "Change the model used for one engine.",
        single: false,
        multichat: true,
    },
    Command {
        name: "engine",
        usage: "/engine [openai|gemini]",
        help: "Switch provider, translating the history.",
        single: true,
        multichat: false,
    },
    Command {
        name: "history",
        usage: "/history",
        help: "Print the conversation so far.",
        single: true,
        multichat: true,
    },
    Command {
        name: "state",
        usage: "/state",
        help: "Show session settings and token counts.",
        single: true,
        multichat: true,
    },
    Command {
        name: "forget",
        usage: "/forget [n]",
        help: "Drop the last n exchanges (default 1).",
        single: true,
        multichat: false,
    },
    Command {
        name: "clear",
        usage: "/clear",
        help: "Start the conversation over.",
        single: true,
        multichat: true,
    },
    Command {
        name: "save",
        usage: "/save <name> [--stay] [--remember]",
        help: "Save, then exit unless --stay; --remember updates memory.",
        single: true,
        multichat: true,
    },
    Command {
        name: "load",
        usage: "/load <name>",
        help: "Replace this session with a saved one.",
        single: true,
        multichat: false,
    },
    Command {
        name: "image",
        usage: "/image <prompt>",
        help: "Generate an image with the OpenAI image model.",
        single: true,
        multichat: false,
    },
    Command {
        name: "memory",
        usage: "/memory",
        help: "Show the persistent memory.",
        single: true,
        multichat: true,
    },
    Command {
        name: "remember",
        usage: "/remember [fact]",
        help: "Add a fact to memory, or fold in this conversation.",
        single: true,
        multichat: true,
    },
    Command {
        name: "persona",
        usage: "/persona <name|clear>",
        help: "Switch to a persona, or drop the current one.",
        single: true,
        multichat: false,
    },
    Command {
        name: "personas",
        usage: "/personas",
        help: "List installed personas.",
        single: true,
        multichat: false,
    },
];
