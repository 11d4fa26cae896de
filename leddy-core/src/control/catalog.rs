//! Control-line vocabulary expressed as a small grammar tree.
//!
//! The parser walks the same structure that `help` renders, so keywords and
//! usage text cannot drift apart.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    State,
    On,
    Button,
    Status,
    History,
    Help,
    Wait,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceTag {
    ButtonShort,
    ButtonLong,
    ButtonHold,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSpec {
    /// Bare word or integer, resolved by the command itself.
    Word {
        suggestions: &'static [&'static str],
    },
    Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub summary: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    Value {
        value: ValueSpec,
        next: &'static Node,
    },
    Choice(&'static [ChoiceBranch]),
    Topic {
        next: &'static Node,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChoiceBranch {
    pub keyword: &'static str,
    pub tag: ChoiceTag,
    pub next: &'static Node,
}

const END: Node = Node::End;

/// Keywords accepted by `state` besides the mode names.
pub const STATE_ACTIONS: [&str; 3] = ["step", "reset", "resume"];

const STATE_SUGGESTIONS: [&str; 7] = [
    "off",
    "sunny",
    "sunnyblue",
    "blue",
    "step",
    "reset",
    "resume",
];

const STATE_GRAMMAR: Node = Node::Value {
    value: ValueSpec::Word {
        suggestions: &STATE_SUGGESTIONS,
    },
    next: &END,
};

const BOOLEAN_SUGGESTIONS: [&str; 6] = ["true", "false", "on", "off", "1", "0"];

const ON_GRAMMAR: Node = Node::Value {
    value: ValueSpec::Word {
        suggestions: &BOOLEAN_SUGGESTIONS,
    },
    next: &END,
};

const BUTTON_CHOICES: [ChoiceBranch; 3] = [
    ChoiceBranch {
        keyword: "short",
        tag: ChoiceTag::ButtonShort,
        next: &END,
    },
    ChoiceBranch {
        keyword: "long",
        tag: ChoiceTag::ButtonLong,
        next: &END,
    },
    ChoiceBranch {
        keyword: "hold",
        tag: ChoiceTag::ButtonHold,
        next: &END,
    },
];

const BUTTON_GRAMMAR: Node = Node::Choice(&BUTTON_CHOICES);

const HELP_GRAMMAR: Node = Node::Topic { next: &END };

const WAIT_GRAMMAR: Node = Node::Value {
    value: ValueSpec::Duration,
    next: &END,
};

const COMMANDS: [CommandSpec; 7] = [
    CommandSpec {
        name: "state",
        tag: CommandTag::State,
        grammar: &STATE_GRAMMAR,
        summary: "walk the fixture to a mode, or step/reset/resume",
    },
    CommandSpec {
        name: "on",
        tag: CommandTag::On,
        grammar: &ON_GRAMMAR,
        summary: "resume the last mode (true) or switch off (false)",
    },
    CommandSpec {
        name: "button",
        tag: CommandTag::Button,
        grammar: &BUTTON_GRAMMAR,
        summary: "inject a classified button press",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        summary: "show mode, relay and cool-down state",
    },
    CommandSpec {
        name: "history",
        tag: CommandTag::History,
        grammar: &END,
        summary: "dump recent sequencer events",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        summary: "list commands or describe one",
    },
    CommandSpec {
        name: "wait",
        tag: CommandTag::Wait,
        grammar: &WAIT_GRAMMAR,
        summary: "advance simulated time (emulator only)",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::State => &COMMANDS[0],
        CommandTag::On => &COMMANDS[1],
        CommandTag::Button => &COMMANDS[2],
        CommandTag::Status => &COMMANDS[3],
        CommandTag::History => &COMMANDS[4],
        CommandTag::Help => &COMMANDS[5],
        CommandTag::Wait => &COMMANDS[6],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Renders the usage synopsis of a command (e.g. `button <short|long|hold>`).
pub struct Usage(pub &'static CommandSpec);

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)?;
        write_node(f, self.0.grammar)
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &'static Node) -> fmt::Result {
    match node {
        Node::End => Ok(()),
        Node::Value { value, next } => {
            match value {
                ValueSpec::Word { suggestions } => {
                    write_alternatives(f, suggestions.iter().copied())?;
                }
                ValueSpec::Duration => f.write_str(" <duration>")?,
            }
            write_node(f, next)
        }
        Node::Choice(choices) => {
            write_alternatives(f, choices.iter().map(|choice| choice.keyword))
        }
        Node::Topic { next } => {
            f.write_str(" [topic]")?;
            write_node(f, next)
        }
    }
}

fn write_alternatives<'a>(
    f: &mut fmt::Formatter<'_>,
    words: impl Iterator<Item = &'a str>,
) -> fmt::Result {
    f.write_str(" <")?;
    for (index, word) in words.enumerate() {
        if index > 0 {
            f.write_str("|")?;
        }
        f.write_str(word)?;
    }
    f.write_str(">")
}
