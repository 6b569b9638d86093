//! The command table: syntax, help text and constructor of every command.

mod keywords;
mod misc;
mod subscription;
mod teams;

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracker_common::internal;

pub use self::{
    keywords::{
        KeywordOperation, SetDefaultKeywords, SetPackageKeywords, ViewDefaultKeywords,
        ViewPackageKeywords,
    },
    misc::{Confirm, Help, Quit},
    subscription::{Subscribe, Unsubscribe, UnsubscribeAll, Which, Who},
    teams::{JoinTeam, LeaveTeam, ListTeamPackages, WhichTeams},
};
use crate::command::{Command, confirmable, plain};

const KEYWORD_ALIASES: &[&str] = &["keyword", "keywords", "tag", "tags"];

/// Builds a command from the captures of its pattern. `sender` fills in an
/// omitted email; without either the line is not a command.
type Build = fn(&Captures<'_>, Option<&str>) -> Option<Box<dyn Command>>;

struct CommandSpec {
    name: &'static str,
    aliases: &'static [&'static str],
    /// Pattern for everything after the command name.
    syntax: &'static str,
    /// Place in help output and matching order. Unpositioned commands go last.
    position: Option<u32>,
    description: &'static str,
    build: Build,
}

fn capture(captures: &Captures<'_>, name: &str) -> Option<String> {
    captures.name(name).map(|m| m.as_str().to_string())
}

fn email_or_sender(captures: &Captures<'_>, sender: Option<&str>) -> Option<String> {
    capture(captures, "email").or_else(|| sender.map(str::to_string))
}

const SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "subscribe",
        aliases: &[],
        syntax: r"\s+(?P<package>\S+)(?:\s+(?P<email>\S+@\S+))?$",
        position: Some(1),
        description: "subscribe <srcpackage> [<email>]\n  \
            Subscribes <email> to all messages regarding <srcpackage>. If\n  \
            <email> is not given, it subscribes the From address. If the\n  \
            <srcpackage> is not a valid source package, you'll get a warning.\n  \
            If it's a valid binary package, the mapping will automatically be\n  \
            done for you.",
        build: |c, sender| {
            Some(confirmable(Subscribe {
                package: capture(c, "package")?,
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "unsubscribe",
        aliases: &[],
        syntax: r"\s+(?P<package>\S+)(?:\s+(?P<email>\S+@\S+))?$",
        position: Some(2),
        description: "unsubscribe <srcpackage> [<email>]\n  \
            Unsubscribes <email> from <srcpackage>. Like the subscribe command,\n  \
            it will use the From address if <email> is not given.",
        build: |c, sender| {
            Some(confirmable(Unsubscribe {
                package: capture(c, "package")?,
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "confirm",
        aliases: &[],
        syntax: r"\s+(?P<key>\S+)$",
        position: Some(3),
        description: "confirm <confirmation-key>\n  \
            Confirm a previously requested action, such as subscribing or\n  \
            unsubscribing from a package.",
        build: |c, _| {
            Some(plain(Confirm {
                key: capture(c, "key")?,
            }))
        },
    },
    CommandSpec {
        name: "which",
        aliases: &[],
        syntax: r"(?:\s+(?P<email>\S+@\S+))?$",
        position: Some(4),
        description: "which [<email>]\n  \
            Tells you which packages <email> is subscribed to.",
        build: |c, sender| {
            Some(plain(Which {
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "help",
        aliases: &[],
        syntax: r"$",
        position: Some(5),
        description: "help\n  Shows all available commands",
        build: |_, _| Some(plain(Help)),
    },
    CommandSpec {
        name: "who",
        aliases: &[],
        syntax: r"\s+(?P<package>\S+)$",
        position: Some(5),
        description: "who <package>\n  \
            Outputs all the subscriber emails for the given package in\n  \
            an obfuscated form.",
        build: |c, _| {
            Some(plain(Who {
                package: capture(c, "package")?,
            }))
        },
    },
    CommandSpec {
        name: "quit",
        aliases: &["thanks", "--"],
        syntax: r"$",
        position: Some(6),
        description: "quit\n  Stops processing commands",
        build: |_, _| Some(plain(Quit)),
    },
    CommandSpec {
        name: "unsubscribeall",
        aliases: &[],
        syntax: r"(?:\s+(?P<email>\S+@\S+))?$",
        position: Some(7),
        description: "unsubscribeall [<email>]\n  \
            Cancel all subscriptions of <email>. Like the subscribe command,\n  \
            it will use the From address if <email> is not given.",
        build: |c, sender| {
            Some(confirmable(UnsubscribeAll {
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "view-default-keywords",
        aliases: KEYWORD_ALIASES,
        syntax: r"(?:\s+(?P<email>\S+@\S+))?$",
        position: Some(10),
        description: "keyword [<email>]\n  \
            Tells you the keywords you are accepting by default for packages\n  \
            with no specific keywords set.\n  \
            Each mail sent through the tracker is associated\n  \
            to a keyword and you receive only the mails associated to keywords\n  \
            you are accepting.\n  \
            You may select a different set of keywords for each package.",
        build: |c, sender| {
            Some(plain(ViewDefaultKeywords {
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "view-package-keywords",
        aliases: KEYWORD_ALIASES,
        syntax: r"\s+(?P<package>\S+)(?:\s+(?P<email>\S+@\S+))?$",
        position: Some(11),
        description: "keyword <srcpackage> [<email>]\n  \
            Tells you the keywords you are accepting for the given package.\n  \
            Each mail sent through the tracker is associated\n  \
            to a keyword and you receive only the mails associated to keywords\n  \
            you are accepting.\n  \
            You may select a different set of keywords for each package.",
        build: |c, sender| {
            Some(plain(ViewPackageKeywords {
                package: capture(c, "package")?,
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "set-default-keywords",
        aliases: KEYWORD_ALIASES,
        syntax: r"(?:\s+(?P<email>\S+@\S+))?\s+(?P<operation>[-+=])\s+(?P<keywords>\S+(?:\s+\S+)*)$",
        position: Some(12),
        description: "keyword [<email>] {+|-|=} <list of keywords>\n  \
            Accept (+) or refuse (-) mails associated to the given keyword(s).\n  \
            Define the list (=) of accepted keywords.\n  \
            These keywords are applied for subscriptions where no specific\n  \
            keyword set is given.",
        build: |c, sender| {
            Some(plain(SetDefaultKeywords {
                email: email_or_sender(c, sender)?,
                operation: KeywordOperation::parse(&capture(c, "operation")?)?,
                keywords: capture(c, "keywords")?,
            }))
        },
    },
    CommandSpec {
        name: "set-package-keywords",
        aliases: KEYWORD_ALIASES,
        syntax: r"\s+(?P<package>\S+)(?:\s+(?P<email>\S+@\S+))?\s+(?P<operation>[-+=])\s+(?P<keywords>\S+(?:\s+\S+)*)$",
        position: Some(13),
        description: "keyword <srcpackage> [<email>] {+|-|=} <list of keywords>\n  \
            Accept (+) or refuse (-) mails associated to the given keyword(s) for the\n  \
            given package.\n  \
            Define the list (=) of accepted keywords.\n  \
            These keywords take precedence over default keywords.",
        build: |c, sender| {
            Some(plain(SetPackageKeywords {
                package: capture(c, "package")?,
                email: email_or_sender(c, sender)?,
                operation: KeywordOperation::parse(&capture(c, "operation")?)?,
                keywords: capture(c, "keywords")?,
            }))
        },
    },
    CommandSpec {
        name: "join-team",
        aliases: &[],
        syntax: r"\s+(?P<slug>\S+)(?:\s+(?P<email>\S+@\S+))?$",
        position: None,
        description: "join-team <team-slug> [<email>]\n  \
            Adds <email> to team with the slug given by <team-slug>. If\n  \
            <email> is not given, it adds the From address email to the team.\n  \
            If the team is not public or it does not exist, a warning is\n  \
            returned.",
        build: |c, sender| {
            Some(confirmable(JoinTeam {
                slug: capture(c, "slug")?,
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "leave-team",
        aliases: &[],
        syntax: r"\s+(?P<slug>\S+)(?:\s+(?P<email>\S+@\S+))?$",
        position: None,
        description: "leave-team <team-slug> [<email>]\n  \
            Removes <email> from the team with the slug given by <team-slug>. If\n  \
            <email> is not given, it uses the From address email.\n  \
            If the user is not a member of the team, a warning is returned.",
        build: |c, sender| {
            Some(confirmable(LeaveTeam {
                slug: capture(c, "slug")?,
                email: email_or_sender(c, sender)?,
            }))
        },
    },
    CommandSpec {
        name: "list-team-packages",
        aliases: &[],
        syntax: r"\s+(?P<slug>\S+)$",
        position: None,
        description: "list-team-packages <team-slug>\n  \
            Lists all packages of the team with the slug given by <team-slug>.\n  \
            If the team is private, the packages are returned only if the From email\n  \
            is a member of the team.",
        build: |c, sender| {
            Some(plain(ListTeamPackages {
                slug: capture(c, "slug")?,
                requester: sender.map(str::to_string),
            }))
        },
    },
    CommandSpec {
        name: "which-teams",
        aliases: &[],
        syntax: r"(?:\s+(?P<email>\S+@\S+))?$",
        position: None,
        description: "which-teams [<email>]\n  \
            Lists all teams that <email> is a member of. If <email> is not given, the\n  \
            sender's email is used.",
        build: |c, sender| {
            Some(plain(WhichTeams {
                email: email_or_sender(c, sender)?,
            }))
        },
    },
];

struct CompiledSpec {
    spec: &'static CommandSpec,
    pattern: Regex,
}

/// Specs in matching order with their full, case insensitive patterns.
static TABLE: LazyLock<Vec<CompiledSpec>> = LazyLock::new(|| {
    let mut specs: Vec<&'static CommandSpec> = SPECS.iter().collect();
    specs.sort_by_key(|spec| (spec.position.unwrap_or(u32::MAX), spec.name));

    specs
        .into_iter()
        .filter_map(|spec| {
            let names = std::iter::once(spec.name)
                .chain(spec.aliases.iter().copied())
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("|");

            match Regex::new(&format!("(?i)^(?:{names}){}", spec.syntax)) {
                Ok(pattern) => Some(CompiledSpec { spec, pattern }),
                Err(e) => {
                    internal!(level = ERROR, "Invalid pattern for command {}: {e}", spec.name);
                    None
                }
            }
        })
        .collect()
});

/// The first command whose pattern matches `line`.
pub fn parse(line: &str, sender: Option<&str>) -> Option<Box<dyn Command>> {
    TABLE.iter().find_map(|compiled| {
        let captures = compiled.pattern.captures(line)?;
        (compiled.spec.build)(&captures, sender)
    })
}

/// Descriptions of every command, in help order.
pub fn descriptions() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|compiled| compiled.spec.description)
}
