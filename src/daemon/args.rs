//! Argument vector for the re-executed child.

use clap::Command;
use std::ffi::OsString;

/// Argument ids that only mean something to the launching parent.
///
/// The child already runs detached with reduced credentials, so forwarding
/// any of these would make it try to daemonize again.
pub const PARENT_ONLY_ARGS: &[&str] = &["daemonize", "verbose", "user", "group"];

struct Flag {
    short: Option<char>,
    long: Option<String>,
    takes_value: bool,
    parent_only: bool,
}

struct FlagTable(Vec<Flag>);

impl FlagTable {
    fn from_command(command: &Command) -> Self {
        let flags = command
            .get_arguments()
            .filter(|arg| !arg.is_positional())
            .map(|arg| Flag {
                short: arg.get_short(),
                long: arg.get_long().map(str::to_string),
                takes_value: arg.get_action().takes_values(),
                parent_only: PARENT_ONLY_ARGS.contains(&arg.get_id().as_str()),
            })
            .collect();
        Self(flags)
    }

    fn short(&self, c: char) -> Option<&Flag> {
        self.0.iter().find(|flag| flag.short == Some(c))
    }

    fn long(&self, name: &str) -> Option<&Flag> {
        self.0.iter().find(|flag| flag.long.as_deref() == Some(name))
    }
}

/// What to do with the argument following the one just handled.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Parse,
    Forward,
    Skip,
}

/// Strip parent-only flags, and their values, from `args` (without
/// `argv[0]`).
///
/// Flags are recognised in every form clap accepts: `-u name`, `-uname`,
/// `--user name`, `--user=name`, and inside short clusters such as `-dv`.
/// Everything after `--` is forwarded untouched.
pub fn child_args<I>(command: &Command, args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let flags = FlagTable::from_command(command);
    let mut kept = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let text = arg.to_str().map(str::to_owned);
        let next = match text.as_deref() {
            Some("--") => {
                kept.push(arg);
                kept.extend(args.by_ref());
                break;
            }
            Some(text) if text.starts_with("--") => filter_long(&flags, text, &mut kept),
            Some(text) if text.len() > 1 && text.starts_with('-') => {
                filter_short_cluster(&flags, &text[1..], &mut kept)
            }
            _ => {
                kept.push(arg);
                Next::Parse
            }
        };

        match next {
            Next::Parse => {}
            Next::Forward => kept.extend(args.next()),
            Next::Skip => {
                args.next();
            }
        }
    }

    kept
}

fn filter_long(flags: &FlagTable, text: &str, kept: &mut Vec<OsString>) -> Next {
    let (name, inline_value) = match text[2..].split_once('=') {
        Some((name, _)) => (name, true),
        None => (&text[2..], false),
    };

    match flags.long(name) {
        Some(flag) if flag.parent_only => {
            if flag.takes_value && !inline_value {
                Next::Skip
            } else {
                Next::Parse
            }
        }
        Some(flag) => {
            kept.push(text.into());
            if flag.takes_value && !inline_value {
                Next::Forward
            } else {
                Next::Parse
            }
        }
        None => {
            kept.push(text.into());
            Next::Parse
        }
    }
}

fn filter_short_cluster(flags: &FlagTable, cluster: &str, kept: &mut Vec<OsString>) -> Next {
    let mut retained = String::new();
    let mut next = Next::Parse;

    for (i, c) in cluster.char_indices() {
        let rest = &cluster[i + c.len_utf8()..];
        match flags.short(c) {
            Some(flag) if flag.parent_only => {
                if flag.takes_value {
                    // The rest of the cluster, or the next argument, is its value.
                    if rest.is_empty() {
                        next = Next::Skip;
                    }
                    break;
                }
            }
            Some(flag) if flag.takes_value => {
                retained.push(c);
                retained.push_str(rest);
                if rest.is_empty() {
                    next = Next::Forward;
                }
                break;
            }
            _ => retained.push(c),
        }
    }

    if !retained.is_empty() {
        kept.push(format!("-{retained}").into());
    }
    next
}
