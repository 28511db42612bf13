use anyhow::{Result, anyhow};

use crate::{cli::handlers, core::store::StoreOptions};

/// A command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &StoreOptions) -> Result<()>,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "resolve",
        aliases: &["get"],
        handler: handlers::resolve::handle,
    },
    CommandDefinition {
        name: "status",
        aliases: &["st"],
        handler: handlers::status::handle,
    },
    CommandDefinition {
        name: "set",
        aliases: &[],
        handler: handlers::edit::handle_set,
    },
    CommandDefinition {
        name: "unset",
        aliases: &["rm"],
        handler: handlers::edit::handle_unset,
    },
    CommandDefinition {
        name: "import",
        aliases: &[],
        handler: handlers::import::handle,
    },
    CommandDefinition {
        name: "backup",
        aliases: &["bk"],
        handler: handlers::backup::handle,
    },
    CommandDefinition {
        name: "version",
        aliases: &["ver"],
        handler: handlers::version::handle,
    },
    CommandDefinition {
        name: "undo",
        aliases: &[],
        handler: handlers::undo::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Routes `envkeep <command> [args...]` to its handler. Without a command the
/// status overview is shown.
pub fn dispatch(all_args: Vec<String>, options: &StoreOptions) -> Result<()> {
    log::debug!("Dispatching args: {:?}", all_args);

    let mut args = all_args.into_iter();
    let Some(name) = args.next() else {
        return handlers::status::handle(Vec::new(), options);
    };

    let command = find_command(&name).ok_or_else(|| {
        let known: Vec<&str> = COMMAND_REGISTRY.iter().map(|c| c.name).collect();
        anyhow!(
            t!("error.unknown_command"),
            name = name,
            known = known.join(", ")
        )
    })?;
    (command.handler)(args.collect(), options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_commands() {
        assert_eq!(find_command("bk").map(|c| c.name), Some("backup"));
        assert_eq!(find_command("get").map(|c| c.name), Some("resolve"));
        assert!(find_command("nope").is_none());
    }

    #[test]
    fn test_names_and_aliases_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for cmd in COMMAND_REGISTRY {
            assert!(seen.insert(cmd.name));
            for alias in cmd.aliases {
                assert!(seen.insert(*alias), "duplicate alias '{}'", alias);
            }
        }
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            root: Some(dir.path().to_path_buf()),
            environment: None,
        };
        let err = dispatch(vec!["frobnicate".into()], &options).unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }
}
