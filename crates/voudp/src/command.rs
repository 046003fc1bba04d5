//! Text commands from consoles and clients.
//!
//! The engine only transports command lines and their answers; what a
//! command does is up to the [`CommandHandler`] the server was built with.
//! [`CommandRegistry`] is a ready-made handler that maps names (and
//! aliases) to closures.

use std::collections::HashMap;
use std::net::SocketAddr;

use voudp_protocol::{ChannelId, CommandEntry, SessionId};

/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invoker {
    /// A registered administration console.
    Console { addr: SocketAddr },
    /// A voice client, via `ConsoleCommand` (0x0d).
    Client {
        addr: SocketAddr,
        session: SessionId,
        mask: String,
        channel: Option<ChannelId>,
    },
}

impl Invoker {
    pub fn addr(&self) -> SocketAddr {
        match self {
            Invoker::Console { addr } | Invoker::Client { addr, .. } => *addr,
        }
    }

    pub fn is_console(&self) -> bool {
        matches!(self, Invoker::Console { .. })
    }
}

/// The answer to one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Sent back as `CommandReply`.
    Reply(String),
    /// Sent back as `CommandError`.
    Error(String),
    /// Nothing is sent back.
    Silent,
}

/// Executes command lines and describes the available commands.
pub trait CommandHandler: Send + Sync + 'static {
    fn execute(&self, invoker: &Invoker, line: &str) -> CommandOutcome;

    /// Commands `invoker` may use, sent to clients in answer to
    /// `SyncCommands`.
    fn catalog(&self, invoker: &Invoker) -> Vec<CommandEntry>;
}

/// Refuses every command. The default when no handler is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommands;

impl CommandHandler for NoCommands {
    fn execute(&self, _invoker: &Invoker, _line: &str) -> CommandOutcome {
        CommandOutcome::Error("this server accepts no commands".into())
    }

    fn catalog(&self, _invoker: &Invoker) -> Vec<CommandEntry> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// CommandRegistry
// ---------------------------------------------------------------------------

/// A command body: gets the invoker and the whitespace-split arguments
/// (without the command name).
pub type CommandFn = Box<dyn Fn(&Invoker, &[&str]) -> CommandOutcome + Send + Sync>;

struct Registered {
    entry: CommandEntry,
    console_only: bool,
    run: CommandFn,
}

/// Name → closure command table.
///
/// # Example
///
/// ```rust
/// use voudp::{CommandHandler, CommandOutcome, CommandRegistry, Invoker};
/// use voudp::CommandEntry;
///
/// let mut commands = CommandRegistry::new();
/// commands.register(
///     CommandEntry {
///         name: "ping".into(),
///         description: "Check the server is alive".into(),
///         usage: "ping".into(),
///         ..Default::default()
///     },
///     |_, _| CommandOutcome::Reply("pong".into()),
/// );
///
/// let console = Invoker::Console { addr: "127.0.0.1:9".parse().unwrap() };
/// assert_eq!(commands.execute(&console, "ping"), CommandOutcome::Reply("pong".into()));
/// ```
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Registered>,
    aliases: HashMap<String, String>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command available to consoles and clients alike. The entry's
    /// aliases resolve to it too. Registering a name again replaces it.
    pub fn register(
        &mut self,
        entry: CommandEntry,
        run: impl Fn(&Invoker, &[&str]) -> CommandOutcome + Send + Sync + 'static,
    ) {
        self.insert(entry, false, Box::new(run));
    }

    /// Adds a command only consoles may run. Clients never see it in their
    /// catalog.
    pub fn register_console_only(
        &mut self,
        entry: CommandEntry,
        run: impl Fn(&Invoker, &[&str]) -> CommandOutcome + Send + Sync + 'static,
    ) {
        self.insert(entry, true, Box::new(run));
    }

    fn insert(&mut self, entry: CommandEntry, console_only: bool, run: CommandFn) {
        for alias in &entry.aliases {
            self.aliases.insert(alias.clone(), entry.name.clone());
        }
        self.commands.insert(
            entry.name.clone(),
            Registered {
                entry,
                console_only,
                run,
            },
        );
    }

    fn resolve(&self, name: &str) -> Option<&Registered> {
        self.commands.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|target| self.commands.get(target))
        })
    }
}

impl CommandHandler for CommandRegistry {
    fn execute(&self, invoker: &Invoker, line: &str) -> CommandOutcome {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return CommandOutcome::Error("empty command".into());
        };
        let args: Vec<&str> = parts.collect();

        match self.resolve(name) {
            Some(command) if command.console_only && !invoker.is_console() => {
                CommandOutcome::Error(format!("{name}: consoles only"))
            }
            Some(command) => (command.run)(invoker, &args),
            None => CommandOutcome::Error(format!("unknown command: {name}")),
        }
    }

    fn catalog(&self, invoker: &Invoker) -> Vec<CommandEntry> {
        let mut entries: Vec<CommandEntry> = self
            .commands
            .values()
            .filter(|command| invoker.is_console() || !command.console_only)
            .map(|command| command.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, aliases: &[&str]) -> CommandEntry {
        CommandEntry {
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    fn console() -> Invoker {
        Invoker::Console {
            addr: "127.0.0.1:9000".parse().unwrap(),
        }
    }

    fn client() -> Invoker {
        Invoker::Client {
            addr: "127.0.0.1:9001".parse().unwrap(),
            session: SessionId(4),
            mask: "alice".into(),
            channel: Some(ChannelId(1)),
        }
    }

    fn registry() -> CommandRegistry {
        let mut commands = CommandRegistry::new();
        commands.register(entry("echo", &["say"]), |_, args| {
            CommandOutcome::Reply(args.join(" "))
        });
        commands.register(entry("whoami", &[]), |invoker, _| match invoker {
            Invoker::Client { mask, .. } => CommandOutcome::Reply(mask.clone()),
            Invoker::Console { .. } => CommandOutcome::Reply("console".into()),
        });
        commands.register_console_only(entry("shutdown", &[]), |_, _| CommandOutcome::Silent);
        commands
    }

    #[test]
    fn test_no_commands_refuses_everything() {
        assert!(matches!(
            NoCommands.execute(&console(), "help"),
            CommandOutcome::Error(_)
        ));
        assert!(NoCommands.catalog(&client()).is_empty());
    }

    #[test]
    fn test_execute_passes_arguments() {
        assert_eq!(
            registry().execute(&console(), "echo hello  world"),
            CommandOutcome::Reply("hello world".into())
        );
    }

    #[test]
    fn test_execute_resolves_alias() {
        assert_eq!(
            registry().execute(&client(), "say hi"),
            CommandOutcome::Reply("hi".into())
        );
    }

    #[test]
    fn test_execute_sees_invoker() {
        assert_eq!(
            registry().execute(&client(), "whoami"),
            CommandOutcome::Reply("alice".into())
        );
    }

    #[test]
    fn test_execute_unknown_returns_error() {
        assert_eq!(
            registry().execute(&console(), "nope"),
            CommandOutcome::Error("unknown command: nope".into())
        );
        assert!(matches!(
            registry().execute(&console(), "   "),
            CommandOutcome::Error(_)
        ));
    }

    #[test]
    fn test_execute_console_only_from_client_returns_error() {
        let commands = registry();
        assert!(matches!(
            commands.execute(&client(), "shutdown"),
            CommandOutcome::Error(_)
        ));
        assert_eq!(commands.execute(&console(), "shutdown"), CommandOutcome::Silent);
    }

    #[test]
    fn test_catalog_hides_console_only_from_clients() {
        let commands = registry();
        let names = |entries: Vec<CommandEntry>| -> Vec<String> {
            entries.into_iter().map(|e| e.name).collect()
        };
        assert_eq!(names(commands.catalog(&client())), vec!["echo", "whoami"]);
        assert_eq!(
            names(commands.catalog(&console())),
            vec!["echo", "shutdown", "whoami"]
        );
    }
}
