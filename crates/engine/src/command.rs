//! The `recover` operator command.

use crate::scheduler::RecoveryScheduler;
use blastmend_common::Material;
use blastmend_config::ConfigStore;
use blastmend_recovery::DrainLimit;
use std::sync::Arc;

pub const PERM_COMMAND: &str = "blastmend.command";
pub const PERM_ADMIN: &str = "blastmend.admin";
pub const PERM_DEBUG: &str = "blastmend.debug";

const NO_PERMISSION: &str = "You don't have permission to do that.";
const FIX_USAGE: &str = "Usage: /recover fix <amount|all>";
const PROTECTED_USAGE: &str = "Usage: /recover protected <list|add|remove> [material]";
const DEBUG_USAGE: &str = "Usage: /recover debug [enable|disable]";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Whoever invoked the command.
pub trait CommandSender: Send + Sync {
    fn name(&self) -> &str;
    fn has_permission(&self, permission: &str) -> bool;
}

/// The server console. Holds every permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSender;

impl CommandSender for ConsoleSender {
    fn name(&self) -> &str {
        "CONSOLE"
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverCommand {
    Help,
    Fix(DrainLimit),
    Reload,
    Stats,
    ProtectedList,
    ProtectedAdd(Material),
    ProtectedRemove(Material),
    DebugStatus,
    DebugSet(bool),
}

impl RecoverCommand {
    /// Permission needed beyond the base command permission.
    pub fn permission(&self) -> Option<&'static str> {
        match self {
            Self::ProtectedList | Self::ProtectedAdd(_) | Self::ProtectedRemove(_) => {
                Some(PERM_ADMIN)
            }
            Self::DebugStatus | Self::DebugSet(_) => Some(PERM_DEBUG),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
}

impl CommandOutput {
    fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
        }
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// Parse the arguments following `recover`.
///
/// Unrecognized subcommands parse as [`RecoverCommand::Help`].
pub fn parse_command(args: &[&str]) -> Result<RecoverCommand, CommandError> {
    let Some(sub) = args.first() else {
        return Ok(RecoverCommand::Help);
    };
    let rest = &args[1..];
    match sub.to_ascii_lowercase().as_str() {
        "fix" => match rest {
            [amount] => parse_amount(amount).map(RecoverCommand::Fix),
            _ => Err(CommandError::new(FIX_USAGE)),
        },
        "reload" if rest.is_empty() => Ok(RecoverCommand::Reload),
        "stats" if rest.is_empty() => Ok(RecoverCommand::Stats),
        "protected" => parse_protected(rest),
        "debug" => match rest {
            [] => Ok(RecoverCommand::DebugStatus),
            [state] if state.eq_ignore_ascii_case("enable") => Ok(RecoverCommand::DebugSet(true)),
            [state] if state.eq_ignore_ascii_case("disable") => Ok(RecoverCommand::DebugSet(false)),
            _ => Err(CommandError::new(DEBUG_USAGE)),
        },
        _ => Ok(RecoverCommand::Help),
    }
}

fn parse_amount(raw: &str) -> Result<DrainLimit, CommandError> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(DrainLimit::Unbounded);
    }
    let amount = raw
        .parse::<i64>()
        .map_err(|_| CommandError::new(format!("Invalid amount: {raw}. Use a number or 'all'")))?;
    if amount <= 0 {
        return Err(CommandError::new("Amount must be greater than 0"));
    }
    let amount = usize::try_from(amount).unwrap_or(usize::MAX);
    Ok(DrainLimit::Count(amount))
}

fn parse_protected(rest: &[&str]) -> Result<RecoverCommand, CommandError> {
    match rest {
        [] => Ok(RecoverCommand::ProtectedList),
        [action] if action.eq_ignore_ascii_case("list") => Ok(RecoverCommand::ProtectedList),
        [action, material] if action.eq_ignore_ascii_case("add") => {
            Ok(RecoverCommand::ProtectedAdd(parse_material(material)?))
        }
        [action, material] if action.eq_ignore_ascii_case("remove") => {
            Ok(RecoverCommand::ProtectedRemove(parse_material(material)?))
        }
        _ => Err(CommandError::new(PROTECTED_USAGE)),
    }
}

fn parse_material(raw: &str) -> Result<Material, CommandError> {
    Material::parse(raw).map_err(|_| CommandError::new(format!("Invalid material: {raw}")))
}

/// Help lines visible to `sender`.
pub fn help_lines(sender: &dyn CommandSender) -> Vec<String> {
    let mut lines = vec![
        "/recover fix <amount|all> - Restore pending blocks now".to_string(),
        "/recover reload - Reload the configuration".to_string(),
        "/recover stats - Show recovery statistics".to_string(),
    ];
    if sender.has_permission(PERM_DEBUG) {
        lines.push("/recover debug [enable|disable] - Toggle policy tracing".to_string());
    }
    if sender.has_permission(PERM_ADMIN) {
        lines.push(
            "/recover protected <list|add|remove> [material] - Manage protected blocks".to_string(),
        );
    }
    lines
}

/// Tab completions for the argument being typed, given the ones before it.
pub fn tab_complete(sender: &dyn CommandSender, args: &[&str]) -> Vec<String> {
    let admin = sender.has_permission(PERM_ADMIN);
    let debug = sender.has_permission(PERM_DEBUG);
    match args {
        [_] => {
            let mut subs = vec!["fix", "reload", "stats"];
            if debug {
                subs.push("debug");
            }
            if admin {
                subs.push("protected");
            }
            owned(&subs)
        }
        [sub, _] if sub.eq_ignore_ascii_case("fix") => owned(&["all", "10", "100", "1000", "10000"]),
        [sub, _] if sub.eq_ignore_ascii_case("debug") && debug => owned(&["enable", "disable"]),
        [sub, _] if sub.eq_ignore_ascii_case("protected") && admin => {
            owned(&["list", "add", "remove"])
        }
        [sub, action, _]
            if sub.eq_ignore_ascii_case("protected")
                && (action.eq_ignore_ascii_case("add") || action.eq_ignore_ascii_case("remove"))
                && admin =>
        {
            owned(&[
                "PLAYER_HEAD",
                "SPAWNER",
                "CHEST",
                "BEACON",
                "OAK_SIGN",
                "OAK_WALL_SIGN",
            ])
        }
        _ => Vec::new(),
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Executes `recover` subcommands against the running engine.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    config: Arc<ConfigStore>,
    scheduler: Arc<RecoveryScheduler>,
}

impl CommandHandler {
    pub fn new(config: Arc<ConfigStore>, scheduler: Arc<RecoveryScheduler>) -> Self {
        Self { config, scheduler }
    }

    /// Check permissions, parse `args` and execute.
    pub async fn dispatch(&self, sender: &dyn CommandSender, args: &[&str]) -> CommandOutput {
        if !sender.has_permission(PERM_COMMAND) {
            return CommandOutput::line(NO_PERMISSION);
        }
        // Gated subcommands refuse before their arguments are looked at.
        let gated = match args.first().map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("protected") => Some(PERM_ADMIN),
            Some("debug") => Some(PERM_DEBUG),
            _ => None,
        };
        if gated.is_some_and(|perm| !sender.has_permission(perm)) {
            return CommandOutput::line(NO_PERMISSION);
        }
        match parse_command(args) {
            Ok(cmd) => self.execute(sender, cmd).await,
            Err(err) => CommandOutput::line(format!("Error: {err}")),
        }
    }

    pub async fn execute(&self, sender: &dyn CommandSender, cmd: RecoverCommand) -> CommandOutput {
        if cmd.permission().is_some_and(|perm| !sender.has_permission(perm)) {
            return CommandOutput::line(NO_PERMISSION);
        }
        let debug = self.config.debug_enabled();
        match cmd {
            RecoverCommand::Help => CommandOutput {
                lines: help_lines(sender),
            },
            RecoverCommand::Fix(limit) => {
                let amount = match limit {
                    DrainLimit::Unbounded => "ALL".to_string(),
                    DrainLimit::Count(n) => n.to_string(),
                };
                debug_trace!(debug, by = sender.name(), "manual recovery of {amount} blocks");
                match self.scheduler.drain(limit).await {
                    Ok(report) => {
                        let mut out = CommandOutput::line(format!(
                            "Recovered {} blocks.",
                            report.restored
                        ));
                        if report.failed + report.discarded > 0 {
                            out.push(format!(
                                "{} blocks could not be restored.",
                                report.failed + report.discarded
                            ));
                        }
                        out
                    }
                    Err(err) => CommandOutput::line(format!("Error: {err}")),
                }
            }
            RecoverCommand::Reload => match self.config.reload() {
                Ok(()) => CommandOutput::line("Configuration reloaded."),
                Err(err) => CommandOutput::line(format!("Error: {err}")),
            },
            RecoverCommand::Stats => {
                let stats = self.scheduler.stats().snapshot();
                let queue = self.scheduler.queue();
                CommandOutput {
                    lines: vec![
                        "Recovery statistics:".to_string(),
                        format!("  Blocks recovered: {}", stats.blocks_recovered),
                        format!("  Explosions recovered: {}", stats.explosions_recovered),
                        format!(
                            "  Pending: {} blocks in {} explosions",
                            queue.pending_blocks(),
                            queue.pending_explosions()
                        ),
                    ],
                }
            }
            RecoverCommand::ProtectedList => {
                let config = self.config.snapshot();
                let mut out = CommandOutput::line(format!(
                    "Protected blocks ({}):",
                    config.protected_blocks.len()
                ));
                if config.protected_blocks.is_empty() {
                    out.push("  None");
                }
                for material in &config.protected_blocks {
                    out.push(format!("  - {material}"));
                }
                out
            }
            RecoverCommand::ProtectedAdd(material) => match self.config.add_protected(&material) {
                Ok(change) if change.is_noop() => CommandOutput::line(format!(
                    "{material} is already in the protected blocks list!"
                )),
                Ok(change) => {
                    let mut out = if change.changed.contains(&material) {
                        CommandOutput::line(format!("Added {material} to protected blocks list!"))
                    } else {
                        CommandOutput::line(format!(
                            "{material} is already in the protected blocks list!"
                        ))
                    };
                    for paired in change.changed.iter().filter(|m| **m != material) {
                        out.push(format!("Also added {paired} automatically."));
                    }
                    out
                }
                Err(err) => CommandOutput::line(format!("Error: {err}")),
            },
            RecoverCommand::ProtectedRemove(material) => {
                match self.config.remove_protected(&material) {
                    Ok(change) if change.is_noop() => CommandOutput::line(format!(
                        "{material} is not in the protected blocks list!"
                    )),
                    Ok(change) => {
                        let mut out = if change.changed.contains(&material) {
                            CommandOutput::line(format!(
                                "Removed {material} from protected blocks list!"
                            ))
                        } else {
                            CommandOutput::line(format!(
                                "{material} is not in the protected blocks list!"
                            ))
                        };
                        for paired in change.changed.iter().filter(|m| **m != material) {
                            out.push(format!("Also removed {paired} automatically."));
                        }
                        out
                    }
                    Err(err) => CommandOutput::line(format!("Error: {err}")),
                }
            }
            RecoverCommand::DebugStatus => CommandOutput::line(format!(
                "Debug mode is currently {}.",
                if debug { "ENABLED" } else { "DISABLED" }
            )),
            RecoverCommand::DebugSet(enabled) => match self.config.set_debug(enabled) {
                Ok(true) if enabled => CommandOutput::line("Debug mode enabled!"),
                Ok(true) => CommandOutput::line("Debug mode disabled!"),
                Ok(false) if enabled => CommandOutput::line("Debug mode is already enabled."),
                Ok(false) => CommandOutput::line("Debug mode is already disabled."),
                Err(err) => CommandOutput::line(format!("Error: {err}")),
            },
        }
    }
}
