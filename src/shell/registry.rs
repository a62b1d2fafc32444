//! Command registry and alias table.
//!
//! The registry is an ordinary value built once at startup and handed to
//! the input loop; there is no process-wide handler table.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{debug, info_span, warn, Instrument};

use crate::shell::ShellContext;
use crate::Result;

/// What the input loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// End the session.
    Exit,
}

/// One top-level shell command.
pub trait CommandHandler: Send + Sync {
    /// Run the command with the words that followed its name.
    ///
    /// # Errors
    ///
    /// Any error is reported on the console by the registry; the session
    /// continues.
    fn run<'a>(&'a self, ctx: &'a ShellContext, args: &'a [String]) -> BoxFuture<'a, Result<Flow>>;
}

/// Maps command names and aliases to handlers.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
    aliases: BTreeMap<String, Vec<String>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl CommandRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.to_owned(), handler);
    }

    /// Make `alias` expand to `expansion` when typed as the first word.
    pub fn alias(&mut self, alias: &str, expansion: &str) {
        self.aliases.insert(
            alias.to_owned(),
            expansion.split_whitespace().map(str::to_owned).collect(),
        );
    }

    /// Whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Split `line` into words and expand a leading alias.
    #[must_use]
    pub fn expand(&self, line: &str) -> Vec<String> {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            return Vec::new();
        };

        let mut expanded = self
            .aliases
            .get(first)
            .cloned()
            .unwrap_or_else(|| vec![first.to_owned()]);
        expanded.extend(words.map(str::to_owned));
        expanded
    }

    /// Run one input line. Unknown commands and handler errors are
    /// reported on the console.
    pub async fn dispatch(&self, ctx: &ShellContext, line: &str) -> Flow {
        let words = self.expand(line);
        let Some((name, args)) = words.split_first() else {
            return Flow::Continue;
        };

        let Some(handler) = self.handlers.get(name) else {
            ctx.console.log(format!("invalid command '{name}'"));
            return Flow::Continue;
        };

        debug!(command = %name, ?args, "dispatching");
        let result = handler
            .run(ctx, args)
            .instrument(info_span!("shell_command", command = %name))
            .await;

        match result {
            Ok(flow) => flow,
            Err(err) => {
                warn!(command = %name, %err, "command failed");
                ctx.console.log(format!("{name} failed. {err}"));
                Flow::Continue
            }
        }
    }
}
