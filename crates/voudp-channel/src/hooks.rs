//! Ready-made hooks.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::hook::{Hook, HookContext};

// ---------------------------------------------------------------------------
// WordFilter
// ---------------------------------------------------------------------------

/// Settings for [`WordFilter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WordFilterConfig {
    /// Banned words, matched case-insensitively against whole words.
    pub words: Vec<String>,
    /// Strikes before a kick. `0` never kicks.
    pub strike_limit: u32,
}

impl Default for WordFilterConfig {
    fn default() -> Self {
        Self {
            words: Vec::new(),
            strike_limit: 3,
        }
    }
}

/// Blocks chat containing banned words and kicks repeat offenders.
///
/// Each blocked message is one strike for the sender's username; the
/// counters live in this hook and survive reconnects. Reaching the limit
/// kicks the member and clears their count. Masks containing a banned
/// word are refused without a strike.
#[derive(Debug)]
pub struct WordFilter {
    words: HashSet<String>,
    strike_limit: u32,
    strikes: Mutex<HashMap<String, u32>>,
}

impl WordFilter {
    pub fn new(config: WordFilterConfig) -> Self {
        Self {
            words: config.words.iter().map(|w| w.to_lowercase()).collect(),
            strike_limit: config.strike_limit,
            strikes: Mutex::new(HashMap::new()),
        }
    }

    /// Current strike count for `username`.
    pub fn strikes(&self, username: &str) -> u32 {
        self.strikes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .copied()
            .unwrap_or(0)
    }

    fn contains_banned(&self, text: &str) -> bool {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .any(|word| self.words.contains(&word.to_lowercase()))
    }
}

impl Hook for WordFilter {
    fn name(&self) -> &str {
        "word-filter"
    }

    fn on_message(&self, ctx: &mut HookContext<'_>) {
        let Some(text) = ctx.get_message() else { return };
        if !self.contains_banned(text) {
            return;
        }
        ctx.cancel();

        let username = ctx.get_username().to_owned();
        let mut strikes = self.strikes.lock().unwrap_or_else(PoisonError::into_inner);
        let count = strikes.entry(username.clone()).or_insert(0);
        *count += 1;

        if self.strike_limit > 0 && *count >= self.strike_limit {
            strikes.remove(&username);
            tracing::info!(username = %username, "word filter strike limit reached; kicking");
            ctx.kick("kicked for repeated use of banned words");
        } else if self.strike_limit > 0 {
            ctx.reply(format!(
                "message blocked: banned word (strike {} of {})",
                count, self.strike_limit
            ));
        } else {
            ctx.reply("message blocked: banned word");
        }
    }

    fn on_renick(&self, ctx: &mut HookContext<'_>) {
        let blocked = ctx.get_message().is_some_and(|mask| self.contains_banned(mask));
        if blocked {
            ctx.cancel();
            ctx.reply("that mask contains a banned word");
        }
    }
}

// ---------------------------------------------------------------------------
// Greeter
// ---------------------------------------------------------------------------

/// Sends a one-line greeting to every member that joins a channel.
///
/// `{user}` and `{channel}` in the template are replaced with the joiner's
/// mask and the channel id.
#[derive(Debug, Clone)]
pub struct Greeter {
    template: String,
}

impl Greeter {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for Greeter {
    fn default() -> Self {
        Self::new("welcome to {channel}, {user}")
    }
}

impl Hook for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn on_join(&self, ctx: &mut HookContext<'_>) {
        let line = self
            .template
            .replace("{user}", ctx.get_username())
            .replace("{channel}", &ctx.get_channel_id().to_string());
        ctx.reply(line);
    }
}
