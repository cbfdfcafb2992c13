//! Fun commands: fancy text and random quotes, jokes and facts.

use super::{Category, Command, CommandContext, CommandSpec, Outcome};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use whiz_core::error::WhizError;

pub(super) fn commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Fancy),
        Arc::new(Pick::QUOTE),
        Arc::new(Pick::JOKE),
        Arc::new(Pick::FACT),
    ]
}

const fn fun(name: &'static str, description: &'static str, usage: &'static str) -> CommandSpec {
    CommandSpec {
        name,
        aliases: &[],
        category: Category::Fun,
        description,
        usage,
        owner_only: false,
        group_only: false,
        admin_only: false,
    }
}

fn upside_down(c: char) -> char {
    match c.to_ascii_lowercase() {
        'a' => 'ɐ',
        'b' => 'q',
        'c' => 'ɔ',
        'd' => 'p',
        'e' => 'ǝ',
        'f' => 'ɟ',
        'g' => 'ɓ',
        'h' => 'ɥ',
        'i' => 'ᴉ',
        'j' => 'ɾ',
        'k' => 'ʞ',
        'l' => 'ʅ',
        'm' => 'ɯ',
        'n' => 'u',
        'o' => 'o',
        'p' => 'd',
        'q' => 'b',
        'r' => 'ɹ',
        's' => 's',
        't' => 'ʇ',
        'u' => 'n',
        'v' => 'ʌ',
        'w' => 'ʍ',
        'x' => 'x',
        'y' => 'ʎ',
        'z' => 'z',
        _ => c,
    }
}

/// Normal, upside-down (reversed) and spaced renditions of `input`.
pub(super) fn fancy_text(input: &str) -> [String; 3] {
    let upside: String = input.chars().rev().map(upside_down).collect();
    let spaced = input
        .chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ");
    [
        format!("• Normal: {input}"),
        format!("• Upside: {upside}"),
        format!("• Spaced: {spaced}"),
    ]
}

struct Fancy;

static FANCY: CommandSpec = fun("fancy", "Render text in fancy styles.", "<text>");

#[async_trait]
impl Command for Fancy {
    fn spec(&self) -> &CommandSpec {
        &FANCY
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        if ctx.args.is_empty() {
            ctx.reply_plain(&format!(
                "⚠️ Usage: {}fancy your text",
                ctx.config.primary_prefix()
            ))
            .await?;
            return Ok(Outcome::Done);
        }
        ctx.reply_plain(&fancy_text(ctx.args).join("\n")).await?;
        Ok(Outcome::Done)
    }
}

const QUOTES: &[&str] = &[
    "“Code is like humor. When you have to explain it, it's bad.” – Cory House",
    "“First, solve the problem. Then, write the code.” – John Johnson",
    "“Simplicity is the soul of efficiency.” – Austin Freeman",
    "“Make it work, make it right, make it fast.” – Kent Beck",
];

const JOKES: &[&str] = &[
    "Why do programmers prefer dark mode? Because light attracts bugs. 🐛",
    "Debugging: being the detective in a crime movie where you are also the murderer. 🕵️",
    "My code doesn't work and I have no idea why. My code works and I have no idea why. 🤷",
    "There are 10 kinds of people: those who understand binary and those who don't.",
];

const FACTS: &[&str] = &[
    "JavaScript was written in 10 days in 1995.",
    "Git was created by Linus Torvalds in 2005.",
    "The first PC virus, Brain, appeared in 1986.",
    "The first computer bug was an actual moth found in a Harvard Mark II in 1947.",
];

/// Replies with a random entry from a fixed list.
struct Pick {
    spec: CommandSpec,
    items: &'static [&'static str],
}

impl Pick {
    const QUOTE: Pick = Pick {
        spec: fun("quote", "Get a random programming quote.", ""),
        items: QUOTES,
    };
    const JOKE: Pick = Pick {
        spec: fun("joke", "Get a random joke.", ""),
        items: JOKES,
    };
    const FACT: Pick = Pick {
        spec: fun("fact", "Get a random tech fact.", ""),
        items: FACTS,
    };

    fn choose(&self) -> &'static str {
        self.items
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Command for Pick {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let text = self.choose();
        ctx.reply_plain(text).await?;
        Ok(Outcome::Done)
    }
}
