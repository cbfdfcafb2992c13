//! Utility commands: calc, echo, time, date, day, month, year.

use super::{Category, Command, CommandContext, CommandSpec, Outcome};
use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use whiz_core::error::WhizError;

pub(super) fn commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Calc),
        Arc::new(Echo),
        Arc::new(Clock::TIME),
        Arc::new(Clock::DATE),
        Arc::new(Clock::DAY),
        Arc::new(Clock::MONTH),
        Arc::new(Clock::YEAR),
    ]
}

const fn utility(
    name: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
    usage: &'static str,
) -> CommandSpec {
    CommandSpec {
        name,
        aliases,
        category: Category::Utility,
        description,
        usage,
        owner_only: false,
        group_only: false,
        admin_only: false,
    }
}

// --- calculator ---

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = num
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid number: {num}"))?;
                tokens.push(Token::Num(value));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            // Common chat spellings of multiply and divide.
            'x' | '×' => {
                tokens.push(Token::Op('*'));
                chars.next();
            }
            '÷' => {
                tokens.push(Token::Op('/'));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            other => return Err(format!("Unexpected character: {other}")),
        }
    }
    Ok(tokens)
}

/// Recursive-descent parser over the token stream.
///
/// Grammar: `expr = term (('+'|'-') term)*`, `term = unary (('*'|'/'|'%') unary)*`,
/// `unary = '-' unary | power`, `power = atom ('^' unary)?`, `atom = num | '(' expr ')'`.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses, unary signs and exponents currently being parsed.
    depth: usize,
}

/// Deepest nesting the parser descends into before giving up.
const MAX_DEPTH: usize = 100;

/// Longest expression `calc` accepts.
pub(super) const MAX_EXPR_LEN: usize = 1024;

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse one nested level with `f`, bounded by [`MAX_DEPTH`].
    fn nested(&mut self, f: fn(&mut Self) -> Result<f64, String>) -> Result<f64, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("Expression too deeply nested".into());
        }
        let value = f(self)?;
        self.depth -= 1;
        Ok(value)
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err("Division by zero".into()),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.nested(Self::unary)?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exp = self.nested(Self::unary)?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.nested(Self::expr)?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("Missing closing parenthesis".into()),
                }
            }
            Some(Token::Close) => Err("Unexpected ')'".into()),
            Some(Token::Op(op)) => Err(format!("Unexpected operator: {op}")),
            None => Err("Incomplete expression".into()),
        }
    }
}

/// Evaluate an arithmetic expression with `+ - * / % ^`, parentheses and unary minus.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err("Empty expression".into());
    }
    let mut parser = Parser::new(tokens);
    let value = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err("Invalid expression".into());
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(value)
}

/// Render a result without float noise: integers plain, others to at most 10 places.
pub(super) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let s = format!("{value:.10}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

struct Calc;

static CALC: CommandSpec = utility(
    "calc",
    &["calculate"],
    "Evaluate a math expression.",
    "<expression>",
);

#[async_trait]
impl Command for Calc {
    fn spec(&self) -> &CommandSpec {
        &CALC
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        if ctx.args.is_empty() {
            ctx.reply_text(&format!(
                "⚠️ Usage: {}calc 5+5*(2-1)",
                ctx.config.primary_prefix()
            ))
            .await;
            return Ok(Outcome::Done);
        }
        if ctx.args.chars().count() > MAX_EXPR_LEN {
            ctx.reply_text(&format!(
                "❌ Expression is too long (max {MAX_EXPR_LEN} characters)."
            ))
            .await;
            return Ok(Outcome::Done);
        }
        let text = match evaluate(ctx.args) {
            Ok(value) => format!("🧮 {} = *{}*", ctx.args, format_number(value)),
            Err(e) => format!("❌ Could not evaluate `{}`: {e}", ctx.args),
        };
        ctx.reply_text(&text).await;
        Ok(Outcome::Done)
    }
}

// --- canned replies ---

struct Echo;

static ECHO: CommandSpec = utility("echo", &[], "Repeat your text.", "<text>");

#[async_trait]
impl Command for Echo {
    fn spec(&self) -> &CommandSpec {
        &ECHO
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let text = if ctx.args.is_empty() {
            "(nothing)"
        } else {
            ctx.args
        };
        ctx.reply_plain(&format!("🔁 {text}")).await?;
        Ok(Outcome::Done)
    }
}

/// Current local time or date in one format.
struct Clock {
    spec: CommandSpec,
    emoji: &'static str,
    format: &'static str,
}

impl Clock {
    const TIME: Clock = Clock {
        spec: utility("time", &[], "Show the current time.", ""),
        emoji: "🕒",
        format: "%H:%M:%S",
    };
    const DATE: Clock = Clock {
        spec: utility("date", &[], "Show today's date.", ""),
        emoji: "📅",
        format: "%Y-%m-%d",
    };
    const DAY: Clock = Clock {
        spec: utility("day", &[], "Show the day of the week.", ""),
        emoji: "📌",
        format: "%A",
    };
    const MONTH: Clock = Clock {
        spec: utility("month", &[], "Show the current month.", ""),
        emoji: "🗓️",
        format: "%B",
    };
    const YEAR: Clock = Clock {
        spec: utility("year", &[], "Show the current year.", ""),
        emoji: "📆",
        format: "%Y",
    };
}

#[async_trait]
impl Command for Clock {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let now = Local::now().format(self.format);
        ctx.reply_plain(&format!("{} {now}", self.emoji)).await?;
        Ok(Outcome::Done)
    }
}
