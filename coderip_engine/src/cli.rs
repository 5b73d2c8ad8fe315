use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use coderip_engine::script_host::StateValue;
use coderip_protocol::GrammarVariant;

#[derive(Parser, Debug)]
#[command(
    about = "Escape-room console where an agent patches the Lua behind each object",
    version
)]
pub struct Args {
    /// Optional JSON configuration file (missing file means defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Never contact the agent; directives can still be applied with `apply`
    #[arg(long)]
    pub offline: bool,

    /// Directive style the agent is taught: diff or replace
    #[arg(long, value_parser = parse_variant)]
    pub grammar: Option<GrammarVariant>,

    /// Seed for the random() host call
    #[arg(long)]
    pub seed: Option<u64>,

    /// Read commands from this file instead of stdin
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    pub verbose: bool,
}

fn parse_variant(value: &str) -> Result<GrammarVariant, String> {
    GrammarVariant::from_label(value).ok_or_else(|| format!("unknown grammar '{value}' (diff or replace)"))
}

/// One console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Look,
    Inspect(String),
    Click { object: String, args: Vec<StateValue> },
    Drag { object: String, x: f64, y: f64 },
    Tick(u32),
    Say(String),
    Retry,
    Unlock { object: String, shown: String, key: String },
    Collect { object: String, shown: String },
    Inventory,
    Apply(String),
    Help,
    Quit,
}

pub const HELP: &str = "\
look                             list objects
inspect <obj>                    discover an object's code
click <obj> [args..]             run onClick
drag <obj> <x> <y>               move a draggable object
tick [n]                         advance the world
say <text>                       talk to the agent
retry                            resend the last unanswered message
unlock <obj> <shown-fn> <key>    spend a key to make a function editable
collect <obj> <fn>               pick up tokens from a readable description
inventory                        show keys and tokens
apply <text>                     apply directives written by hand
help                             this text
quit                             leave";

/// Parse one line; `Ok(None)` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let words: Vec<&str> = rest.split_whitespace().collect();

    let command = match head.to_ascii_lowercase().as_str() {
        "look" | "ls" => Command::Look,
        "inspect" => Command::Inspect(single(&words, "inspect <obj>")?),
        "click" => {
            let Some((object, args)) = words.split_first() else {
                bail!("usage: click <obj> [args..]");
            };
            Command::Click {
                object: object.to_string(),
                args: args.iter().map(|word| StateValue::parse_word(word)).collect(),
            }
        }
        "drag" => {
            let [object, x, y] = words.as_slice() else {
                bail!("usage: drag <obj> <x> <y>");
            };
            Command::Drag {
                object: object.to_string(),
                x: x.parse().with_context(|| format!("bad x coordinate '{x}'"))?,
                y: y.parse().with_context(|| format!("bad y coordinate '{y}'"))?,
            }
        }
        "tick" => match words.as_slice() {
            [] => Command::Tick(1),
            [count] => Command::Tick(
                count
                    .parse()
                    .with_context(|| format!("bad tick count '{count}'"))?,
            ),
            _ => bail!("usage: tick [n]"),
        },
        "say" => {
            if rest.is_empty() {
                bail!("usage: say <text>");
            }
            Command::Say(rest.to_string())
        }
        "retry" => Command::Retry,
        "unlock" => {
            let [object, shown, key] = words.as_slice() else {
                bail!("usage: unlock <obj> <shown-fn> <key>");
            };
            Command::Unlock {
                object: object.to_string(),
                shown: shown.to_string(),
                key: key.to_string(),
            }
        }
        "collect" => {
            let [object, shown] = words.as_slice() else {
                bail!("usage: collect <obj> <fn>");
            };
            Command::Collect {
                object: object.to_string(),
                shown: shown.to_string(),
            }
        }
        "inventory" | "inv" => Command::Inventory,
        "apply" => {
            if rest.is_empty() {
                bail!("usage: apply <text>");
            }
            Command::Apply(rest.to_string())
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}' (try help)"),
    };
    Ok(Some(command))
}

fn single(words: &[&str], usage: &str) -> Result<String> {
    match words {
        [word] => Ok(word.to_string()),
        _ => bail!("usage: {usage}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_click_arguments_as_values() {
        assert_eq!(
            parse_line("click PasswordDoor 1211").unwrap(),
            Some(Command::Click {
                object: "PasswordDoor".into(),
                args: vec![StateValue::Int(1211)],
            })
        );
    }

    #[test]
    fn say_and_apply_keep_the_raw_text() {
        assert_eq!(
            parse_line("apply Patch(\"Vault\", \"open\", ```x>0```, ```x>=0```)").unwrap(),
            Some(Command::Apply(
                "Patch(\"Vault\", \"open\", ```x>0```, ```x>=0```)".into()
            ))
        );
        assert_eq!(
            parse_line("say  hello  there ").unwrap(),
            Some(Command::Say("hello  there".into()))
        );
    }

    #[test]
    fn blanks_comments_and_bad_input() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# setup").unwrap(), None);
        assert!(parse_line("drag Match_1 ten 5").is_err());
        assert!(parse_line("dance").is_err());
        assert_eq!(parse_line("tick").unwrap(), Some(Command::Tick(1)));
    }
}
