//! Interactive REPL.

use crate::commands;
use amc_client::{Client, CoreTransport};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Available commands:
  help                              Show this help

  load                              Load the project
  unload                            Unload the project
  mute <true|1|false|0>             Mute or unmute the project
  volume <0-1>                      Set the project volume
  system_mute <true|1|false|0>      Mute or unmute the Asset Manager
  system_volume <0-1>               Set the Asset Manager volume

  send <tcp|udp> <addr> [tags] [values..]
                                    Send a custom message under the base address
  bundle <start|end>                Start or send a UDP bundle
  drain                             Wait until everything queued is sent

  quit, exit                        Exit the REPL
"#;

pub fn run(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "amc".bold().cyan());
    println!(
        "Using base address: {} ({}, {:?})",
        client.base_address().cyan(),
        client.config().host,
        client.config().core_transport
    );

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".amc_history"))
        .unwrap_or_else(|_| ".amc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "->".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(client, line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    client.close();
    println!("{}", "Closed.".dimmed());

    Ok(())
}

/// One parsed shell verb.
#[derive(Debug, PartialEq)]
enum ReplCommand {
    Help,
    Quit,
    Load,
    Unload,
    Mute(bool),
    SystemMute(bool),
    Volume(f32),
    SystemVolume(f32),
    Send {
        transport: CoreTransport,
        address: String,
        tags: String,
        values: Vec<String>,
    },
    BundleStart,
    BundleEnd,
    Drain,
}

/// Parses every verb on `line`.
///
/// Verbs may be chained (`load volume 0.5`). `send` consumes the rest of the
/// line. Nothing runs if any verb fails to parse.
fn parse_line(line: &str) -> Result<Vec<ReplCommand>, String> {
    let mut tokens = line.split_whitespace();
    let mut parsed = Vec::new();

    while let Some(verb) = tokens.next() {
        let verb = verb.to_lowercase();
        let mut arg = |usage: &str| {
            tokens
                .next()
                .ok_or_else(|| format!("missing argument. Usage: {} {}", verb, usage))
        };

        let cmd = match verb.as_str() {
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            "load" => ReplCommand::Load,
            "unload" => ReplCommand::Unload,
            "mute" => ReplCommand::Mute(commands::parse_flag(arg("<true|1|false|0>")?)?),
            "system_mute" => {
                ReplCommand::SystemMute(commands::parse_flag(arg("<true|1|false|0>")?)?)
            }
            "volume" => ReplCommand::Volume(commands::parse_volume(arg("<0-1>")?)?),
            "system_volume" => ReplCommand::SystemVolume(commands::parse_volume(arg("<0-1>")?)?),
            "bundle" => match arg("<start|end>")? {
                "start" => ReplCommand::BundleStart,
                "end" => ReplCommand::BundleEnd,
                other => return Err(format!("bad argument: {}", other)),
            },
            "drain" => ReplCommand::Drain,
            "send" => {
                let usage = "<tcp|udp> <addr> [tags] [values..]";
                let transport = arg(usage)?
                    .parse::<CoreTransport>()
                    .map_err(|e| e.to_string())?;
                let address = arg(usage)?.to_string();
                let tags = tokens.next().unwrap_or("").to_string();
                let values = tokens.by_ref().map(|s| s.to_string()).collect();
                ReplCommand::Send {
                    transport,
                    address,
                    tags,
                    values,
                }
            }
            _ => {
                return Err(format!(
                    "Unknown command: {}. Type 'help' for help.",
                    verb
                ))
            }
        };
        parsed.push(cmd);
    }

    Ok(parsed)
}

fn execute_repl_command(
    client: &Client,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let mut output = Vec::new();

    for cmd in parse_line(line)? {
        let out = match cmd {
            ReplCommand::Help => HELP_TEXT.to_string(),
            ReplCommand::Quit => return Ok(None),
            ReplCommand::Load => {
                client.load()?;
                "Load sent".green().to_string()
            }
            ReplCommand::Unload => {
                client.unload()?;
                "Unload sent".green().to_string()
            }
            ReplCommand::Mute(state) => {
                client.set_mute(state)?;
                format!("{} {}", "mute".cyan(), state)
            }
            ReplCommand::SystemMute(state) => {
                client.set_system_mute(state)?;
                format!("{} {}", "system_mute".cyan(), state)
            }
            ReplCommand::Volume(level) => {
                client.set_volume(level)?;
                format!("{} {}", "volume".cyan(), level)
            }
            ReplCommand::SystemVolume(level) => {
                client.set_system_volume(level)?;
                format!("{} {}", "system_volume".cyan(), level)
            }
            ReplCommand::Send {
                transport,
                address,
                tags,
                values,
            } => commands::send(client, transport, &address, &tags, &values)?,
            ReplCommand::BundleStart => {
                client.start_bundle()?;
                "Bundle started".green().to_string()
            }
            ReplCommand::BundleEnd => {
                client.end_bundle()?;
                "Bundle sent".green().to_string()
            }
            ReplCommand::Drain => {
                client.drain();
                "Drained".green().to_string()
            }
        };
        output.push(out);
    }

    Ok(Some(output.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_verbs() {
        assert_eq!(parse_line("help").unwrap(), vec![ReplCommand::Help]);
        assert_eq!(parse_line("  QUIT ").unwrap(), vec![ReplCommand::Quit]);
        assert_eq!(parse_line("mute 1").unwrap(), vec![ReplCommand::Mute(true)]);
        assert_eq!(
            parse_line("system_volume 0.25").unwrap(),
            vec![ReplCommand::SystemVolume(0.25)]
        );
        assert_eq!(
            parse_line("bundle end").unwrap(),
            vec![ReplCommand::BundleEnd]
        );
        assert!(parse_line("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_chained_verbs() {
        assert_eq!(
            parse_line("load volume 0.5 system_mute false drain").unwrap(),
            vec![
                ReplCommand::Load,
                ReplCommand::Volume(0.5),
                ReplCommand::SystemMute(false),
                ReplCommand::Drain,
            ]
        );
    }

    #[test]
    fn test_send_consumes_rest_of_line() {
        assert_eq!(
            parse_line("bundle start send udp /cue ,is 3 load").unwrap(),
            vec![
                ReplCommand::BundleStart,
                ReplCommand::Send {
                    transport: CoreTransport::Datagram,
                    address: "/cue".to_string(),
                    tags: ",is".to_string(),
                    values: vec!["3".to_string(), "load".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_parse_errors_reject_whole_line() {
        assert!(parse_line("load volume").unwrap_err().contains("missing argument"));
        assert!(parse_line("load mute maybe").unwrap_err().contains("bad argument"));
        assert!(parse_line("load volume 3").is_err());
        assert!(parse_line("load bogus").unwrap_err().contains("Unknown command"));
        assert!(parse_line("send sctp /x").is_err());
        assert!(parse_line("bundle later").is_err());
    }
}
