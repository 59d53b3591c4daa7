//! Command execution.

use crate::Commands;
use amc_client::{Client, CoreTransport};
use amc_protocol::Argument;
use colored::Colorize;

/// Executes a command and returns the formatted output.
pub fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Load => {
            client.load()?;
            Ok(format!("{} {}", "Loading".green(), client.base_address().cyan()))
        }

        Commands::Unload => {
            client.unload()?;
            Ok(format!("{} {}", "Unloading".green(), client.base_address().cyan()))
        }

        Commands::Mute { state } => {
            client.set_mute(state)?;
            Ok(format!("{} {}", mute_label(state), client.base_address().cyan()))
        }

        Commands::Volume { level } => {
            check_volume(level)?;
            client.set_volume(level)?;
            Ok(format!(
                "{} {} to {}",
                "Volume".green(),
                client.base_address().cyan(),
                level
            ))
        }

        Commands::SystemMute { state } => {
            client.set_system_mute(state)?;
            Ok(format!("{} system", mute_label(state)))
        }

        Commands::SystemVolume { level } => {
            check_volume(level)?;
            client.set_system_volume(level)?;
            Ok(format!("{} system to {}", "Volume".green(), level))
        }

        Commands::Send {
            transport,
            address,
            tags,
            values,
        } => send(client, transport, &address, &tags, &values),
    }
}

/// Encodes and sends a custom message.
pub fn send(
    client: &Client,
    transport: CoreTransport,
    address: &str,
    tags: &str,
    values: &[String],
) -> Result<String, Box<dyn std::error::Error>> {
    let args = parse_arguments(tags, values)?;
    match transport {
        CoreTransport::Stream => client.send_custom_stream(address, &args)?,
        CoreTransport::Datagram => client.send_custom_datagram(address, &args)?,
    }
    Ok(format!(
        "{} {}{} ({} argument(s))",
        "Sent".green(),
        client.base_address(),
        address.cyan(),
        args.len()
    ))
}

/// Parses `true|1|false|0`.
pub fn parse_flag(s: &str) -> Result<bool, String> {
    match s {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("bad argument: {} (expected true|1|false|0)", other)),
    }
}

/// Parses a volume in `[0, 1]`.
pub fn parse_volume(s: &str) -> Result<f32, String> {
    let level: f32 = s.parse().map_err(|_| format!("bad argument: {}", s))?;
    check_volume(level)?;
    Ok(level)
}

fn check_volume(level: f32) -> Result<(), String> {
    if (0.0..=1.0).contains(&level) {
        Ok(())
    } else {
        Err(format!("volume {} is outside 0-1", level))
    }
}

/// Builds arguments from OSC type tags and one value per non-marker tag.
///
/// A leading `,` on `tags` is optional.
pub fn parse_arguments(
    tags: &str,
    values: &[String],
) -> Result<Vec<Argument>, Box<dyn std::error::Error>> {
    let tags = tags.strip_prefix(',').unwrap_or(tags);
    let mut values = values.iter();
    let mut args = Vec::with_capacity(tags.len());

    for tag in tags.chars() {
        let text = if Argument::takes_value(tag) {
            values
                .next()
                .ok_or_else(|| format!("missing value for type tag '{}'", tag))?
                .as_str()
        } else {
            ""
        };
        args.push(Argument::parse(tag, text)?);
    }

    if let Some(extra) = values.next() {
        return Err(format!("unexpected value: {}", extra).into());
    }
    Ok(args)
}

fn mute_label(state: bool) -> colored::ColoredString {
    if state {
        "Muted".yellow()
    } else {
        "Unmuted".green()
    }
}
