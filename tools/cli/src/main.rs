//! `sensorshell-cli`: a line-oriented REPL over a [`SensorShellFacade`],
//! mirroring the teacher's `tools/benchmark` pattern of a small binary
//! driving the library crate from the command line.
//!
//! Commands, one per line, `#`-delimited:
//!
//! ```text
//! add#key=value[#key=value...]
//! statechange#<checksum>[#key=value...] (resource read from key=value pairs)
//! send
//! ping
//! autosend#<minutes>
//! help
//! quit
//! ```

use std::collections::HashMap;
use std::io::{self, Write};

use clap::Parser;
use sensorshell::{Config, SensorShellFacade};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "sensorshell-cli", about = "Interactive REPL for the sensorshell telemetry relay")]
struct Args {
    /// SensorBase server base URL.
    #[arg(long)]
    host: String,

    /// Account owner / username.
    #[arg(long)]
    owner: String,

    /// Account password.
    #[arg(long)]
    password: String,
}

fn parse_fields(parts: &[&str]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            fields.insert(key.to_owned(), value.to_owned());
        } else {
            tracing::warn!(part, "ignoring malformed key=value segment");
        }
    }
    fields
}

fn print_help() {
    println!(
        "commands:\n\
         \x20 add#key=value[#key=value...]\n\
         \x20 statechange#<checksum>[#key=value...]\n\
         \x20 send\n\
         \x20 ping\n\
         \x20 autosend#<minutes>\n\
         \x20 help\n\
         \x20 quit"
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut properties = HashMap::new();
    properties.insert("host".to_owned(), args.host);
    properties.insert("user".to_owned(), args.owner);
    properties.insert("password".to_owned(), args.password);

    let config = Config::from_map(&properties)?;
    let shell = SensorShellFacade::new(config).await?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    print!("> ");
    io::stdout().flush().ok();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.trim().split('#').collect();
        match parts.as_slice() {
            ["quit"] => {
                shell.quit().await?;
                break;
            }
            ["help"] => print_help(),
            ["ping"] => println!("{}", shell.ping().await),
            ["send"] => {
                let count = shell.send().await?;
                println!("sent {count} record(s)");
            }
            ["add", rest @ ..] => {
                let fields = parse_fields(rest);
                shell.add_map(&fields).await?;
            }
            ["statechange", checksum, rest @ ..] => match checksum.parse::<u64>() {
                Ok(checksum) => {
                    let fields = parse_fields(rest);
                    shell.statechange(checksum, &fields).await?;
                }
                Err(_) => println!("invalid checksum, must be a non-negative integer"),
            },
            ["autosend", _minutes] => {
                println!(
                    "autosend interval is fixed at startup via autosend.timeinterval; \
                     restart with a new value to change it"
                );
            }
            [""] => {}
            _ => println!("unrecognized command, try 'help'"),
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fields_ignores_segments_without_an_equals_sign() {
        let fields = parse_fields(&["tool=Eclipse", "malformed", "resource=foo.java"]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("tool").map(String::as_str), Some("Eclipse"));
    }
}
