//! Operator console commands
//!
//! ```text
//! shutdown
//! status
//! reverse test
//! reverse buy|sell <A> <B> <units> [additional]
//! ```

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::common::errors::{BridgeError, Result};
use crate::common::types::{Currency, CurrencyPair, Side};

/// A validated operator request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Flush state and exit
    Shutdown,
    /// Log each strategy's tracked pairs
    Status,
    /// Round-trip a one-unit trade on the reverse account
    ReverseTest,
    /// Trade a reversed pair in the provider's direction
    Unreverse {
        side: Side,
        pair: CurrencyPair,
        units: u64,
        additional: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "console", no_binary_name = true, disable_help_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Subcommand, Debug)]
enum ConsoleCommand {
    Shutdown,
    Status,
    Reverse {
        #[command(subcommand)]
        action: ReverseAction,
    },
}

#[derive(Subcommand, Debug)]
enum ReverseAction {
    Test,
    Buy(UnreverseArgs),
    Sell(UnreverseArgs),
}

#[derive(Args, Debug)]
struct UnreverseArgs {
    #[arg(value_parser = parse_currency)]
    first: Currency,
    #[arg(value_parser = parse_currency)]
    second: Currency,
    units: u64,
    #[arg(value_parser = ["additional"])]
    additional: Option<String>,
}

fn parse_currency(s: &str) -> std::result::Result<Currency, String> {
    s.parse::<Currency>().map_err(|e| e.to_string())
}

impl UnreverseArgs {
    fn into_command(self, side: Side) -> Result<OperatorCommand> {
        Ok(OperatorCommand::Unreverse {
            side,
            pair: CurrencyPair::between(self.first, self.second)?,
            units: self.units,
            additional: self.additional.is_some(),
        })
    }
}

/// Parse one console line
pub fn parse_command(line: &str) -> Result<OperatorCommand> {
    let parsed = ConsoleLine::try_parse_from(line.split_whitespace())
        .map_err(|e| BridgeError::Parse(e.to_string().trim().to_string()))?;

    match parsed.command {
        ConsoleCommand::Shutdown => Ok(OperatorCommand::Shutdown),
        ConsoleCommand::Status => Ok(OperatorCommand::Status),
        ConsoleCommand::Reverse { action } => match action {
            ReverseAction::Test => Ok(OperatorCommand::ReverseTest),
            ReverseAction::Buy(args) => args.into_command(Side::Buy),
            ReverseAction::Sell(args) => args.into_command(Side::Sell),
        },
    }
}

/// Read commands from `reader` and forward them until EOF or `shutdown`
pub async fn read_commands<R>(reader: R, sender: mpsc::Sender<OperatorCommand>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Ok(command) => {
                let stop = command == OperatorCommand::Shutdown;
                if sender.send(command).await.is_err() || stop {
                    break;
                }
            }
            Err(e) => warn!(command = %line, error = %e, "Unrecognised command"),
        }
    }
    info!("Operator console closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("shutdown").unwrap(), OperatorCommand::Shutdown);
        assert_eq!(parse_command("  status ").unwrap(), OperatorCommand::Status);
        assert_eq!(parse_command("reverse test").unwrap(), OperatorCommand::ReverseTest);
    }

    #[test]
    fn test_unreverse_pair_in_either_order() {
        let expected = OperatorCommand::Unreverse {
            side: Side::Sell,
            pair: "EUR_USD".parse().unwrap(),
            units: 2500,
            additional: false,
        };
        assert_eq!(parse_command("reverse sell EUR USD 2500").unwrap(), expected);
        assert_eq!(parse_command("reverse sell usd eur 2500").unwrap(), expected);

        assert_eq!(
            parse_command("reverse buy gbp jpy 100 additional").unwrap(),
            OperatorCommand::Unreverse {
                side: Side::Buy,
                pair: "GBP_JPY".parse().unwrap(),
                units: 100,
                additional: true,
            }
        );
    }

    #[test]
    fn test_rejects_bad_commands() {
        for line in [
            "launch",
            "reverse",
            "reverse hold EUR USD 1",
            "reverse buy EUR USD",
            "reverse buy EUR USD -5",
            "reverse buy EUR XAU 5",
            "reverse buy EUR EUR 5",
            "reverse buy EUR USD 5 again",
        ] {
            assert!(parse_command(line).is_err(), "accepted '{}'", line);
        }
    }

    #[tokio::test]
    async fn test_reader_stops_after_shutdown() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = "status\nnonsense\nshutdown\nstatus\n";
        read_commands(input.as_bytes(), tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(OperatorCommand::Status));
        assert_eq!(rx.recv().await, Some(OperatorCommand::Shutdown));
        assert_eq!(rx.recv().await, None);
    }
}
