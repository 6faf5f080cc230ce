//! Line-delimited JSON signal source over TCP
//!
//! The mail poller that extracts signals from provider notifications writes
//! one JSON document per line, either a whole bundle
//! (`{"signals":[...]}`) or a single signal. Connections are served one at a
//! time so signals keep their arrival order.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::common::errors::{BridgeError, Result};
use crate::common::traits::SignalSource;
use crate::common::types::{SignalBundle, TradeSignal};

#[derive(Deserialize)]
#[serde(untagged)]
enum WireMessage {
    Bundle { signals: Vec<serde_json::Value> },
    Single(TradeSignal),
}

/// Parse and validate one line into a bundle
///
/// Each leg of a bundle is checked on its own. Invalid legs are logged and
/// dropped; the line is rejected only when no valid leg remains.
pub fn parse_line(line: &str) -> Result<SignalBundle> {
    let legs = match serde_json::from_str::<WireMessage>(line) {
        Ok(WireMessage::Single(signal)) => {
            signal.validate()?;
            return Ok(SignalBundle::single(signal));
        }
        Ok(WireMessage::Bundle { signals }) => signals,
        Err(e) => return Err(BridgeError::Parse(format!("unreadable signal: {}", e))),
    };
    if legs.is_empty() {
        return Err(BridgeError::Parse("notification carries no signals".to_string()));
    }

    let total = legs.len();
    let signals: Vec<TradeSignal> = legs
        .into_iter()
        .enumerate()
        .filter_map(|(leg, raw)| match parse_leg(raw) {
            Ok(signal) => Some(signal),
            Err(e) => {
                error!(leg, legs = total, error = %e, "Dropping invalid leg of a notification");
                None
            }
        })
        .collect();

    if signals.is_empty() {
        return Err(BridgeError::Parse(format!(
            "none of the {} signals in the notification is valid",
            total
        )));
    }
    Ok(SignalBundle::new(signals, total))
}

fn parse_leg(raw: serde_json::Value) -> Result<TradeSignal> {
    let signal: TradeSignal = serde_json::from_value(raw)
        .map_err(|e| BridgeError::Parse(format!("unreadable signal: {}", e)))?;
    signal.validate()?;
    Ok(signal)
}

/// Forward every valid line of `reader` until EOF, shutdown or a closed channel
///
/// Returns `false` once the receiving side has gone away.
pub async fn forward_lines<R>(
    reader: R,
    sender: &mpsc::Sender<SignalBundle>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.changed() => return Ok(true),
        };
        let Some(line) = line else {
            return Ok(true);
        };
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        match parse_line(raw) {
            Ok(bundle) => {
                debug!(signals = bundle.signals.len(), "Received notification");
                if sender.send(bundle).await.is_err() {
                    warn!("Signal receiver dropped, stopping source");
                    return Ok(false);
                }
            }
            Err(e) => error!(raw = %raw, error = %e, "Dropping malformed signal"),
        }
    }
}

/// Accepts connections from the upstream parser on a local TCP port
pub struct TcpSignalSource {
    listen_addr: String,
    shutdown: watch::Receiver<bool>,
}

impl TcpSignalSource {
    pub fn new(listen_addr: impl Into<String>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            shutdown,
        }
    }
}

#[async_trait]
impl SignalSource for TcpSignalSource {
    async fn run(&mut self, sender: mpsc::Sender<SignalBundle>) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(addr = %self.listen_addr, "Signal source listening");

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = self.shutdown.changed() => break,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Failed to accept signal connection");
                    continue;
                }
            };
            info!(%peer, "Signal connection opened");

            match forward_lines(BufReader::new(stream), &sender, &mut self.shutdown).await {
                Ok(true) => info!(%peer, "Signal connection closed"),
                Ok(false) => break,
                Err(e) => error!(%peer, error = %e, "Signal connection failed"),
            }
        }

        info!("Signal source stopped");
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::channels::{create_shutdown_channel, create_signal_channel};
    use crate::common::types::{CurrencyPair, ProviderAction, Side};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_single_and_bundle() {
        let single = r#"{"action":"open","side":"buy","size":10000,"pair":"EUR_USD","provider_price":"1.1000"}"#;
        let bundle = parse_line(single).unwrap();
        assert_eq!(
            bundle,
            SignalBundle::single(TradeSignal::new(
                ProviderAction::Open,
                Side::Buy,
                10_000,
                CurrencyPair::EUR_USD,
                dec!(1.1000)
            ))
        );

        let multi = r#"{"signals":[
            {"action":"close","side":"sell","size":5000,"pair":"GBPUSD","provider_price":1.3},
            {"action":"open","side":"buy","size":5000,"pair":"EUR/USD","provider_price":1.1}
        ]}"#;
        let bundle = parse_line(&multi.replace('\n', "")).unwrap();
        assert!(bundle.is_multi());
        assert_eq!(bundle.signals[0].action, ProviderAction::Close);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"signals":[]}"#).is_err());
        assert!(parse_line(
            r#"{"action":"open","side":"buy","size":0,"pair":"EUR_USD","provider_price":1.1}"#
        )
        .is_err());
        assert!(parse_line(
            r#"{"action":"open","side":"buy","size":1,"pair":"EUR_XAU","provider_price":1.1}"#
        )
        .is_err());
        assert!(parse_line(
            r#"{"signals":[{"action":"open","side":"buy","size":0,"pair":"EUR_USD","provider_price":1.1}]}"#
        )
        .is_err());
    }

    #[test_log::test]
    fn test_invalid_leg_does_not_drop_valid_close() {
        let line = concat!(
            r#"{"signals":["#,
            r#"{"action":"open","side":"buy","size":5000,"pair":"EUR_XAU","provider_price":1.1},"#,
            r#"{"action":"close","side":"sell","size":5000,"pair":"GBP_USD","provider_price":1.3}"#,
            r#"]}"#
        );

        let bundle = parse_line(line).unwrap();
        assert_eq!(bundle.signals.len(), 1);
        assert_eq!(bundle.legs, 2);
        assert!(bundle.is_multi());
        assert_eq!(bundle.signals[0].action, ProviderAction::Close);
        assert_eq!(bundle.signals[0].provider_price, dec!(1.3));
    }

    #[test_log::test(tokio::test)]
    async fn test_forward_skips_malformed_lines() {
        let input = concat!(
            r#"{"action":"open","side":"buy","size":1,"pair":"EUR_USD","provider_price":1.1}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"action":"close","side":"buy","size":1,"pair":"EUR_USD","provider_price":1.2}"#,
            "\n",
        );
        let (tx, mut rx) = create_signal_channel();
        let (_shutdown_tx, mut shutdown) = create_shutdown_channel();

        let open = forward_lines(input.as_bytes(), &tx, &mut shutdown).await.unwrap();
        assert!(open);
        drop(tx);

        let mut received = Vec::new();
        while let Some(bundle) = rx.recv().await {
            received.push(bundle.signals[0].action);
        }
        assert_eq!(received, vec![ProviderAction::Open, ProviderAction::Close]);
    }
}
