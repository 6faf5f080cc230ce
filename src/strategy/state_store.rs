//! Per-strategy pair classification with flat-file persistence
//!
//! Each pair holds exactly one [`PairState`]. The on-disk form is a flat JSON
//! object mapping a classification name to a comma-separated list of pairs:
//!
//! ```text
//! {"open":"EUR_USD,GBP_JPY","blacklisted":"AUD_CAD","reversed":"","unreversed":"","provider_open":"EUR_USD"}
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::common::errors::{FatalError, Result};
use crate::common::types::CurrencyPair;

/// Store shared between a strategy's signal path and its scheduled tasks
pub type SharedStore = Arc<Mutex<PairStateStore>>;

const KEY_PROVIDER_OPEN: &str = "provider_open";

/// Classification of one pair within one strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairState {
    /// No memory of this pair
    Fresh,
    /// A live position is tracked locally
    Open,
    /// Stopped out; ignored until the provider closes
    Blacklisted,
    /// Exposure inverts the provider's
    Reversed,
    /// Exposure follows the provider's, on operator request
    Unreversed,
}

impl PairState {
    const PERSISTED: [PairState; 4] = [
        PairState::Open,
        PairState::Blacklisted,
        PairState::Reversed,
        PairState::Unreversed,
    ];

    fn key(self) -> &'static str {
        match self {
            PairState::Fresh => "fresh",
            PairState::Open => "open",
            PairState::Blacklisted => "blacklisted",
            PairState::Reversed => "reversed",
            PairState::Unreversed => "unreversed",
        }
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Mutually exclusive pair classifications plus the set of pairs the
/// provider currently holds
#[derive(Debug, Default)]
pub struct PairStateStore {
    path: Option<PathBuf>,
    states: HashMap<CurrencyPair, PairState>,
    provider_open: BTreeSet<CurrencyPair>,
}

impl PairStateStore {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file yields an empty store bound to that path
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, FatalError> {
        let path = path.as_ref();
        let corrupt = |message: String| FatalError::CorruptState {
            path: path.display().to_string(),
            message,
        };

        let mut store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        if !path.exists() {
            info!(path = %path.display(), "No persisted state, starting empty");
            return Ok(store);
        }

        let raw = std::fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let record: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;

        for (key, list) in &record {
            let pairs = parse_list(list).map_err(|e| corrupt(format!("{}: {}", key, e)))?;

            if key == KEY_PROVIDER_OPEN {
                store.provider_open.extend(pairs);
                continue;
            }

            let state = PairState::PERSISTED
                .into_iter()
                .find(|s| s.key() == key)
                .ok_or_else(|| corrupt(format!("unknown classification '{}'", key)))?;

            for pair in pairs {
                if let Some(existing) = store.states.insert(pair, state) {
                    return Err(corrupt(format!(
                        "{} is listed as both {} and {}",
                        pair, existing, state
                    )));
                }
            }
        }

        info!(
            path = %path.display(),
            tracked = store.states.len(),
            provider_open = store.provider_open.len(),
            "Loaded persisted state"
        );
        Ok(store)
    }

    /// Write the whole store to its path, replacing the previous file
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string(&self.to_record())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        debug!(path = %path.display(), tracked = self.states.len(), "Persisted state");
        Ok(())
    }

    /// The flat key/value form written to disk
    pub fn to_record(&self) -> BTreeMap<String, String> {
        let mut record = BTreeMap::new();
        for state in PairState::PERSISTED {
            record.insert(state.key().to_string(), join_list(self.pairs_in(state)));
        }
        record.insert(
            KEY_PROVIDER_OPEN.to_string(),
            join_list(self.provider_open.iter().copied().collect()),
        );
        record
    }

    pub fn get(&self, pair: CurrencyPair) -> PairState {
        self.states.get(&pair).copied().unwrap_or(PairState::Fresh)
    }

    pub fn is(&self, pair: CurrencyPair, state: PairState) -> bool {
        self.get(pair) == state
    }

    /// Set a pair's classification, replacing whatever it was
    pub fn set(&mut self, pair: CurrencyPair, state: PairState) {
        if state == PairState::Fresh {
            self.states.remove(&pair);
        } else {
            self.states.insert(pair, state);
        }
    }

    /// Move a pair from one of `expected` to `to`
    ///
    /// Finding the pair in any other classification means local state has
    /// diverged from what the caller just checked, which is not recoverable.
    pub fn transition(
        &mut self,
        pair: CurrencyPair,
        expected: &[PairState],
        to: PairState,
    ) -> std::result::Result<PairState, FatalError> {
        let current = self.get(pair);
        if !expected.contains(&current) {
            return Err(FatalError::InvariantViolation(format!(
                "{} moving to {} was {}, expected one of {:?}",
                pair, to, current, expected
            )));
        }
        self.set(pair, to);
        Ok(current)
    }

    /// Return a pair to `Fresh`, giving its previous classification
    pub fn clear(&mut self, pair: CurrencyPair) -> PairState {
        self.states.remove(&pair).unwrap_or(PairState::Fresh)
    }

    /// Pairs in one classification, sorted
    pub fn pairs_in(&self, state: PairState) -> Vec<CurrencyPair> {
        let mut pairs: Vec<CurrencyPair> = self
            .states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(p, _)| *p)
            .collect();
        pairs.sort();
        pairs
    }

    /// Record that the provider opened `pair`; false if it already had
    pub fn mark_provider_open(&mut self, pair: CurrencyPair) -> bool {
        self.provider_open.insert(pair)
    }

    /// Record that the provider closed `pair`; false if it was not open
    pub fn mark_provider_closed(&mut self, pair: CurrencyPair) -> bool {
        self.provider_open.remove(&pair)
    }

    pub fn is_provider_open(&self, pair: CurrencyPair) -> bool {
        self.provider_open.contains(&pair)
    }

    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }

    /// One-line summary for the operator console
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = PairState::PERSISTED
            .into_iter()
            .map(|s| format!("{}=[{}]", s, join_list(self.pairs_in(s))))
            .collect();
        parts.push(format!(
            "{}=[{}]",
            KEY_PROVIDER_OPEN,
            join_list(self.provider_open.iter().copied().collect())
        ));
        parts.join(" ")
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }
}

fn parse_list(list: &str) -> crate::common::errors::Result<Vec<CurrencyPair>> {
    list.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::parse)
        .collect()
}

fn join_list(pairs: Vec<CurrencyPair>) -> String {
    pairs
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
