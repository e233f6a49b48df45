//! Kanji readings through an external phonetic oracle.
//!
//! The oracle is whatever the host platform offers for turning a span of
//! kanji/hiragana into katakana (an IME reverse-conversion service, a
//! morphological analyser, a user dictionary, …).  It is treated as
//! unreliable: any error or empty answer leaves the span unconverted.
//!
//! ## Threading
//! Platform oracles typically bind to the thread that created them (COM
//! apartments, engine handles with global state).  They must be called from
//! one fixed thread.  Wrap such an oracle in [`PinnedOracle`]: it builds the
//! oracle on a dedicated thread and forwards every lookup to it, so callers
//! on any thread are safe.

use std::{
    collections::HashMap,
    path::Path,
    sync::mpsc,
    thread::JoinHandle,
};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

// ─── Oracle trait ─────────────────────────────────────────────────────────────

/// Best-effort katakana reading for a span of text.
pub trait ReadingOracle {
    /// Return the reading of `text`, `Ok(None)` if the oracle has none.
    fn lookup_reading(&self, text: &str) -> Result<Option<String>>;
}

impl<T: ReadingOracle + ?Sized> ReadingOracle for Box<T> {
    fn lookup_reading(&self, text: &str) -> Result<Option<String>> {
        (**self).lookup_reading(text)
    }
}

impl<T: ReadingOracle + ?Sized> ReadingOracle for &T {
    fn lookup_reading(&self, text: &str) -> Result<Option<String>> {
        (**self).lookup_reading(text)
    }
}

/// An oracle that never knows anything; every span passes through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOracle;

impl ReadingOracle for NullOracle {
    fn lookup_reading(&self, _text: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

// ─── Dictionary oracle ────────────────────────────────────────────────────────

/// Exact-match word table with longest-match segmentation.
///
/// Characters not covered by any entry are copied unchanged.  If no entry
/// matches anywhere in the span the lookup returns `None`.
#[derive(Debug, Clone, Default)]
pub struct DictionaryOracle {
    entries: HashMap<String, String>,
    /// Longest key, in characters.
    max_len: usize,
}

impl DictionaryOracle {
    pub fn new(entries: HashMap<String, String>) -> Self {
        let mut oracle = Self::default();
        for (word, reading) in entries {
            oracle.insert(word, reading);
        }
        oracle
    }

    /// Load a JSON object of `{ "word": "reading", … }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read dictionary: {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse dictionary: {}", path.display()))?;
        Ok(Self::new(entries))
    }

    pub fn insert(&mut self, word: impl Into<String>, reading: impl Into<String>) {
        let word = word.into();
        if word.is_empty() {
            return;
        }
        self.max_len = self.max_len.max(word.chars().count());
        self.entries.insert(word, reading.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReadingOracle for DictionaryOracle {
    fn lookup_reading(&self, text: &str) -> Result<Option<String>> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut matched = false;
        let mut pos = 0;

        while pos < chars.len() {
            let longest = self.max_len.min(chars.len() - pos);
            let hit = (1..=longest).rev().find_map(|len| {
                let word: String = chars[pos..pos + len].iter().collect();
                self.entries.get(&word).map(|reading| (len, reading))
            });
            match hit {
                Some((len, reading)) => {
                    out.push_str(reading);
                    pos += len;
                    matched = true;
                }
                None => {
                    out.push(chars[pos]);
                    pos += 1;
                }
            }
        }

        Ok(matched.then_some(out))
    }
}

// ─── Thread-pinned oracle ─────────────────────────────────────────────────────

type Reply = mpsc::Sender<Result<Option<String>>>;

/// Runs an oracle on one dedicated thread and forwards lookups to it.
///
/// The oracle is constructed *on* that thread by the factory passed to
/// [`PinnedOracle::spawn`], so thread-affine handles never cross threads.
/// Lookups from several threads are serialised in arrival order.
pub struct PinnedOracle {
    requests: Option<mpsc::Sender<(String, Reply)>>,
    worker: Option<JoinHandle<()>>,
}

impl PinnedOracle {
    /// Start the oracle thread.  Fails if the factory fails.
    pub fn spawn<F>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn ReadingOracle>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<(String, Reply)>();
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();

        let worker = std::thread::Builder::new()
            .name("kuchipaku-oracle".into())
            .spawn(move || {
                let oracle = match factory() {
                    Ok(oracle) => {
                        let _ = init_tx.send(Ok(()));
                        oracle
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                // Ends when every sender is dropped.
                for (text, reply) in rx {
                    let _ = reply.send(oracle.lookup_reading(&text));
                }
            })
            .context("Failed to spawn oracle thread")?;

        init_rx
            .recv()
            .map_err(|_| anyhow!("oracle thread exited during initialisation"))?
            .context("Oracle initialisation failed")?;

        Ok(Self { requests: Some(tx), worker: Some(worker) })
    }
}

impl ReadingOracle for PinnedOracle {
    fn lookup_reading(&self, text: &str) -> Result<Option<String>> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| anyhow!("oracle thread already stopped"))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        requests
            .send((text.to_owned(), reply_tx))
            .map_err(|_| anyhow!("oracle thread is gone"))?;
        reply_rx.recv().map_err(|_| anyhow!("oracle thread dropped the request"))?
    }
}

impl Drop for PinnedOracle {
    fn drop(&mut self) {
        // Closing the channel stops the worker loop.
        drop(self.requests.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ─── Applying the oracle ──────────────────────────────────────────────────────

/// Runs of hiragana / kanji; only runs holding an ideograph go to the oracle.
static RE_NEEDS_READING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Hiragana}\p{Han}々〆〇ヶ]+").unwrap());

fn is_ideograph(c: char) -> bool {
    matches!(c,
        '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' | '\u{F900}'..='\u{FAFF}'
        | '々' | '〆' | '〇' | 'ヶ')
}

/// Replace every ideograph-bearing run with the oracle's reading.
///
/// Failures never propagate: the run is kept unconverted and a warning is
/// logged.
pub fn apply_oracle(text: &str, oracle: &dyn ReadingOracle) -> String {
    RE_NEEDS_READING
        .replace_all(text, |caps: &regex::Captures| {
            let span = &caps[0];
            if !span.chars().any(is_ideograph) {
                return span.to_owned();
            }
            match oracle.lookup_reading(span) {
                Ok(Some(reading)) if !reading.is_empty() => reading,
                Ok(_) => {
                    log::debug!("no reading for {:?}; keeping it", span);
                    span.to_owned()
                }
                Err(e) => {
                    log::warn!("reading lookup failed for {:?}: {:#}", span, e);
                    span.to_owned()
                }
            }
        })
        .into_owned()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
