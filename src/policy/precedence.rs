//! Precedence policies
//!
//! Precedence orders URIs within a queue and queues against each other.
//! Lower values are fetched first.

use crate::config::{PrecedenceConfig, PrecedenceKind};
use crate::uri::CrawlUri;
use crate::{FrontierError, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Precedence stamped by `schedule_high`; ahead of anything a policy can produce
pub const URGENT_PRECEDENCE: i32 = i32::MIN;

/// Computes the precedence of a URI as it is accepted into a queue
///
/// Lower values are more urgent. `uri_scheduled` is invoked exactly once per
/// accepted URI; calling it again just overwrites the previous value.
pub trait PrecedencePolicy: Send + Sync + Debug {
    fn precedence_for(&self, uri: &CrawlUri) -> i32;

    fn uri_scheduled(&self, uri: &mut CrawlUri) {
        uri.precedence = self.precedence_for(uri).max(URGENT_PRECEDENCE + 1);
    }
}

/// Every URI gets the same precedence
#[derive(Debug, Clone)]
pub struct BasePrecedence {
    base: i32,
}

impl BasePrecedence {
    pub fn new(base: i32) -> Self {
        Self { base }
    }
}

impl Default for BasePrecedence {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PrecedencePolicy for BasePrecedence {
    fn precedence_for(&self, _uri: &CrawlUri) -> i32 {
        self.base
    }
}

/// URIs further from their seed are less urgent
#[derive(Debug, Clone)]
pub struct HopsPrecedence {
    base: i32,
}

impl HopsPrecedence {
    pub fn new(base: i32) -> Self {
        Self { base }
    }
}

impl PrecedencePolicy for HopsPrecedence {
    fn precedence_for(&self, uri: &CrawlUri) -> i32 {
        let hops = i32::try_from(uri.path_from_seed.hop_count()).unwrap_or(i32::MAX);
        self.base.saturating_add(hops)
    }
}

/// Precedence values computed offline (e.g. link-graph ranking)
///
/// The ranking file holds one `<uri> <integer>` pair per line; blank lines
/// and lines starting with `#` are ignored. URIs absent from the file get
/// the base precedence.
#[derive(Debug, Clone)]
pub struct PreloadedPrecedence {
    base: i32,
    ranks: HashMap<String, i32>,
}

impl PreloadedPrecedence {
    /// Loads a ranking file
    ///
    /// When `higher_is_more_urgent` is set, values are negated on the way in
    /// so that the file's best-ranked URIs come out most urgent.
    pub fn load(path: &Path, base: i32, higher_is_more_urgent: bool) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let policy = Self::parse(&content, &path.display().to_string(), base, higher_is_more_urgent)?;
        info!(
            path = %path.display(),
            entries = policy.ranks.len(),
            "Loaded precedence file"
        );
        Ok(policy)
    }

    /// Parses ranking file content; `source` names the input in errors
    pub fn parse(content: &str, source: &str, base: i32, higher_is_more_urgent: bool) -> Result<Self> {
        let mut ranks = HashMap::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let error = |message: &str| FrontierError::PrecedenceFile {
                path: source.to_string(),
                line: index + 1,
                message: message.to_string(),
            };

            let mut fields = line.split_whitespace();
            let (Some(uri), Some(value), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(error("expected '<uri> <integer>'"));
            };
            let value: i32 = value
                .parse()
                .map_err(|_| error(&format!("invalid precedence '{}'", value)))?;
            let value = if higher_is_more_urgent {
                value.checked_neg().unwrap_or(i32::MAX)
            } else {
                value
            };

            let key = Url::parse(uri)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| uri.to_string());
            ranks.insert(key, value);
        }

        Ok(Self { base, ranks })
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

impl PrecedencePolicy for PreloadedPrecedence {
    fn precedence_for(&self, uri: &CrawlUri) -> i32 {
        self.ranks.get(uri.as_str()).copied().unwrap_or(self.base)
    }
}

/// Builds the configured precedence policy
pub fn precedence_from_config(config: &PrecedenceConfig) -> Result<Arc<dyn PrecedencePolicy>> {
    Ok(match config.policy {
        PrecedenceKind::Base => Arc::new(BasePrecedence::new(config.base)),
        PrecedenceKind::Hops => Arc::new(HopsPrecedence::new(config.base)),
        PrecedenceKind::Preloaded => {
            let file = config.file.as_deref().ok_or_else(|| {
                crate::ConfigError::Validation("precedence.file is not set".to_string())
            })?;
            Arc::new(PreloadedPrecedence::load(
                Path::new(file),
                config.base,
                config.higher_is_more_urgent,
            )?)
        }
    })
}
