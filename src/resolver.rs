use crate::config::LookupConfig;
use crate::error::ProcessingError;
use crate::fields::only_digits;
use log::{debug, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::time::Duration;

/// Remote source of legal names, keyed by the 14-digit tax ID
pub trait NameLookup {
    fn lookup(&self, tax_id_digits: &str) -> Result<Option<String>, ProcessingError>;
}

/// Tax ID to display name, as the extractors see it
///
/// Never fails: anything that goes wrong is "no name", and the caller falls
/// back to the organization text found in the document.
pub trait NameResolver {
    fn resolve(&self, formatted_tax_id: &str) -> Option<String>;
}

/// Resolver for offline runs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookup;

impl NameResolver for NoLookup {
    fn resolve(&self, _formatted_tax_id: &str) -> Option<String> {
        None
    }
}

/// Memoizing wrapper around a `NameLookup`
///
/// Every outcome, misses included, is kept for the life of the resolver.
/// The cache is not bounded.
pub struct CachedResolver<L> {
    lookup: L,
    cache: Mutex<FxHashMap<String, Option<String>>>,
}

impl<L: NameLookup> CachedResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<L: NameLookup> NameResolver for CachedResolver<L> {
    fn resolve(&self, formatted_tax_id: &str) -> Option<String> {
        let digits = only_digits(formatted_tax_id);
        if digits.len() != 14 {
            debug!("Skipping lookup for malformed tax ID {:?}", formatted_tax_id);
            return None;
        }

        if let Some(hit) = self.cache.lock().get(&digits) {
            return hit.clone();
        }

        let outcome = match self.lookup.lookup(&digits) {
            Ok(name) => name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            Err(e) => {
                warn!("Name lookup for {} failed: {}", digits, e);
                None
            }
        };

        self.cache.lock().insert(digits, outcome.clone());
        outcome
    }
}

/// Public CNPJ registry lookup over HTTP
///
/// Each call waits at most `timeout`; a slow answer counts as no answer.
pub struct BrasilApiLookup {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    base_url: String,
}

impl BrasilApiLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProcessingError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ProcessingError::SystemError(format!("Failed to create runtime: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessingError::SystemError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            runtime,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl NameLookup for BrasilApiLookup {
    fn lookup(&self, tax_id_digits: &str) -> Result<Option<String>, ProcessingError> {
        let url = format!("{}/{}", self.base_url, tax_id_digits);
        debug!("Looking up {}", url);

        self.runtime.block_on(async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ProcessingError::LookupError(e.to_string()))?;

            if !response.status().is_success() {
                debug!("Lookup for {} returned {}", tax_id_digits, response.status());
                return Ok(None);
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| ProcessingError::LookupError(e.to_string()))?;
            Ok(name_from_payload(&body))
        })
    }
}

/// Resolver described by the lookup settings
///
/// Disabled lookups resolve nothing, so records keep the organization text
/// read from the document.
pub fn build_resolver(config: &LookupConfig) -> Result<Box<dyn NameResolver>, ProcessingError> {
    if !config.enabled {
        return Ok(Box::new(NoLookup));
    }
    let lookup = BrasilApiLookup::new(&config.base_url, config.timeout())?;
    Ok(Box::new(CachedResolver::new(lookup)))
}

/// Legal name first, then trade name
fn name_from_payload(body: &Value) -> Option<String> {
    ["razao_social", "nome_fantasia", "nome"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}
