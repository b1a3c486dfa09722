//! Resolution of server-relative result addresses.

use reqwest::Url;
use sketchflow_core::types::ResultItem;

use crate::config::ConfigError;

/// The public origin that relative result paths are joined onto.
#[derive(Debug, Clone)]
pub struct Origin {
    base: Url,
}

impl Origin {
    pub fn parse(origin: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(origin).map_err(|e| ConfigError::Invalid {
            key: "SKETCHFLOW_PUBLIC_ORIGIN",
            value: origin.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                key: "SKETCHFLOW_PUBLIC_ORIGIN",
                value: origin.to_string(),
                reason: "not an http(s) origin".into(),
            });
        }
        Ok(Self { base })
    }

    /// Absolute form of `address`. Already-absolute addresses are returned
    /// unchanged; anything unparseable is returned as given.
    pub fn resolve(&self, address: &str) -> String {
        if Url::parse(address).is_ok() {
            return address.to_string();
        }
        match self.base.join(address) {
            Ok(url) => url.into(),
            Err(e) => {
                tracing::warn!(address, error = %e, "Could not resolve result address");
                address.to_string()
            }
        }
    }

    /// Download address for `item`: its absolute URL with the download
    /// token attached as `t=`. `None` when the item has no token.
    pub fn download_url(&self, item: &ResultItem) -> Option<Url> {
        let token = item.download_token.as_deref().filter(|t| !t.is_empty())?;
        let mut url = Url::parse(&self.resolve(&item.url)).ok()?;
        url.query_pairs_mut().append_pair("t", token);
        Some(url)
    }
}
