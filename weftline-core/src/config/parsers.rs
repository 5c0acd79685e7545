use anyhow::{bail, Result};
use serde::de::DeserializeOwned;

/// Parse `raw` as the config format implied by `extension` ("toml", "json",
/// case-insensitive). Any other extension is rejected rather than guessed.
pub(crate) fn parse<T: DeserializeOwned>(extension: &str, raw: &[u8]) -> Result<T> {
    match extension.to_ascii_lowercase().as_str() {
        "json" => serde_json::from_slice(raw).map_err(Into::into),
        "toml" => {
            let content = std::str::from_utf8(raw)?;
            toml::from_str(content).map_err(Into::into)
        }
        other => bail!("no config parser available for format {other}"),
    }
}
