//! # Utility Functions
//!
//! Common helpers used by the repository and the command line tool.

use crate::error::{DlcError, DlcResult};

/// Hex decoding utilities
pub mod hex_bytes {
    use super::*;

    /// Decode a hex string into exactly `N` bytes.
    ///
    /// `what` names the value in the error message.
    pub fn decode_array<const N: usize>(input: &str, what: &str) -> Result<[u8; N], String> {
        let bytes = hex::decode(input.trim()).map_err(|e| format!("{} is not valid hex: {}", what, e))?;
        bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| format!("{} must be {} bytes, got {}", what, N, bytes.len()))
    }
}

/// Short display of long hex values
pub mod display {
    /// Format a hex value with ellipsis in the middle, like "57caa081...a4ce1496"
    pub fn format_short(value: &str) -> String {
        const PREFIX: usize = 8;
        const SUFFIX: usize = 8;
        if value.len() <= PREFIX + SUFFIX + 3 {
            value.to_string()
        } else {
            format!("{}...{}", &value[..PREFIX], &value[value.len() - SUFFIX..])
        }
    }
}

/// Amount formatting utilities
pub mod amount {
    use bitcoin::Amount;

    /// Format amount with both sats and BTC
    pub fn format_dual(amount: Amount) -> String {
        format!("{} sats ({:.8} BTC)", amount.to_sat(), amount.to_btc())
    }
}

/// File system utilities
pub mod fs {
    use super::*;
    use crate::config::files;
    use std::fs;
    use std::path::{Path, PathBuf};
    use zeroize::Zeroizing;

    /// Ensure directory exists, create if it doesn't
    pub fn ensure_dir_exists(path: &Path) -> DlcResult<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Get the default data directory path (`~/.dlc`)
    pub fn default_data_dir() -> DlcResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DlcError::config("Unable to determine home directory"))?;
        Ok(home.join(files::DEFAULT_DATA_DIR))
    }

    /// Safe file write with atomic operation
    pub fn write_file_atomic(path: &Path, content: &[u8]) -> DlcResult<()> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(temp_path, path)?;
        Ok(())
    }

    /// Read a JSON document, `None` if the file does not exist yet.
    ///
    /// The raw text is wiped once parsed, since the keystore goes through here.
    pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> DlcResult<Option<T>> {
        match fs::read_to_string(path) {
            Ok(content) => {
            let content = Zeroizing::new(content);
            Ok(Some(serde_json::from_str(&content)?))
        }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a JSON document atomically
    pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> DlcResult<()> {
        let json = Zeroizing::new(serde_json::to_string_pretty(value)?);
        write_file_atomic(path, json.as_bytes())
    }
}
