use std::fs;
use log::info;
use serde::{Deserialize, Serialize};
use crate::{Error, Result, DEFAULT_CHANNEL_CAPACITY};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Parameters {
    /// Refuse an append that chains onto a transaction which is no longer the head of its parcel.
    /// Two writers racing on the same head then produce one success and one conflict
    /// instead of two children of one parent.
    pub reject_forks: bool,
    /// Accept a transaction without a previous hash only for a parcel that has no history yet.
    pub single_genesis: bool,
    /// Capacity of the channel feeding the storage task.
    pub channel_capacity: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            reject_forks: true,
            single_genesis: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads parameters from a JSON file. Missing fields keep their default value.
    pub fn from_file(path: &str) -> Result<Self> {
        let data = fs::read(path).map_err(|e| Error::ConfigReadError(path.to_string(), e))?;
        serde_json::from_slice(data.as_slice()).map_err(|e| Error::ConfigParseError(path.to_string(), e))
    }

    pub fn log(&self) {
        info!("Reject forks set to {}", self.reject_forks);
        info!("Single genesis set to {}", self.single_genesis);
        info!("Channel capacity set to {}", self.channel_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_close_the_fork_gap_only() {
        let parameters = Parameters::new();

        assert!(parameters.reject_forks);
        assert!(!parameters.single_genesis);
        assert_eq!(parameters.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "single_genesis": true }}"#).unwrap();

        let parameters = Parameters::from_file(file.path().to_str().unwrap()).unwrap();

        assert!(parameters.single_genesis);
        assert!(parameters.reject_forks);
        assert_eq!(parameters.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn unreadable_or_malformed_file_is_an_error() {
        assert!(matches!(
            Parameters::from_file("/nonexistent/parcel-ledger.json"),
            Err(Error::ConfigReadError(..))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "reject_forks = false").unwrap();
        assert!(matches!(
            Parameters::from_file(file.path().to_str().unwrap()),
            Err(Error::ConfigParseError(..))
        ));
    }
}
