//! Loop configuration.
//!
//! Defaults suit the usual deployment (spawned child process talking over
//! stdio). The binary applies `EVALWIRE_*` environment overrides on top.

use std::fmt;
use std::str::FromStr;

use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Default number of bytes requested per read from the input stream.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Response shape and statement handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// Classify statements; responses carry `result`, `error` and `etype`.
    Typed,
    /// Classify statements; responses carry `result` and `error`.
    #[default]
    Standard,
    /// Evaluate every statement as an expression; `result` and `error`.
    EvalOnly,
}

impl ProtocolVariant {
    /// Whether statements are split into expressions and statement sequences.
    pub fn uses_classifier(self) -> bool {
        !matches!(self, ProtocolVariant::EvalOnly)
    }

    /// Whether responses include the `etype` key.
    pub fn reports_error_type(self) -> bool {
        matches!(self, ProtocolVariant::Typed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVariant::Typed => "typed",
            ProtocolVariant::Standard => "standard",
            ProtocolVariant::EvalOnly => "eval-only",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "typed" => Ok(ProtocolVariant::Typed),
            "standard" => Ok(ProtocolVariant::Standard),
            "eval-only" | "eval_only" | "evalonly" => Ok(ProtocolVariant::EvalOnly),
            other => Err(format!("unknown protocol variant '{other}'")),
        }
    }
}

/// Settings for one [`Repl`](crate::Repl).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplConfig {
    pub variant: ProtocolVariant,
    /// Largest accepted request, in bytes.
    pub max_message_size: usize,
    /// Bytes requested per read. `1` reads byte-at-a-time.
    pub read_chunk_size: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl ReplConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Invalid values are logged and skipped.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(variant) = lookup("EVALWIRE_VARIANT") {
            match variant.parse() {
                Ok(parsed) => self.variant = parsed,
                Err(e) => tracing::warn!("Ignoring EVALWIRE_VARIANT: {}", e),
            }
        }

        if let Some(size) = lookup("EVALWIRE_MAX_MESSAGE_SIZE") {
            match size.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.max_message_size = n,
                _ => tracing::warn!("Ignoring EVALWIRE_MAX_MESSAGE_SIZE={:?}", size),
            }
        }

        if let Some(chunk) = lookup("EVALWIRE_READ_CHUNK") {
            match chunk.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.read_chunk_size = n,
                _ => tracing::warn!("Ignoring EVALWIRE_READ_CHUNK={:?}", chunk),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> ReplConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = ReplConfig::default();
        config.apply_overrides(|key| env.get(key).cloned());
        config
    }

    #[test]
    fn test_defaults() {
        let config = ReplConfig::default();
        assert_eq!(config.variant, ProtocolVariant::Standard);
        assert_eq!(config.max_message_size, 64 * 1024 * 1024);
        assert_eq!(config.read_chunk_size, 64 * 1024);
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!("typed".parse(), Ok(ProtocolVariant::Typed));
        assert_eq!(" Standard ".parse(), Ok(ProtocolVariant::Standard));
        assert_eq!("eval-only".parse(), Ok(ProtocolVariant::EvalOnly));
        assert_eq!("eval_only".parse(), Ok(ProtocolVariant::EvalOnly));
        assert!("verbose".parse::<ProtocolVariant>().is_err());

        for variant in [
            ProtocolVariant::Typed,
            ProtocolVariant::Standard,
            ProtocolVariant::EvalOnly,
        ] {
            assert_eq!(variant.to_string().parse(), Ok(variant));
        }
    }

    #[test]
    fn test_variant_capabilities() {
        assert!(ProtocolVariant::Typed.uses_classifier());
        assert!(ProtocolVariant::Typed.reports_error_type());
        assert!(ProtocolVariant::Standard.uses_classifier());
        assert!(!ProtocolVariant::Standard.reports_error_type());
        assert!(!ProtocolVariant::EvalOnly.uses_classifier());
        assert!(!ProtocolVariant::EvalOnly.reports_error_type());
    }

    #[test]
    fn test_overrides_applied() {
        let config = overrides(&[
            ("EVALWIRE_VARIANT", "typed"),
            ("EVALWIRE_MAX_MESSAGE_SIZE", "4096"),
            ("EVALWIRE_READ_CHUNK", "1"),
        ]);
        assert_eq!(config.variant, ProtocolVariant::Typed);
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.read_chunk_size, 1);
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let config = overrides(&[
            ("EVALWIRE_VARIANT", "loud"),
            ("EVALWIRE_MAX_MESSAGE_SIZE", "-1"),
            ("EVALWIRE_READ_CHUNK", "0"),
        ]);
        assert_eq!(config, ReplConfig::default());
    }
}
