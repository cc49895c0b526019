/*!
Engine configuration and settings negotiation.
*/

use serde::{Deserialize, Serialize};
use shared::{
    defaults, FormatSet, Result, ScanError, ScanSettings, Symbology, DEFAULT_CENTER_FRACTION,
};
use std::time::Duration;

/// Longest cooldown a caller may negotiate
pub const MAX_COOLDOWN_MS: u64 = 60_000;

/// Decode engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deduplication cooldown in milliseconds
    pub cooldown_ms: u64,

    /// Scan more rows, in both directions
    pub try_harder: bool,

    /// Share of each dimension used for the automatic linear ROI
    pub center_fraction: f32,

    /// Symbologies reported to callers
    pub enabled_formats: FormatSet,

    /// Crop to the centered ROI for linear-priority calls without an ROI
    pub auto_center_linear: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: defaults::COOLDOWN_MS,
            try_harder: true,
            center_fraction: DEFAULT_CENTER_FRACTION,
            enabled_formats: FormatSet::all(),
            auto_center_linear: true,
        }
    }
}

fn check_center_fraction(fraction: f32) -> Result<()> {
    if fraction.is_finite() && fraction > 0.0 && fraction < 1.0 {
        Ok(())
    } else {
        Err(ScanError::invalid_request(format!(
            "centerFraction must be inside (0, 1), got {}",
            fraction
        )))
    }
}

fn check_cooldown(cooldown_ms: u64) -> Result<()> {
    if cooldown_ms <= MAX_COOLDOWN_MS {
        Ok(())
    } else {
        Err(ScanError::invalid_request(format!(
            "cooldownMs must be at most {}, got {}",
            MAX_COOLDOWN_MS, cooldown_ms
        )))
    }
}

impl EngineConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        check_center_fraction(self.center_fraction)?;
        check_cooldown(self.cooldown_ms)?;
        Ok(())
    }

    /// Apply requested settings on top of this configuration.
    ///
    /// Every requested format must be one of `supported`; nothing changes
    /// unless the whole request is valid.
    pub fn negotiate(&self, settings: &ScanSettings, supported: &[Symbology]) -> Result<Self> {
        let mut next = self.clone();

        if let Some(names) = &settings.enabled_formats {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let formats = FormatSet::new(&names)?;
            if formats.is_empty() {
                return Err(ScanError::invalid_request(
                    "enabledFormats must name at least one format",
                ));
            }
            if let Some(missing) = formats.iter().find(|f| !supported.contains(f)) {
                return Err(ScanError::invalid_request(format!(
                    "format {} is not supported by any reader",
                    missing
                )));
            }
            next.enabled_formats = formats;
        }
        if let Some(cooldown_ms) = settings.cooldown_ms {
            check_cooldown(cooldown_ms)?;
            next.cooldown_ms = cooldown_ms;
        }
        if let Some(try_harder) = settings.try_harder {
            next.try_harder = try_harder;
        }
        if let Some(fraction) = settings.center_fraction {
            check_center_fraction(fraction)?;
            next.center_fraction = fraction;
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cooldown(), Duration::from_millis(1500));
        assert!(config.try_harder);
        assert_eq!(config.enabled_formats, FormatSet::all());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negotiate_applies_fields() {
        let settings = ScanSettings {
            enabled_formats: Some(vec!["QR_CODE".into(), "EAN_8".into()]),
            cooldown_ms: Some(500),
            try_harder: Some(false),
            center_fraction: Some(0.5),
        };
        let next = EngineConfig::default()
            .negotiate(&settings, &Symbology::ALL)
            .unwrap();

        assert_eq!(next.enabled_formats.len(), 2);
        assert!(next.enabled_formats.includes(Symbology::Ean8));
        assert_eq!(next.cooldown_ms, 500);
        assert!(!next.try_harder);
        assert_eq!(next.center_fraction, 0.5);
    }

    #[test]
    fn test_negotiate_rejects_bad_requests() {
        let base = EngineConfig::default();
        let cases = [
            ScanSettings {
                enabled_formats: Some(vec!["AZTEC".into()]),
                ..Default::default()
            },
            ScanSettings {
                enabled_formats: Some(vec![]),
                ..Default::default()
            },
            ScanSettings {
                center_fraction: Some(1.0),
                ..Default::default()
            },
            ScanSettings {
                cooldown_ms: Some(MAX_COOLDOWN_MS + 1),
                ..Default::default()
            },
        ];
        for settings in cases {
            let err = base.negotiate(&settings, &Symbology::ALL).unwrap_err();
            assert_eq!(err.code(), shared::ErrorCode::InvalidRequest, "{:?}", settings);
        }

        // Known but unsupported by the registered readers
        let settings = ScanSettings {
            enabled_formats: Some(vec!["QR_CODE".into()]),
            ..Default::default()
        };
        assert!(base.negotiate(&settings, &[Symbology::Ean8]).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);

        // Missing fields take defaults
        let partial: EngineConfig = toml::from_str("cooldown_ms = 250").unwrap();
        assert_eq!(partial.cooldown_ms, 250);
        assert!(partial.auto_center_linear);
    }
}
