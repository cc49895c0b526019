/*!
# Scan Engine

Ties the pipeline together for one frame: validate the buffer, pick the
region, derive luminance, run the readers, translate corner points back to
frame coordinates, and gate the result through the deduplication cache.

The engine itself is synchronous. The deduplication cache is the only state
shared between calls.
*/

use crate::bitmap;
use crate::config::EngineConfig;
use crate::dedup::DedupCache;
use crate::orchestrator::DecodeOrchestrator;
use crate::readers::ReaderRegistry;
use crate::roi;
use shared::{
    CacheStats, DecodeOptions, DecodeOutcome, EngineCapabilities, Frame, FormatSet, Result, Roi,
    ScanPriority, ScanSettings, SymbologyCapability,
};
use tracing::{debug, info};

/// Capabilities an engine built from `config` and `registry` would advertise
pub fn capabilities_for(config: &EngineConfig, registry: &ReaderRegistry) -> EngineCapabilities {
    let symbologies = registry.symbologies();
    let supported: FormatSet = symbologies.iter().copied().collect();

    EngineCapabilities {
        version: crate::VERSION.to_string(),
        symbologies: symbologies.into_iter().map(SymbologyCapability::from).collect(),
        enabled_formats: config.enabled_formats.intersection(&supported),
        cooldown_ms: config.cooldown_ms,
        try_harder: config.try_harder,
        center_fraction: config.center_fraction,
    }
}

/// Decode engine for camera frames
#[derive(Debug)]
pub struct ScanEngine {
    orchestrator: DecodeOrchestrator,
    cache: DedupCache,
    config: EngineConfig,
}

impl ScanEngine {
    /// Engine with every shipped reader
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_registry(config, ReaderRegistry::standard())
    }

    /// Engine with a caller-built registry
    pub fn with_registry(mut config: EngineConfig, registry: ReaderRegistry) -> Result<Self> {
        config.validate()?;

        let supported: FormatSet = registry.symbologies().into_iter().collect();
        config.enabled_formats = config.enabled_formats.intersection(&supported);

        info!(
            "🔍 Scan engine ready: {} readers, {} of {} formats enabled",
            registry.len(),
            config.enabled_formats.len(),
            supported.len()
        );

        Ok(Self {
            orchestrator: DecodeOrchestrator::new(
                registry,
                config.enabled_formats.clone(),
                config.try_harder,
            ),
            cache: DedupCache::new(config.cooldown()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Region actually decoded for `frame` under `options`, `None` for the whole frame
    pub fn effective_roi(&self, frame: &Frame, options: &DecodeOptions) -> Option<Roi> {
        match options.roi {
            Some(roi) => Some(roi),
            None if options.priority() == ScanPriority::Linear && self.config.auto_center_linear => {
                Some(roi::center_roi(
                    frame.width(),
                    frame.height(),
                    self.config.center_fraction,
                ))
            }
            None => None,
        }
    }

    /// Decode one frame.
    ///
    /// Validation failures are errors; nothing found and repeat sightings
    /// are outcomes. Duplicates are judged at the frame's capture instant.
    pub fn decode_frame(&self, frame: &Frame, options: &DecodeOptions) -> Result<DecodeOutcome> {
        let image = bitmap::from_frame(frame)?;
        let region = self.effective_roi(frame, options);

        let gray = match region {
            Some(region) => bitmap::luminance(&roi::extract(&image, region)?),
            None => bitmap::luminance(&image),
        };

        let decoded = self
            .orchestrator
            .decode(&gray, options.priority(), frame.timestamp_ms())?;
        let Some(mut result) = decoded else {
            return Ok(DecodeOutcome::NotFound);
        };

        if let Some(region) = region {
            for point in result.corner_points.iter_mut() {
                *point = point.translate(region.x as f32, region.y as f32);
            }
        }

        let now = frame.captured();
        self.cache.maybe_cleanup_at(now);
        if self.cache.check_and_add_at(&result, now) {
            debug!("Suppressed duplicate {} {}", result.format, result.text);
            return Ok(DecodeOutcome::Duplicate);
        }

        info!("✅ Decoded {}: {}", result.format, result.text);
        Ok(DecodeOutcome::Found(result))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("🧹 Dedup cache cleared");
    }

    /// What this engine reads and how it is configured
    pub fn capabilities(&self) -> EngineCapabilities {
        capabilities_for(&self.config, self.orchestrator.registry())
    }

    /// Apply requested settings; the engine is unchanged if they are rejected
    pub fn configure(&mut self, settings: &ScanSettings) -> Result<EngineCapabilities> {
        let supported = self.orchestrator.registry().symbologies();
        let next = self.config.negotiate(settings, &supported)?;

        self.orchestrator
            .configure(next.enabled_formats.clone(), next.try_harder);
        self.cache.set_cooldown(next.cooldown());
        self.config = next;

        info!(
            "🔧 Engine reconfigured: {} formats, cooldown {} ms, try_harder {}",
            self.config.enabled_formats.len(),
            self.config.cooldown_ms,
            self.config.try_harder
        );
        Ok(self.capabilities())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use shared::{Point, ScanError, Symbology};
    use std::time::{Duration, Instant};

    fn engine() -> ScanEngine {
        ScanEngine::new(EngineConfig::default()).unwrap()
    }

    fn ean8_frame(at: Instant) -> Frame {
        testing::linear_frame_at(&testing::ean8_modules("1234567"), 4, 640, 480, at)
    }

    #[test]
    fn test_found_then_duplicate_then_found_again() {
        let engine = engine();
        let t0 = Instant::now();
        let frame = ean8_frame(t0);
        let options = DecodeOptions::default();

        let outcome = engine.decode_frame(&frame, &options).unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.text, "12345670");
        assert_eq!(result.format, Symbology::Ean8);
        assert_eq!(result.timestamp, frame.timestamp_ms());

        let later = frame.recaptured(t0 + Duration::from_millis(200));
        assert_eq!(
            engine.decode_frame(&later, &options).unwrap(),
            DecodeOutcome::Duplicate
        );

        let much_later = frame.recaptured(t0 + Duration::from_secs(3));
        let outcome = engine.decode_frame(&much_later, &options).unwrap();
        assert_eq!(outcome.result().unwrap().text, "12345670");
        assert_eq!(engine.cache_stats().cache_size, 1);
    }

    #[test]
    fn test_linear_roi_points_in_frame_coordinates() {
        let frame = ean8_frame(Instant::now());

        let linear = engine()
            .decode_frame(&frame, &DecodeOptions::with_priority(ScanPriority::Linear))
            .unwrap();
        let auto = engine()
            .decode_frame(&frame, &DecodeOptions::default())
            .unwrap();

        // Symbol starts at x = 186; start guard center is 6 px in
        let expected_start = Point::new(192.0, 240.5);
        assert_eq!(linear.result().unwrap().corner_points[0], expected_start);
        assert_eq!(auto.result().unwrap().corner_points[0], expected_start);
    }

    #[test]
    fn test_effective_roi() {
        let engine = engine();
        let frame = testing::blank_frame(640, 480);

        assert_eq!(engine.effective_roi(&frame, &DecodeOptions::default()), None);
        assert_eq!(
            engine.effective_roi(&frame, &DecodeOptions::with_priority(ScanPriority::Linear)),
            Some(Roi::new(96, 72, 448, 336))
        );
        let explicit = Roi::new(1, 2, 3, 4);
        assert_eq!(
            engine.effective_roi(&frame, &DecodeOptions::with_roi(explicit)),
            Some(explicit)
        );
    }

    #[test]
    fn test_validation_errors() {
        let engine = engine();
        let options = DecodeOptions::default();

        let short = Frame::new(vec![0u8; 10], 640, 480);
        assert!(matches!(
            engine.decode_frame(&short, &options),
            Err(ScanError::InvalidImage(_))
        ));

        let empty = Frame::new(Vec::<u8>::new(), 640, 480);
        assert!(matches!(
            engine.decode_frame(&empty, &options),
            Err(ScanError::MissingImageData)
        ));

        let frame = testing::blank_frame(64, 48);
        let outside = DecodeOptions::with_roi(Roi::new(60, 0, 10, 10));
        assert!(matches!(
            engine.decode_frame(&frame, &outside),
            Err(ScanError::InvalidRoi(_))
        ));
    }

    #[test]
    fn test_not_found_outcomes() {
        let engine = engine();
        let blank = testing::blank_frame(320, 240);
        assert_eq!(
            engine.decode_frame(&blank, &DecodeOptions::default()).unwrap(),
            DecodeOutcome::NotFound
        );

        let frame = ean8_frame(Instant::now());
        let matrix_only = DecodeOptions::with_priority(ScanPriority::Matrix);
        assert_eq!(
            engine.decode_frame(&frame, &matrix_only).unwrap(),
            DecodeOutcome::NotFound
        );
        assert_eq!(engine.cache_stats().cache_size, 0);
    }

    #[test]
    fn test_configure_changes_behaviour() {
        let mut engine = engine();
        let caps = engine
            .configure(&ScanSettings {
                enabled_formats: Some(vec!["CODE_128".into()]),
                cooldown_ms: Some(250),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(caps.cooldown_ms, 250);
        assert_eq!(caps.symbologies.len(), 6);
        assert_eq!(engine.cache_stats().cooldown_ms, 250);

        let frame = ean8_frame(Instant::now());
        assert_eq!(
            engine.decode_frame(&frame, &DecodeOptions::default()).unwrap(),
            DecodeOutcome::NotFound
        );

        // Rejected request leaves the engine as it was
        assert!(engine
            .configure(&ScanSettings {
                center_fraction: Some(-1.0),
                ..Default::default()
            })
            .is_err());
        assert_eq!(engine.config().cooldown_ms, 250);
    }

    fn qr_frame() -> Frame {
        // 105 px symbol spanning x 100..205, y 60..165
        testing::qr_frame("SHELF-0042", 5, 320, 240, (100, 60))
    }

    #[test]
    fn test_qr_found_with_matrix_and_auto() {
        let frame = qr_frame();

        for priority in [ScanPriority::Matrix, ScanPriority::Auto] {
            let outcome = engine()
                .decode_frame(&frame, &DecodeOptions::with_priority(priority))
                .unwrap();
            let result = outcome.result().unwrap();
            assert_eq!(result.text, "SHELF-0042");
            assert_eq!(result.format, Symbology::QrCode);
            assert_eq!(result.confidence, 1.0);
            assert_eq!(result.corner_points.len(), 4);
        }
    }

    #[test]
    fn test_qr_not_found_with_linear_priority() {
        assert_eq!(
            engine()
                .decode_frame(&qr_frame(), &DecodeOptions::with_priority(ScanPriority::Linear))
                .unwrap(),
            DecodeOutcome::NotFound
        );
    }

    #[test]
    fn test_qr_roi_points_in_frame_coordinates() {
        let frame = qr_frame();
        let whole = engine()
            .decode_frame(&frame, &DecodeOptions::with_priority(ScanPriority::Matrix))
            .unwrap();
        let cropped = engine()
            .decode_frame(
                &frame,
                &DecodeOptions {
                    roi: Some(Roi::new(30, 10, 250, 220)),
                    priority: Some(ScanPriority::Matrix),
                },
            )
            .unwrap();

        let whole = &whole.result().unwrap().corner_points;
        let cropped = &cropped.result().unwrap().corner_points;
        assert_eq!(whole.len(), cropped.len());
        for (a, b) in whole.iter().zip(cropped) {
            assert!((a.x - b.x).abs() <= 1.0 && (a.y - b.y).abs() <= 1.0, "{:?} vs {:?}", a, b);
            // Frame space, not ROI space
            assert!(b.x >= 90.0 && b.x <= 215.0 && b.y >= 50.0 && b.y <= 175.0, "{:?}", b);
        }
    }

    #[test]
    fn test_racing_decodes_report_one_found() {
        let engine = engine();
        let frame = ean8_frame(Instant::now());
        let options = DecodeOptions::default();

        let outcomes: Vec<DecodeOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| engine.decode_frame(&frame, &options).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let found = outcomes.iter().filter(|o| o.result().is_some()).count();
        let duplicates = outcomes.iter().filter(|o| o.is_duplicate()).count();
        assert_eq!(found, 1);
        assert_eq!(duplicates, 3);
    }

    #[test]
    fn test_clear_cache_allows_immediate_repeat() {
        let engine = engine();
        let t0 = Instant::now();
        let frame = ean8_frame(t0);
        let options = DecodeOptions::default();

        assert!(engine.decode_frame(&frame, &options).unwrap().result().is_some());
        engine.clear_cache();
        assert_eq!(engine.cache_stats().cache_size, 0);
        assert!(engine.decode_frame(&frame, &options).unwrap().result().is_some());
    }
}
