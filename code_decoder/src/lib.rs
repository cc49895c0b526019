/*!
# Code Decoder - Real-Time Barcode and 2D-Code Engine

Decodes optical codes from raw RGBA camera frames.

## Pipeline

1. [`bitmap`] wraps the raw buffer as an image without copying
2. [`roi`] optionally crops to a region (automatic center crop for linear scans)
3. [`bitmap::luminance`] derives the grayscale plane, fresh for every attempt
4. [`orchestrator`] runs the readers selected by the scan priority
5. [`dedup`] suppresses repeat sightings within the cooldown window

[`ScanEngine`] runs the whole pipeline for one frame.

## Usage

```rust,no_run
use code_decoder::{EngineConfig, ScanEngine};
use shared::{DecodeOptions, DecodeOutcome, Frame, ScanPriority};

let engine = ScanEngine::new(EngineConfig::default())?;
let frame = Frame::new(vec![255u8; 640 * 480 * 4], 640, 480);

match engine.decode_frame(&frame, &DecodeOptions::with_priority(ScanPriority::Linear))? {
    DecodeOutcome::Found(result) => println!("{}: {}", result.format, result.text),
    DecodeOutcome::Duplicate => println!("seen recently"),
    DecodeOutcome::NotFound => println!("nothing"),
}
# Ok::<(), shared::ScanError>(())
```
*/

pub mod bitmap;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod fallback;
pub mod hints;
pub mod orchestrator;
pub mod readers;
pub mod roi;
pub mod scanline;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::EngineConfig;
pub use dedup::DedupCache;
pub use engine::ScanEngine;
pub use hints::DecodeHints;
pub use orchestrator::DecodeOrchestrator;
pub use readers::{FormatReader, ReaderError, ReaderMatch, ReaderRegistry};

/// Engine version reported in capabilities
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
