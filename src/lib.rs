//! # kuchipaku
//!
//! Japanese text → mouth-shape lip-sync motion for MikuMikuDance-style
//! models, written as VMD or MVD morph keyframes.
//!
//! ## Quick start
//!
//! ```no_run
//! use kuchipaku::{LipSyncConfig, LipSyncPipeline};
//!
//! let pipeline = LipSyncPipeline::new(LipSyncConfig::default()).unwrap();
//!
//! // Sampled keyframes ("あ", "い", … morphs at 30 fps)
//! let keys = pipeline.key_frames("こんにちは、せかい！");
//!
//! // Or write a motion file; the extension picks the format
//! pipeline
//!     .write_to_file("こんにちは", std::path::Path::new("hello.vmd"), None)
//!     .unwrap();
//! ```
//!
//! Kanji need a reading.  Plug a [`ReadingOracle`] in (a JSON dictionary
//! via [`DictionaryOracle`], or any analyser of your own):
//!
//! ```no_run
//! use kuchipaku::{DictionaryOracle, LipSyncConfig, LipSyncPipeline};
//!
//! let dict = DictionaryOracle::from_json_file(std::path::Path::new("words.json")).unwrap();
//! let pipeline = LipSyncPipeline::with_oracle(LipSyncConfig::default(), Box::new(dict)).unwrap();
//! assert!(!pipeline.reading("東京").is_empty());
//! ```
//!
//! ## Pipeline
//! 1. **Text preprocessing**: numbers, letters and symbols → kana.
//! 2. **Reading**: ideograph runs are read by the oracle; hiragana → katakana.
//! 3. **Segmentation**: katakana → [`LipSyncUnit`]s (shape, link, length).
//! 4. **Timelines**: one weight curve per [`MouthShape`].
//! 5. **Morph mapping**: shapes → model morph names through a preset.
//! 6. **Sampling**: curves → integer-frame [`KeyFrame`]s.
//! 7. **Encoding**: VMD or MVD bytes.
//!
//! ## C ABI
//! `libkuchipaku.a` exports the functions in [`ffi`] for host tools.

pub mod codec;
pub mod config;
pub mod error;
pub mod kana;
pub mod keyframe;
pub mod morph;
pub mod mvd;
pub mod phonemize;
pub mod pipeline;
pub mod preprocess;
pub mod timeline;
pub mod tokenize;
pub mod unit;
pub mod vmd;
pub mod worker;

// C FFI for host tools: kuchipaku_pipeline_new / write_motion_file / free.
pub mod ffi;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use codec::MotionWriter;
pub use config::LipSyncConfig;
pub use error::{LipSyncError, Result};
pub use keyframe::{KeyFrame, KeyframeSampler, SamplerConfig};
pub use morph::{MorphMapper, MorphPreset, MorphWeight};
pub use mvd::MvdWriter;
pub use phonemize::{DictionaryOracle, NullOracle, PinnedOracle, ReadingOracle};
pub use pipeline::{LipSyncPipeline, MotionFormat};
pub use preprocess::TextPreprocessor;
pub use timeline::{Timeline, TimelineBuilder, TimelineConfig, TimelineSet};
pub use tokenize::Segmenter;
pub use unit::{LinkType, LipSyncUnit, MouthShape};
pub use vmd::VmdWriter;
pub use worker::{LipSyncWorker, WorkerOutput};
