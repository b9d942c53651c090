//! Output files produced by a run.
//!
//! # Submodules
//!
//! - [`json`]: Writes the `RunSummary` of a command to a dated JSON file
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! ├── 2025-05-06/
//! │   ├── morning.json
//! │   ├── afternoon.json
//! │   └── evening.json
//! ```

pub mod json;
