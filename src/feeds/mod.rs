//! Feed ingestion: download, entry extraction and body reduction.
//!
//! # Submodules
//!
//! - [`fetch`]: HTTP download with a hard timeout, failures contained per feed
//! - [`atom`]: Pattern-based extraction of `<entry>` blocks (capped at 100)
//! - [`markup`]: Reduction of entry bodies to paragraph-structured text
//!
//! The typical entry point is [`fetch_and_parse`], which never fails: a feed
//! that cannot be fetched simply contributes no items.

pub mod atom;
pub mod fetch;
pub mod markup;

pub use fetch::{fetch_and_parse, DEFAULT_FETCH_TIMEOUT};
