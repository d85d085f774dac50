//! # Media Indexer
//!
//! Turns directory trees of photos and videos into deduplicated, enriched
//! search documents, with a thumbnail for each.
//!
//! # Architecture: a Stage Graph
//!
//! One run is a graph of stages connected by bounded queues:
//!
//! ```text
//! scan ─► classify ─► normalize ─┬─► resolve-location ─► commit
//!                                └─► check-thumbnail ─► generate-thumbnail
//! ```
//!
//! Each stage owns a pool of worker threads sized from the CPU count. A full
//! queue blocks its producer, so memory stays bounded however large the
//! library is. Shutdown cascades: the scanner finishes, its queue closes,
//! the next stage drains and closes the queues it feeds, and so on until the
//! terminal stages are joined.
//!
//! Per-file problems never stop a run. They become warnings on the document
//! (a malformed GPS tag, an unparseable exposure time) or counters in the
//! end-of-run report (a failed thumbnail, a geocoder timeout). Only startup
//! problems are fatal: a missing required tool, an unreadable config file.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`alias`] | Short numeric aliases for scan roots; portable `alias\path` form |
//! | [`scan`] | Walks a root, filters media files, computes content signatures |
//! | [`changes`] | Duplicate / unchanged / changed / new classification, removal of deleted files |
//! | [`metadata`] | ExifTool invocation and normalization into the [`types::Media`] document |
//! | [`geocode`] | Reverse geocoding with a coordinate-bucket cache |
//! | [`imaging`] | Thumbnail backends (vips, in-process) and video frame extraction |
//! | [`cache`] | Thumbnail manifest for idempotent re-runs |
//! | [`thumbnail`] | The check and generate thumbnail stages |
//! | [`pipeline`] | Bounded queues, worker pools, ordered shutdown |
//! | [`indexer`] | Tool probing and wiring of one run |
//! | [`store`] | The document store interface and a JSON file implementation |
//! | [`byday`] | "On this day" lookup with wraparound neighbours |
//! | [`config`] | `media-indexer.toml` loading, merging and validation |
//! | [`stats`] | Run counters |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Signatures
//!
//! Every file is identified by the SHA-256 of its bytes. The same signature
//! drives three things: a second copy of a file in one run is ignored, an
//! unchanged file is skipped on the next run, and a thumbnail already made
//! for the same content elsewhere is copied instead of regenerated.
//!
//! ## Capabilities Behind Traits
//!
//! Everything external (metadata extractor, frame extractor, thumbnail
//! backend, geocoder, document store, alias store) is a trait object chosen
//! once at startup. Production wires the command-line tools and the HTTP
//! geocoder; tests wire recording fakes.
//!
//! ## Aliased Paths
//!
//! Documents never store absolute paths. `/home/me/Pictures/2019/a.jpg`
//! under alias `1` is stored as `1\2019\a.jpg`, and thumbnails mirror that
//! layout. Moving the library means editing one alias entry.

pub mod alias;
pub mod byday;
pub mod cache;
pub mod changes;
pub mod config;
pub mod geocode;
pub mod imaging;
pub mod indexer;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod scan;
pub mod stats;
pub mod store;
pub mod thumbnail;
pub mod tools;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
