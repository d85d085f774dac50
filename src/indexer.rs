//! Wiring the stages into one indexing run.
//!
//! ```text
//! scan ─► classify ─► normalize ─┬─► resolve-location ─► commit
//!                                └─► check-thumbnail ─► generate-thumbnail
//! ```
//!
//! - **scan**: one thread walking the root ([`Scanner`]).
//! - **classify**: one worker, so duplicates are resolved in scan order
//!   ([`ChangeDetector`]). Only `New` and `Changed` candidates continue.
//! - **normalize**: runs the metadata extractor ([`Normalizer`]).
//! - **resolve-location**: place names for located documents
//!   ([`LocationResolver`]).
//! - **commit**: writes the document to the [`DocumentStore`].
//! - **check-thumbnail** / **generate-thumbnail**: the [`Thumbnailer`].
//!
//! Pool widths are fractions of the CPU count. The generator pool is half as
//! wide when images are resized in process.
//!
//! Once the graph has drained, documents of files that disappeared from the
//! root are removed (paths the scanner could not read are kept), the store is flushed, the thumbnail manifest is saved
//! and the alias is stamped with the time of this run. A dry run does none
//! of those writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::alias::{AliasError, AliasRegistry};
use crate::changes::{ChangeDetector, ChangePolicy};
use crate::config::{ConfigError, IndexerConfig, effective_threads};
use crate::geocode::{GeocodeError, HttpGeocoder, LocationResolver, ReverseGeocoder};
use crate::imaging::{
    FfmpegFrameExtractor, FrameExtractor, RustBackend, ThumbnailBackend, VipsBackend,
};
use crate::metadata::{ExifToolExtractor, MetadataExtractor, Normalizer};
use crate::pipeline::{Graph, PipelineError, StageReport, workers_for};
use crate::scan::{ScanError, Scanner};
use crate::stats::RunStats;
use crate::store::{DocumentStore, JsonDocumentStore, StoreError};
use crate::thumbnail::Thumbnailer;
use crate::tools::Tool;
use crate::types::{CandidateFile, Change, PendingDocument, ThumbnailRequest};

const NORMALIZE_RATIO: f64 = 1.0;
const LOCATION_RATIO: f64 = 1.0;
const COMMIT_RATIO: f64 = 0.25;
const CHECK_RATIO: f64 = 0.5;
const GENERATE_RATIO_FAST: f64 = 1.0;
const GENERATE_RATIO_IN_PROCESS: f64 = 0.5;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("{tool} is required but {program} could not be run")]
    ToolUnavailable { tool: &'static str, program: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Alias error: {0}")]
    Alias(#[from] AliasError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),
    #[error("Geocoder error: {0}")]
    Geocode(#[from] GeocodeError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// The external services a run talks to.
pub struct Collaborators {
    pub store: Arc<dyn DocumentStore>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub backend: Arc<dyn ThumbnailBackend>,
    pub frames: Arc<dyn FrameExtractor>,
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
}

impl Collaborators {
    /// Build the production collaborators, probing the external tools.
    ///
    /// ExifTool and ffmpeg are required; vipsthumbnail is optional and only
    /// decides which image backend is used.
    pub fn from_config(config: &IndexerConfig) -> Result<Self, IndexError> {
        let exiftool = ExifToolExtractor::new(Tool::new(&config.tools.exiftool));
        if !exiftool.is_usable() {
            return Err(IndexError::ToolUnavailable {
                tool: "exiftool",
                program: config.tools.exiftool.clone(),
            });
        }
        let ffmpeg = FfmpegFrameExtractor::new(Tool::new(&config.tools.ffmpeg));
        if !ffmpeg.is_usable() {
            return Err(IndexError::ToolUnavailable {
                tool: "ffmpeg",
                program: config.tools.ffmpeg.clone(),
            });
        }

        let vips = VipsBackend::new(Tool::new(&config.tools.vipsthumbnail));
        let backend: Arc<dyn ThumbnailBackend> = if vips.is_usable() {
            Arc::new(vips)
        } else {
            warn!(
                program = %config.tools.vipsthumbnail.display(),
                "vipsthumbnail not available, resizing images in process; HEIC images get no thumbnail"
            );
            Arc::new(RustBackend::new())
        };

        let geocoder: Option<Arc<dyn ReverseGeocoder>> = if config.location.is_enabled() {
            Some(Arc::new(HttpGeocoder::new(
                &config.location.lookup_url,
                Duration::from_secs(config.location.timeout_secs),
            )?))
        } else {
            info!("no lookup_url configured, place names are not resolved");
            None
        };

        Ok(Self {
            store: Arc::new(JsonDocumentStore::open(&config.paths.document_store)?),
            extractor: Arc::new(exiftool),
            backend,
            frames: Arc::new(ffmpeg),
            geocoder,
        })
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunSummary {
    pub alias: String,
    pub root: PathBuf,
    pub elapsed: Duration,
    pub dry_run: bool,
    pub stages: Vec<StageReport>,
    pub stats: Arc<RunStats>,
}

pub struct Indexer {
    collaborators: Collaborators,
    registry: Arc<AliasRegistry>,
    thumbnail_root: PathBuf,
    queue_capacity: usize,
    cpus: usize,
    max_workers: Option<usize>,
    cache_precision: u32,
    change_policy: ChangePolicy,
    force_reindex: bool,
    dry_run: bool,
}

impl Indexer {
    pub fn new(
        config: &IndexerConfig,
        collaborators: Collaborators,
        registry: Arc<AliasRegistry>,
    ) -> Self {
        Self {
            collaborators,
            registry,
            thumbnail_root: config.paths.thumbnails.clone(),
            queue_capacity: config.pipeline.queue_capacity,
            cpus: effective_threads(&config.pipeline),
            max_workers: config.pipeline.max_workers,
            cache_precision: config.location.cache_precision,
            change_policy: config.indexing.change_policy,
            force_reindex: config.indexing.force_reindex,
            dry_run: false,
        }
    }

    /// Run every stage without writing to the document store, the thumbnail
    /// tree or the alias registry.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn workers(&self, ratio: f64) -> usize {
        workers_for(ratio, self.cpus, self.max_workers)
    }

    /// Index everything under `root`.
    pub fn run(&self, root: &Path) -> Result<RunSummary, IndexError> {
        let started = Instant::now();
        let root = root.canonicalize()?;
        let alias = self.registry.resolve_alias(&root)?;
        info!(root = %root.display(), %alias, dry_run = self.dry_run, "indexing");

        let stats = Arc::new(RunStats::default());
        let scanner = Arc::new(Scanner::new(&root, alias.clone(), stats.clone())?);
        let detector = Arc::new(
            ChangeDetector::new(
                self.collaborators.store.clone(),
                self.change_policy,
                stats.clone(),
            )
            .force_reindex(self.force_reindex),
        );
        let normalizer = Arc::new(Normalizer::new(
            self.collaborators.extractor.clone(),
            stats.clone(),
        ));
        let resolver = Arc::new(LocationResolver::new(
            self.collaborators.geocoder.clone(),
            self.cache_precision,
            stats.clone(),
        ));
        let thumbnailer = Arc::new(
            Thumbnailer::new(
                &self.thumbnail_root,
                self.collaborators.backend.clone(),
                self.collaborators.frames.clone(),
                stats.clone(),
            )
            .dry_run(self.dry_run),
        );
        let generate_ratio = if thumbnailer.backend_name() == "rust" {
            GENERATE_RATIO_IN_PROCESS
        } else {
            GENERATE_RATIO_FAST
        };
        debug!(backend = thumbnailer.backend_name(), "thumbnail backend");

        let mut graph = Graph::new(self.queue_capacity);
        let (scanned_out, scanned_in) = graph.queue::<CandidateFile>("scanned");
        let (classified_out, classified_in) = graph.queue::<(CandidateFile, Change)>("classified");
        let (normalized_out, normalized_in) = graph.queue::<PendingDocument>("normalized");
        let (located_out, located_in) = graph.queue::<PendingDocument>("located");
        let (check_out, check_in) = graph.queue::<ThumbnailRequest>("thumbnail-check");
        let (generate_out, generate_in) = graph.queue::<ThumbnailRequest>("thumbnail-generate");

        {
            let scanner = scanner.clone();
            graph.source("scan", &[scanned_out.id()], move || {
                for candidate in scanner.scan() {
                    scanned_out.send(candidate);
                }
            })?;
        }

        {
            let detector = detector.clone();
            graph.stage("classify", 1, scanned_in, &[classified_out.id()], move |candidate: CandidateFile| {
                let change = detector.classify(&candidate);
                if change.needs_indexing() {
                    classified_out.send((candidate, change));
                }
            })?;
        }

        graph.stage(
            "normalize",
            self.workers(NORMALIZE_RATIO),
            classified_in,
            &[normalized_out.id(), check_out.id()],
            move |(candidate, change): (CandidateFile, Change)| {
                let full_path = candidate.full_path.clone();
                let media = normalizer.normalize(candidate);
                check_out.send(ThumbnailRequest {
                    full_path,
                    aliased_path: media.path.clone(),
                    mime_type: media.mimetype.clone(),
                    signature: media.signature.clone(),
                });
                normalized_out.send(PendingDocument { media, change });
            },
        )?;

        let location_workers = if resolver.is_enabled() {
            self.workers(LOCATION_RATIO)
        } else {
            1
        };
        graph.stage(
            "resolve-location",
            location_workers,
            normalized_in,
            &[located_out.id()],
            move |mut doc: PendingDocument| {
                resolver.resolve(&mut doc.media);
                located_out.send(doc);
            },
        )?;

        {
            let store = self.collaborators.store.clone();
            let stats = stats.clone();
            let dry_run = self.dry_run;
            graph.stage(
                "commit",
                self.workers(COMMIT_RATIO),
                located_in,
                &[],
                move |doc: PendingDocument| commit(store.as_ref(), &stats, doc, dry_run),
            )?;
        }

        {
            let thumbnailer = thumbnailer.clone();
            graph.stage(
                "check-thumbnail",
                self.workers(CHECK_RATIO),
                check_in,
                &[generate_out.id()],
                move |request: ThumbnailRequest| {
                    if let Some(request) = thumbnailer.check(request) {
                        generate_out.send(request);
                    }
                },
            )?;
        }

        {
            let thumbnailer = thumbnailer.clone();
            graph.stage(
                "generate-thumbnail",
                self.workers(generate_ratio),
                generate_in,
                &[],
                move |request: ThumbnailRequest| thumbnailer.generate(request),
            )?;
        }

        let stages = graph.finish()?;

        for path in scanner.unreadable() {
            warn!(%path, "unreadable, keeping its indexed documents");
            detector.keep_unreadable(&path);
        }
        detector.remove_unvisited(&alias, self.dry_run)?;
        if !self.dry_run {
            self.collaborators.store.flush()?;
            thumbnailer.save_manifest()?;
            self.registry.record_last_indexed(&alias)?;
        }

        let elapsed = started.elapsed();
        info!(%alias, elapsed_secs = elapsed.as_secs_f64(), "indexing finished");
        Ok(RunSummary {
            alias,
            root,
            elapsed,
            dry_run: self.dry_run,
            stages,
            stats,
        })
    }
}

/// Terminal stage: write one document. A failed write is counted and the
/// document is skipped; it is not retried.
fn commit(store: &dyn DocumentStore, stats: &RunStats, doc: PendingDocument, dry_run: bool) {
    let PendingDocument { media, change } = doc;
    if !dry_run
        && let Err(e) = store.put(&media)
    {
        stats.index.failed_commits.incr();
        error!(path = %media.path, error = %e, "unable to commit document");
        return;
    }
    stats.index.indexed.incr();
    match change {
        Change::New => stats.index.added.incr(),
        Change::Changed => stats.index.changed.incr(),
        Change::Unchanged | Change::Duplicate => return,
    };
    if !media.warnings.is_empty() {
        debug!(path = %media.path, warnings = ?media.warnings, "committed with warnings");
    }
}
