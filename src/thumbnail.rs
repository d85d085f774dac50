//! The two thumbnail stages: check and generate.
//!
//! The check stage consults the [`ThumbnailManifest`] and only forwards
//! requests whose thumbnail is missing or stale. The generate stage first
//! looks for a thumbnail of the same content at another path (a renamed file,
//! or one folder indexed under two aliases) and copies it; otherwise it
//! dispatches on the MIME top-level type:
//!
//! - `image/*` goes to the process-wide [`ThumbnailBackend`] (vips or rust).
//!   Types the backend cannot decode (HEIC without vips) are skipped.
//! - `video/*` gets a frame from the [`FrameExtractor`], which is then
//!   resized in process.
//!
//! Every failure is counted and logged; the document it belongs to is
//! indexed regardless.
//!
//! A thumbnail for `A\dir\name.ext` lives at `<root>/A/dir/name.ext.jpg`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::alias::split_aliased_path;
use crate::cache::{ThumbnailManifest, hash_thumbnail_params};
use crate::imaging::{
    FrameExtractor, RustBackend, ThumbnailBackend, ThumbnailConfig, create_image_thumbnail,
    create_video_thumbnail,
};
use crate::stats::RunStats;
use crate::types::{ThumbnailRequest, top_level_type};

/// Progress is logged every this many generation attempts.
const PROGRESS_INTERVAL: u64 = 500;

pub struct Thumbnailer {
    root: PathBuf,
    config: ThumbnailConfig,
    params_hash: String,
    backend: Arc<dyn ThumbnailBackend>,
    resizer: Arc<dyn ThumbnailBackend>,
    frames: Arc<dyn FrameExtractor>,
    manifest: Mutex<ThumbnailManifest>,
    stats: Arc<RunStats>,
    dry_run: bool,
}

impl Thumbnailer {
    /// Build a thumbnailer writing under `root`, loading the manifest found
    /// there (or starting empty).
    pub fn new(
        root: impl Into<PathBuf>,
        backend: Arc<dyn ThumbnailBackend>,
        frames: Arc<dyn FrameExtractor>,
        stats: Arc<RunStats>,
    ) -> Self {
        let root = root.into();
        let config = ThumbnailConfig::default();
        let manifest = ThumbnailManifest::load(&root);
        debug!(root = %root.display(), entries = manifest.len(), "loaded thumbnail manifest");
        Self {
            params_hash: hash_thumbnail_params(config.max_height, config.quality.value()),
            root,
            config,
            backend,
            resizer: Arc::new(RustBackend::new()),
            frames,
            manifest: Mutex::new(manifest),
            stats,
            dry_run: false,
        }
    }

    pub fn with_config(mut self, config: ThumbnailConfig) -> Self {
        self.params_hash = hash_thumbnail_params(config.max_height, config.quality.value());
        self.config = config;
        self
    }

    /// Replace the in-process resizer used for video frames.
    pub fn with_resizer(mut self, resizer: Arc<dyn ThumbnailBackend>) -> Self {
        self.resizer = resizer;
        self
    }

    /// In a dry run requests are checked but nothing is written.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest(&self) -> MutexGuard<'_, ThumbnailManifest> {
        self.manifest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Where the thumbnail of `aliased` lives on disk.
    pub fn thumbnail_path(&self, aliased: &str) -> Option<PathBuf> {
        thumb_rel_path(aliased).map(|rel| self.root.join(rel))
    }

    /// Check stage: `Some(request)` when the thumbnail must be (re)generated.
    pub fn check(&self, request: ThumbnailRequest) -> Option<ThumbnailRequest> {
        let Some(rel) = thumb_rel_path(&request.aliased_path) else {
            self.stats.thumbnails.failed_checks.incr();
            warn!(path = %request.aliased_path, "cannot place a thumbnail for this path");
            return None;
        };
        let current =
            self.manifest()
                .is_current(&rel, &request.signature, &self.params_hash, &self.root);
        if current {
            self.stats.thumbnails.skipped_current.incr();
            debug!(path = %request.aliased_path, "thumbnail is current");
            None
        } else {
            Some(request)
        }
    }

    /// Generate stage. Never fails: outcomes land in the run counters.
    pub fn generate(&self, request: ThumbnailRequest) {
        let attempted = self.stats.thumbnails.attempted.incr();
        if attempted % PROGRESS_INTERVAL == 0 {
            info!(attempted, "thumbnail progress");
        }
        if self.dry_run {
            debug!(path = %request.aliased_path, "dry run: thumbnail not written");
            return;
        }
        let Some(rel) = thumb_rel_path(&request.aliased_path) else {
            self.stats.thumbnails.failed_checks.incr();
            return;
        };
        let output = self.root.join(&rel);

        if self.copy_existing(&request, &rel, &output) {
            return;
        }

        let kind = top_level_type(&request.mime_type);
        if kind == "image" && !self.backend.decodes(&request.mime_type) {
            self.stats.thumbnails.unsupported.incr();
            debug!(path = %request.aliased_path, mime = %request.mime_type, backend = self.backend.name(), "backend cannot decode this type");
            return;
        }
        let (result, generated, failed) = match kind.as_str() {
            "image" => (
                create_image_thumbnail(
                    self.backend.as_ref(),
                    &request.full_path,
                    &output,
                    &self.config,
                ),
                &self.stats.thumbnails.generated_image,
                &self.stats.thumbnails.failed_image,
            ),
            "video" => (
                create_video_thumbnail(
                    self.frames.as_ref(),
                    self.resizer.as_ref(),
                    &request.full_path,
                    &output,
                    &self.config,
                ),
                &self.stats.thumbnails.generated_video,
                &self.stats.thumbnails.failed_video,
            ),
            _ => {
                debug!(path = %request.aliased_path, mime = %request.mime_type, "no thumbnail for this type");
                return;
            }
        };

        match result {
            Ok(()) => {
                generated.incr();
                debug!(path = %request.aliased_path, thumbnail = %rel, "generated thumbnail");
                self.manifest()
                    .insert(rel, request.signature, self.params_hash.clone());
            }
            Err(e) => {
                failed.incr();
                warn!(path = %request.full_path.display(), kind = %kind, error = %e, "thumbnail generation failed");
            }
        }
    }

    /// Copy a thumbnail of the same content from another path, if one exists.
    fn copy_existing(&self, request: &ThumbnailRequest, rel: &str, output: &Path) -> bool {
        let cached = self
            .manifest()
            .find_cached(&request.signature, &self.params_hash, &self.root);
        let Some(stored) = cached.filter(|stored| stored != rel) else {
            return false;
        };
        let copied = output
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::copy(self.root.join(&stored), output));
        match copied {
            Ok(_) => {
                self.stats.thumbnails.copied.incr();
                debug!(from = %stored, to = %rel, "copied thumbnail of identical content");
                self.manifest().insert(
                    rel.to_string(),
                    request.signature.clone(),
                    self.params_hash.clone(),
                );
                true
            }
            Err(e) => {
                debug!(from = %stored, to = %rel, error = %e, "copy failed, regenerating");
                false
            }
        }
    }

    /// Persist the manifest. A dry run leaves it untouched.
    pub fn save_manifest(&self) -> io::Result<()> {
        if self.dry_run {
            return Ok(());
        }
        self.manifest().save(&self.root)
    }
}

/// `1\2019\trip\a.CR2` → `1/2019/trip/a.CR2.jpg`
///
/// The source extension stays in the name so `a.jpg` and `a.png` in one
/// folder get separate thumbnails.
pub fn thumb_rel_path(aliased: &str) -> Option<String> {
    let (alias, rest) = split_aliased_path(aliased);
    let name = rest.rsplit('/').next().unwrap_or_default();
    if alias.is_empty() || name.is_empty() {
        return None;
    }
    Some(format!("{alias}/{rest}.jpg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::BackendError;
    use crate::imaging::backend::tests::MockBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Frame extractor that writes a placeholder frame, or nothing at all.
    struct FakeFrames {
        produce: bool,
        calls: AtomicUsize,
    }

    impl FakeFrames {
        fn producing() -> Arc<Self> {
            Arc::new(Self {
                produce: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                produce: false,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl FrameExtractor for FakeFrames {
        fn extract_frame(&self, _: &Path, _: f64, output: &Path) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.produce {
                std::fs::write(output, b"frame")?;
            }
            Ok(())
        }
    }

    fn request(aliased: &str, mime: &str, signature: &str) -> ThumbnailRequest {
        ThumbnailRequest {
            full_path: PathBuf::from("/photos").join(aliased.replace('\\', "/")),
            aliased_path: aliased.to_string(),
            mime_type: mime.to_string(),
            signature: signature.to_string(),
        }
    }

    struct Fixture {
        tmp: TempDir,
        backend: Arc<MockBackend>,
        resizer: Arc<MockBackend>,
        stats: Arc<RunStats>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
                backend: Arc::new(MockBackend::new()),
                resizer: Arc::new(MockBackend::new()),
                stats: Arc::new(RunStats::default()),
            }
        }

        fn thumbnailer(&self, frames: Arc<FakeFrames>) -> Thumbnailer {
            Thumbnailer::new(
                self.tmp.path().join("thumbs"),
                self.backend.clone(),
                frames,
                self.stats.clone(),
            )
            .with_resizer(self.resizer.clone())
        }
    }

    // =========================================================================
    // Placement
    // =========================================================================

    #[test]
    fn thumbnail_paths_mirror_aliased_paths() {
        assert_eq!(
            thumb_rel_path("1\\2019\\trip\\a.CR2").as_deref(),
            Some("1/2019/trip/a.CR2.jpg")
        );
        assert_eq!(thumb_rel_path("12\\clip.mov").as_deref(), Some("12/clip.mov.jpg"));
        assert_eq!(thumb_rel_path("1\\noext").as_deref(), Some("1/noext.jpg"));
        assert_eq!(thumb_rel_path("1\\dir.d\\a").as_deref(), Some("1/dir.d/a.jpg"));
        assert_eq!(thumb_rel_path("1"), None);
        assert_eq!(thumb_rel_path("\\a.jpg"), None);
    }

    #[test]
    fn files_sharing_a_stem_get_separate_thumbnails() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        thumbs.generate(request("1\\IMG_0001.HEIC", "image/heic", "still"));
        thumbs.generate(request("1\\IMG_0001.MOV", "video/quicktime", "motion"));

        let still = thumbs.thumbnail_path("1\\IMG_0001.HEIC").unwrap();
        let motion = thumbs.thumbnail_path("1\\IMG_0001.MOV").unwrap();
        assert_ne!(still, motion);
        assert!(still.exists());
        assert!(motion.exists());
        assert_eq!(fx.stats.thumbnails.generated_image.get(), 1);
        assert_eq!(fx.stats.thumbnails.generated_video.get(), 1);
    }

    // =========================================================================
    // Check stage
    // =========================================================================

    #[test]
    fn missing_thumbnail_is_forwarded() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        let req = request("1\\a.jpg", "image/jpeg", "sig");
        assert_eq!(thumbs.check(req.clone()), Some(req));
        assert_eq!(fx.stats.thumbnails.skipped_current.get(), 0);
    }

    #[test]
    fn generated_thumbnail_is_current_afterwards() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        let req = request("1\\a.jpg", "image/jpeg", "sig");

        thumbs.generate(thumbs.check(req.clone()).unwrap());
        assert_eq!(thumbs.check(req), None);
        assert_eq!(fx.stats.thumbnails.skipped_current.get(), 1);
        assert_eq!(fx.stats.thumbnails.generated_image.get(), 1);
    }

    #[test]
    fn changed_content_is_regenerated() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        thumbs.generate(request("1\\a.jpg", "image/jpeg", "old"));

        let changed = request("1\\a.jpg", "image/jpeg", "new");
        assert_eq!(thumbs.check(changed.clone()), Some(changed));
    }

    #[test]
    fn unplaceable_path_is_a_failed_check() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        assert_eq!(thumbs.check(request("1", "image/jpeg", "sig")), None);
        assert_eq!(fx.stats.thumbnails.failed_checks.get(), 1);
    }

    #[test]
    fn manifest_survives_a_restart() {
        let fx = Fixture::new();
        let req = request("1\\a.jpg", "image/jpeg", "sig");
        {
            let thumbs = fx.thumbnailer(FakeFrames::producing());
            thumbs.generate(req.clone());
            thumbs.save_manifest().unwrap();
        }
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        assert_eq!(thumbs.check(req), None);
    }

    // =========================================================================
    // Generate stage
    // =========================================================================

    #[test]
    fn images_go_to_the_backend() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        thumbs.generate(request("1\\2019\\a.png", "image/png", "sig"));

        let ops = fx.backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(ops[0].output.ends_with("1/2019/a.png.jpg"));
        assert_eq!(ops[0].max_height, 170);
        assert!(fx.resizer.get_operations().is_empty());
        assert!(thumbs.thumbnail_path("1\\2019\\a.png").unwrap().exists());
    }

    #[test]
    fn image_type_the_backend_cannot_decode_is_skipped() {
        let fx = Fixture::new();
        let thumbs = Thumbnailer::new(
            fx.tmp.path().join("thumbs"),
            Arc::new(RustBackend::new()),
            FakeFrames::producing(),
            fx.stats.clone(),
        );
        thumbs.generate(request("1\\IMG_0001.HEIC", "image/heic", "sig"));

        assert_eq!(fx.stats.thumbnails.unsupported.get(), 1);
        assert_eq!(fx.stats.thumbnails.failed_image.get(), 0);
        assert!(!thumbs.thumbnail_path("1\\IMG_0001.HEIC").unwrap().exists());
    }

    #[test]
    fn videos_go_through_frames_and_resizer() {
        let fx = Fixture::new();
        let frames = FakeFrames::producing();
        let thumbs = fx.thumbnailer(frames.clone());
        thumbs.generate(request("1\\clip.mov", "video/quicktime", "sig"));

        assert_eq!(frames.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.resizer.get_operations().len(), 1);
        assert!(fx.backend.get_operations().is_empty());
        assert_eq!(fx.stats.thumbnails.generated_video.get(), 1);
    }

    #[test]
    fn video_without_frames_is_counted_as_failed() {
        let fx = Fixture::new();
        let frames = FakeFrames::empty();
        let thumbs = fx.thumbnailer(frames.clone());
        thumbs.generate(request("1\\clip.mov", "video/quicktime", "sig"));

        assert_eq!(frames.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fx.stats.thumbnails.failed_video.get(), 1);
        assert_eq!(fx.stats.thumbnails.generated_video.get(), 0);
    }

    #[test]
    fn backend_failure_is_counted_not_recorded() {
        let fx = Fixture {
            backend: Arc::new(MockBackend::failing()),
            ..Fixture::new()
        };
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        let req = request("1\\a.jpg", "image/jpeg", "sig");
        thumbs.generate(req.clone());

        assert_eq!(fx.stats.thumbnails.failed_image.get(), 1);
        assert_eq!(thumbs.check(req.clone()), Some(req));
    }

    #[test]
    fn same_content_elsewhere_is_copied() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        thumbs.generate(request("1\\a.jpg", "image/jpeg", "sig"));
        thumbs.generate(request("2\\copy\\a.jpg", "image/jpeg", "sig"));

        assert_eq!(fx.backend.get_operations().len(), 1);
        assert_eq!(fx.stats.thumbnails.copied.get(), 1);
        assert!(thumbs.thumbnail_path("2\\copy\\a.jpg").unwrap().exists());
        assert_eq!(thumbs.check(request("1\\a.jpg", "image/jpeg", "sig")), None);
        assert_eq!(
            thumbs.check(request("2\\copy\\a.jpg", "image/jpeg", "sig")),
            None
        );
    }

    #[test]
    fn attempts_are_counted() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing());
        for i in 0..3 {
            thumbs.generate(request(&format!("1\\{i}.jpg"), "image/jpeg", &format!("s{i}")));
        }
        assert_eq!(fx.stats.thumbnails.attempted.get(), 3);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let fx = Fixture::new();
        let thumbs = fx.thumbnailer(FakeFrames::producing()).dry_run(true);
        let req = request("1\\a.jpg", "image/jpeg", "sig");
        thumbs.generate(req.clone());
        thumbs.save_manifest().unwrap();

        assert!(fx.backend.get_operations().is_empty());
        assert!(!thumbs.root().exists());
        assert_eq!(thumbs.check(req.clone()), Some(req));
    }
}
