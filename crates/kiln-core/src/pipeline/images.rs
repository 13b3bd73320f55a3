//! Images stage: recompress rasters, clean SVGs, copy everything else.

use futures_util::stream::{self, StreamExt};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{AnimationDecoder, DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::cache::{content_hash, settings_fingerprint, ImageCache};
use super::discovery::{DiscoveredFile, SourceDiscovery};
use super::svg::SvgOptimizer;
use crate::config::{ImagesConfig, PngCompression};
use crate::error::{StageError, StageResult};
use crate::types::{Stage, StageReport};

/// How a file under the images directory is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Svg,
    /// Copied verbatim (webp, ico, fonts that ended up in the wrong place...)
    Other,
}

impl ImageKind {
    /// Classify by extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("jpg" | "jpeg") => ImageKind::Jpeg,
            Some("png") => ImageKind::Png,
            Some("gif") => ImageKind::Gif,
            Some("svg") => ImageKind::Svg,
            _ => ImageKind::Other,
        }
    }
}

/// Result of optimizing one file.
#[derive(Debug)]
pub struct OptimizedImage {
    /// Bytes to write
    pub bytes: Vec<u8>,
    /// The source was smaller than the re-encoded output and was kept
    pub kept_original: bool,
}

/// Optimizes single images according to [`ImagesConfig`].
pub struct ImageOptimizer {
    config: ImagesConfig,
    svg: SvgOptimizer,
}

impl ImageOptimizer {
    pub fn new(config: ImagesConfig) -> Self {
        let svg = SvgOptimizer::new(config.svg.clone());
        Self { config, svg }
    }

    /// Optimize an in-memory file. `path` is used for format detection and
    /// error messages only.
    pub fn optimize(&self, path: &Path, bytes: &[u8]) -> StageResult<OptimizedImage> {
        let encoded = match ImageKind::from_path(path) {
            ImageKind::Jpeg => self.encode_jpeg(path, bytes)?,
            ImageKind::Png => self.encode_png(path, bytes)?,
            ImageKind::Gif => self.encode_gif(path, bytes)?,
            ImageKind::Svg => self.clean_svg(path, bytes)?,
            ImageKind::Other => {
                return Ok(OptimizedImage {
                    bytes: bytes.to_vec(),
                    kept_original: true,
                })
            }
        };

        if self.config.keep_larger_originals && encoded.len() >= bytes.len() {
            tracing::trace!(
                "{:?}: optimized size {} >= original {}, keeping original",
                path,
                encoded.len(),
                bytes.len()
            );
            return Ok(OptimizedImage {
                bytes: bytes.to_vec(),
                kept_original: true,
            });
        }

        Ok(OptimizedImage {
            bytes: encoded,
            kept_original: false,
        })
    }

    fn encode_jpeg(&self, path: &Path, bytes: &[u8]) -> StageResult<Vec<u8>> {
        let img = decode(path, bytes, ImageFormat::Jpeg)?;

        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.quality);
        img.write_with_encoder(encoder)
            .map_err(|e| image_error(path, e))?;
        Ok(buffer)
    }

    fn encode_png(&self, path: &Path, bytes: &[u8]) -> StageResult<Vec<u8>> {
        let img = decode(path, bytes, ImageFormat::Png)?;
        let compression = match self.config.png_compression {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        };

        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive);
        img.write_with_encoder(encoder)
            .map_err(|e| image_error(path, e))?;
        Ok(buffer)
    }

    fn encode_gif(&self, path: &Path, bytes: &[u8]) -> StageResult<Vec<u8>> {
        let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| image_error(path, e))?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| image_error(path, e))?;

        let mut buffer = Vec::new();
        {
            // the trailer is written when the encoder is dropped
            let mut encoder = GifEncoder::new(&mut buffer);
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| image_error(path, e))?;
            encoder
                .encode_frames(frames)
                .map_err(|e| image_error(path, e))?;
        }
        Ok(buffer)
    }

    fn clean_svg(&self, path: &Path, bytes: &[u8]) -> StageResult<Vec<u8>> {
        let source = std::str::from_utf8(bytes).map_err(|e| StageError::Svg {
            path: path.to_path_buf(),
            message: format!("not valid UTF-8: {e}"),
        })?;
        self.svg
            .optimize(source)
            .map(String::into_bytes)
            .map_err(|e| StageError::Svg {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

fn decode(path: &Path, bytes: &[u8], format: ImageFormat) -> StageResult<DynamicImage> {
    image::load_from_memory_with_format(bytes, format).map_err(|e| image_error(path, e))
}

fn image_error(path: &Path, err: image::ImageError) -> StageError {
    StageError::Image {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Write an output file, creating parent directories.
pub(crate) fn write_output(dest: &Path, bytes: &[u8]) -> StageResult<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StageError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(dest, bytes).map_err(|e| StageError::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}

/// What happened to one source file.
enum Outcome {
    Written {
        relative: PathBuf,
        hash: String,
        bytes_in: u64,
        bytes_out: u64,
    },
    Skipped,
    Failed {
        relative: PathBuf,
        error: StageError,
    },
}

/// Runs the optimizer over a whole source tree.
pub struct ImageStage {
    optimizer: Arc<ImageOptimizer>,
    discovery: SourceDiscovery,
    source_dir: PathBuf,
    output_dir: PathBuf,
    dist_dir: PathBuf,
    workers: usize,
    use_cache: bool,
    settings: String,
}

impl ImageStage {
    pub fn new(
        config: ImagesConfig,
        source_dir: PathBuf,
        output_dir: PathBuf,
        dist_dir: PathBuf,
    ) -> Self {
        Self {
            workers: config.parallel_workers.max(1),
            use_cache: config.cache,
            settings: settings_fingerprint(&config),
            optimizer: Arc::new(ImageOptimizer::new(config)),
            discovery: SourceDiscovery::any(),
            source_dir,
            output_dir,
            dist_dir,
        }
    }

    /// Optimize every file below the source directory.
    ///
    /// Files are processed on blocking threads, at most `parallel_workers`
    /// at a time. One file failing never stops the others.
    pub async fn run(&self) -> StageReport {
        let start = Instant::now();
        let mut report = StageReport::new(Stage::Images);

        let files = self.discovery.discover(&self.source_dir);
        if files.is_empty() {
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        }
        tracing::debug!("Optimizing {} image(s) from {:?}", files.len(), self.source_dir);

        let cache = Arc::new(if self.use_cache {
            ImageCache::load(&self.dist_dir, &self.settings)
        } else {
            ImageCache::default()
        });

        let outcomes: Vec<Outcome> = stream::iter(files)
            .map(|file| {
                let optimizer = Arc::clone(&self.optimizer);
                let cache = Arc::clone(&cache);
                let dest = self.output_dir.join(&file.relative);
                let use_cache = self.use_cache;
                async move {
                    let relative = file.relative.clone();
                    tokio::task::spawn_blocking(move || {
                        process_one(&optimizer, &cache, use_cache, &file, &dest)
                    })
                    .await
                    .unwrap_or_else(|e| Outcome::Failed {
                        error: StageError::Image {
                            path: relative.clone(),
                            message: format!("Task join error: {e}"),
                        },
                        relative,
                    })
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut cache = Arc::try_unwrap(cache).unwrap_or_else(|shared| (*shared).clone());

        for outcome in outcomes {
            match outcome {
                Outcome::Written {
                    relative,
                    hash,
                    bytes_in,
                    bytes_out,
                } => {
                    report.record_output(bytes_in, bytes_out);
                    cache.insert(&relative, hash);
                }
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed { relative, error } => {
                    report.record_failure(&error);
                    cache.remove(&relative);
                }
            }
        }

        if self.use_cache {
            if let Err(e) = cache.save() {
                tracing::warn!("Failed to save image cache: {}", e);
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }
}

fn process_one(
    optimizer: &ImageOptimizer,
    cache: &ImageCache,
    use_cache: bool,
    file: &DiscoveredFile,
    dest: &Path,
) -> Outcome {
    let bytes = match std::fs::read(&file.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return Outcome::Failed {
                relative: file.relative.clone(),
                error: StageError::Read {
                    path: file.path.clone(),
                    source: e,
                },
            }
        }
    };

    let hash = content_hash(&bytes);
    if use_cache && cache.is_fresh(&file.relative, &hash, dest) {
        tracing::trace!("Unchanged: {:?}", file.relative);
        return Outcome::Skipped;
    }

    let result = optimizer
        .optimize(&file.path, &bytes)
        .and_then(|optimized| write_output(dest, &optimized.bytes).map(|_| optimized));

    match result {
        Ok(optimized) => Outcome::Written {
            relative: file.relative.clone(),
            hash,
            bytes_in: bytes.len() as u64,
            bytes_out: optimized.bytes.len() as u64,
        },
        Err(error) => Outcome::Failed {
            relative: file.relative.clone(),
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient_png() -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        let mut buffer = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut buffer, CompressionType::Fast, FilterType::NoFilter);
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(encoder)
            .unwrap();
        buffer
    }

    fn noisy_jpeg(quality: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(128, 128, |x, y| {
            Rgb([((x * 31 + y * 17) % 256) as u8, ((x * y) % 256) as u8, (x ^ y) as u8])
        });
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(encoder)
            .unwrap();
        buffer
    }

    fn stage(root: &Path, config: ImagesConfig) -> ImageStage {
        ImageStage::new(
            config,
            root.join("src/images"),
            root.join("dist/assets/images"),
            root.join("dist"),
        )
    }

    #[test]
    fn test_image_kind_from_path() {
        assert_eq!(ImageKind::from_path(Path::new("a.JPG")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("a.jpeg")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("a.png")), ImageKind::Png);
        assert_eq!(ImageKind::from_path(Path::new("a.gif")), ImageKind::Gif);
        assert_eq!(ImageKind::from_path(Path::new("a.svg")), ImageKind::Svg);
        assert_eq!(ImageKind::from_path(Path::new("a.webp")), ImageKind::Other);
        assert_eq!(ImageKind::from_path(Path::new("README")), ImageKind::Other);
    }

    #[test]
    fn test_png_recompression_shrinks_unfiltered_input() {
        let optimizer = ImageOptimizer::new(ImagesConfig::default());
        let original = gradient_png();
        let optimized = optimizer.optimize(Path::new("g.png"), &original).unwrap();
        assert!(optimized.bytes.len() <= original.len());
        let decoded = image::load_from_memory(&optimized.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_jpeg_quality_lowers_size() {
        let optimizer = ImageOptimizer::new(ImagesConfig {
            quality: 40,
            ..Default::default()
        });
        let original = noisy_jpeg(100);
        let optimized = optimizer.optimize(Path::new("n.jpg"), &original).unwrap();
        assert!(!optimized.kept_original);
        assert!(optimized.bytes.len() < original.len());
    }

    #[test]
    fn test_keeps_original_when_not_smaller() {
        let optimizer = ImageOptimizer::new(ImagesConfig {
            quality: 100,
            ..Default::default()
        });
        let original = noisy_jpeg(10);
        let optimized = optimizer.optimize(Path::new("n.jpg"), &original).unwrap();
        assert!(optimized.kept_original);
        assert_eq!(optimized.bytes, original);
    }

    #[test]
    fn test_misnamed_file_fails_decode() {
        let optimizer = ImageOptimizer::new(ImagesConfig::default());
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4])));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let err = optimizer.optimize(Path::new("wrong.jpg"), &png).unwrap_err();
        assert!(matches!(err, StageError::Image { .. }));
    }

    #[test]
    fn test_other_files_copied_verbatim() {
        let optimizer = ImageOptimizer::new(ImagesConfig::default());
        let optimized = optimizer
            .optimize(Path::new("favicon.ico"), b"\x00\x00\x01\x00")
            .unwrap();
        assert!(optimized.kept_original);
        assert_eq!(optimized.bytes, b"\x00\x00\x01\x00");
    }

    #[test]
    fn test_gif_round_trip() {
        let optimizer = ImageOptimizer::new(ImagesConfig {
            keep_larger_originals: false,
            ..Default::default()
        });
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let mut gif = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut gif);
            encoder
                .encode_frame(image::Frame::new(img))
                .unwrap();
        }
        let optimized = optimizer.optimize(Path::new("dot.gif"), &gif).unwrap();
        assert_eq!(&optimized.bytes[..3], b"GIF");
    }

    #[tokio::test]
    async fn test_stage_writes_tree_and_tolerates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/images");
        std::fs::create_dir_all(src.join("icons")).unwrap();
        std::fs::write(src.join("icons/g.png"), gradient_png()).unwrap();
        std::fs::write(src.join("broken.jpg"), b"not a jpeg").unwrap();
        std::fs::write(src.join("logo.svg"), "<svg><!-- c --><g/></svg>").unwrap();

        let stage = stage(dir.path(), ImagesConfig::default());
        let report = stage.run().await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert!(report.failures[0].path.ends_with("broken.jpg"));
        assert!(dir.path().join("dist/assets/images/icons/g.png").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("dist/assets/images/logo.svg")).unwrap(),
            "<svg><g/></svg>"
        );
    }

    #[tokio::test]
    async fn test_stage_skips_unchanged_images_on_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/images");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("g.png"), gradient_png()).unwrap();

        let stage = stage(dir.path(), ImagesConfig::default());
        let first = stage.run().await;
        assert_eq!((first.processed, first.skipped), (1, 0));

        let second = stage.run().await;
        assert_eq!((second.processed, second.skipped), (0, 1));

        std::fs::remove_file(dir.path().join("dist/assets/images/g.png")).unwrap();
        let third = stage.run().await;
        assert_eq!((third.processed, third.skipped), (1, 0));
    }

    #[tokio::test]
    async fn test_stage_reoptimizes_when_quality_changes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/images");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("n.jpg"), noisy_jpeg(100)).unwrap();
        let output = dir.path().join("dist/assets/images/n.jpg");

        let high = stage(
            dir.path(),
            ImagesConfig {
                quality: 95,
                ..Default::default()
            },
        );
        assert_eq!(high.run().await.processed, 1);
        let high_size = std::fs::metadata(&output).unwrap().len();

        let low = stage(
            dir.path(),
            ImagesConfig {
                quality: 10,
                ..Default::default()
            },
        );
        let report = low.run().await;
        assert_eq!((report.processed, report.skipped), (1, 0));
        assert!(std::fs::metadata(&output).unwrap().len() < high_size);

        let again = low.run().await;
        assert_eq!((again.processed, again.skipped), (0, 1));
    }

    #[tokio::test]
    async fn test_stage_without_cache_always_processes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/images");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("g.png"), gradient_png()).unwrap();

        let stage = stage(
            dir.path(),
            ImagesConfig {
                cache: false,
                ..Default::default()
            },
        );
        stage.run().await;
        let second = stage.run().await;
        assert_eq!(second.processed, 1);
        assert!(!dir.path().join("dist").join(crate::pipeline::cache::CACHE_FILE_NAME).exists());
    }
}
