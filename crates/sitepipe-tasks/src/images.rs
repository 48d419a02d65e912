//! Images: per-format lossless optimization, one file in, one file out.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageFormat;
use rayon::prelude::*;
use regex::Regex;

use crate::paths::Category;
use crate::pipeline::{io_error, join_error, Pipeline, TaskError, TaskReport};

/// Image formats with a dedicated optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Gif,
    Png,
    Svg,
    Other,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "gif" => ImageKind::Gif,
            "png" => ImageKind::Png,
            "svg" => ImageKind::Svg,
            _ => ImageKind::Other,
        }
    }
}

/// Optimize one image. Anything that cannot be decoded is returned untouched.
pub fn optimize(kind: ImageKind, bytes: Vec<u8>, path: &Path) -> Vec<u8> {
    let result = match kind {
        ImageKind::Gif => interlace_gif(&bytes),
        ImageKind::Png => optimize_png(&bytes),
        ImageKind::Svg => match std::str::from_utf8(&bytes) {
            Ok(svg) => Ok(clean_svg(svg).into_bytes()),
            Err(e) => Err(e.to_string()),
        },
        ImageKind::Other => return bytes,
    };

    match result {
        Ok(optimized) => optimized,
        Err(message) => {
            tracing::warn!("Copying {} unoptimized: {}", path.display(), message);
            bytes
        }
    }
}

/// Re-encode a PNG at the best compression level; keep whichever is smaller.
pub fn optimize_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let image =
        image::load_from_memory_with_format(bytes, ImageFormat::Png).map_err(|e| e.to_string())?;

    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| e.to_string())?;

    if out.len() < bytes.len() {
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}

/// Re-encode a GIF with every frame interlaced.
pub fn interlace_gif(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(bytes).map_err(|e| e.to_string())?;

    let global_palette = decoder.global_palette().map(<[u8]>::to_vec).unwrap_or_default();
    let repeat = decoder.repeat();
    let (width, height) = (decoder.width(), decoder.height());

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &global_palette)
            .map_err(|e| e.to_string())?;
        encoder.set_repeat(repeat).map_err(|e| e.to_string())?;

        while let Some(frame) = decoder.read_next_frame().map_err(|e| e.to_string())? {
            let mut frame = frame.clone();
            // Decoded buffers are always in display order.
            let rows = interlace_rows(&frame.buffer, frame.width as usize, frame.height as usize);
            frame.buffer = Cow::Owned(rows);
            frame.interlaced = true;
            encoder.write_frame(&frame).map_err(|e| e.to_string())?;
        }
    }

    Ok(out)
}

/// Reorder rows into GIF interlace order: every 8th from 0, every 8th from 4,
/// every 4th from 2, every 2nd from 1.
pub fn interlace_rows(buffer: &[u8], width: usize, height: usize) -> Vec<u8> {
    if width == 0 || buffer.len() < width * height {
        return buffer.to_vec();
    }

    let mut out = Vec::with_capacity(buffer.len());
    for (first, step) in [(0, 8), (4, 8), (2, 4), (1, 2)] {
        for row in (first..height).step_by(step) {
            out.extend_from_slice(&buffer[row * width..(row + 1) * width]);
        }
    }
    out
}

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));
static PROLOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>").expect("valid prolog regex")
});
static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid whitespace regex"));
static SVG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg\b[^>]*>").expect("valid svg tag regex"));
static VIEW_BOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+viewBox\s*=\s*"([^"]*)""#).expect("valid viewBox regex"));
static WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\swidth\s*=\s*"([^"]*)""#).expect("valid width regex"));
static HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sheight\s*=\s*"([^"]*)""#).expect("valid height regex"));

/// Strip comments, prolog and inter-tag whitespace, and drop a `viewBox` that
/// only repeats `width`/`height`. Element ids are left alone.
pub fn clean_svg(svg: &str) -> String {
    let svg = COMMENT.replace_all(svg, "");
    let svg = PROLOG.replace_all(&svg, "");
    let svg = BETWEEN_TAGS.replace_all(&svg, "><");

    let svg = SVG_TAG.replace(&svg, |caps: &regex::Captures| {
        let tag = &caps[0];
        if redundant_view_box(tag) {
            VIEW_BOX.replace(tag, "").into_owned()
        } else {
            tag.to_string()
        }
    });

    svg.trim().to_string()
}

fn attribute(re: &Regex, tag: &str) -> Option<String> {
    re.captures(tag).map(|c| c[1].trim().to_string())
}

fn redundant_view_box(tag: &str) -> bool {
    let (Some(view_box), Some(width), Some(height)) = (
        attribute(&VIEW_BOX, tag),
        attribute(&WIDTH, tag),
        attribute(&HEIGHT, tag),
    ) else {
        return false;
    };

    let parts: Vec<&str> = view_box
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    parts.len() == 4
        && parts[0] == "0"
        && parts[1] == "0"
        && parts[2] == width.trim_end_matches("px")
        && parts[3] == height.trim_end_matches("px")
}

fn optimize_file(source: &Path, dest: &Path) -> Result<(), TaskError> {
    let bytes = std::fs::read(source).map_err(io_error(source))?;
    let optimized = optimize(ImageKind::from_path(source), bytes, source);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    std::fs::write(dest, optimized).map_err(io_error(dest))
}

pub(crate) async fn run(pipeline: &Pipeline) -> Result<TaskReport, TaskError> {
    let start = Instant::now();
    let paths = pipeline.paths();
    let entry = paths.entry(Category::Images);
    let dest = paths.dest_dir(Category::Images);

    let jobs: Vec<(PathBuf, PathBuf)> = entry
        .source
        .files(paths.root())
        .into_iter()
        .map(|file| {
            let target = dest.join(entry.source.relative_to_base(paths.root(), &file));
            (file, target)
        })
        .collect();

    if jobs.is_empty() {
        tracing::debug!("No images match {}", entry.source.pattern());
        return Ok(TaskReport::finish("images", 0, start));
    }

    let count = jobs.len();
    tokio::task::spawn_blocking(move || {
        jobs.par_iter()
            .try_for_each(|(source, target)| optimize_file(source, target))
    })
    .await
    .map_err(join_error)??;

    Ok(TaskReport::finish("images", count, start))
}
