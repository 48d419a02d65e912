//! Styles: Sass → vendor-prefixed, minified CSS.

use std::path::Path;
use std::time::Instant;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::paths::Category;
use crate::pipeline::{io_error, join_error, write_output, Pipeline, TaskError, TaskReport};
use crate::reload::ReloadKind;

/// Name of the single stylesheet written to the styles directory.
pub const OUTPUT_FILE: &str = "main.css";

/// Resolve browserslist queries. No queries means no prefixing.
pub fn resolve_browsers(queries: &[String]) -> Result<Option<Browsers>, TaskError> {
    if queries.is_empty() {
        return Ok(None);
    }

    Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| TaskError::Browsers(e.to_string()))
}

/// Compile concatenated Sass into minified CSS for the given browsers.
pub fn compile(scss: &str, load_path: &Path, browsers: Option<Browsers>) -> Result<String, String> {
    let options = grass::Options::default().load_path(load_path);
    let css = grass::from_string(scss.to_string(), &options).map_err(|e| e.to_string())?;

    prefix_and_minify(&css, browsers)
}

/// Add vendor prefixes and minify using lightningcss.
pub fn prefix_and_minify(css: &str, browsers: Option<Browsers>) -> Result<String, String> {
    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| format!("CSS parse error: {}", e))?;

    stylesheet
        .minify(MinifyOptions {
            targets: targets.clone(),
            ..Default::default()
        })
        .map_err(|e| format!("CSS minify error: {}", e))?;

    let minified = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            ..Default::default()
        })
        .map_err(|e| format!("CSS print error: {}", e))?;

    Ok(minified.code)
}

pub(crate) async fn run(pipeline: &Pipeline) -> Result<TaskReport, TaskError> {
    let start = Instant::now();
    let paths = pipeline.paths();
    let entry = paths.entry(Category::Styles);
    let sources = entry.source.files(paths.root());

    if sources.is_empty() {
        tracing::debug!("No style sources match {}", entry.source.pattern());
        return Ok(TaskReport::finish("styles", 0, start));
    }

    let mut bundle = String::new();
    for source in &sources {
        let content = tokio::fs::read_to_string(source)
            .await
            .map_err(io_error(source))?;
        bundle.push_str(&content);
        bundle.push('\n');
    }

    let load_path = paths.root().join(entry.source.base());
    let browsers = pipeline.browsers();
    let compiled = tokio::task::spawn_blocking(move || compile(&bundle, &load_path, browsers))
        .await
        .map_err(join_error)?;

    let css = match compiled {
        Ok(css) => css,
        Err(message) => {
            tracing::error!("Style compile failed: {}", message);
            return Ok(TaskReport::finish("styles", 0, start));
        }
    };

    let output = paths.dest_dir(Category::Styles).join(OUTPUT_FILE);
    write_output(&output, css).await?;
    tracing::debug!(
        "Compiled {} style sources into {}",
        sources.len(),
        output.display()
    );

    pipeline.notify(ReloadKind::StyleInject);

    Ok(TaskReport::finish("styles", 1, start))
}
