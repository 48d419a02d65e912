//! Scripts: transpile each source, concatenate, minify.

use std::path::{Path, PathBuf};
use std::time::Instant;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};

use crate::paths::Category;
use crate::pipeline::{io_error, join_error, write_output, Pipeline, TaskError, TaskReport};

/// Name of the bundle written to the scripts directory.
pub const OUTPUT_FILE: &str = "index.js";

/// Transform options for a target such as `es2015`.
pub fn transform_options(target: &str) -> Result<TransformOptions, TaskError> {
    TransformOptions::from_target(target).map_err(|message| TaskError::ScriptTarget {
        target: target.to_string(),
        message,
    })
}

fn first_error(errors: &[impl ToString]) -> Option<String> {
    errors.first().map(ToString::to_string)
}

/// Lower one source file to the target language level.
pub fn transpile(path: &Path, source: &str, options: &TransformOptions) -> Result<String, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if let Some(message) = first_error(&parsed.errors) {
        return Err(message);
    }
    let mut program = parsed.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let transformed =
        Transformer::new(&allocator, path, options).build_with_scoping(scoping, &mut program);
    if let Some(message) = first_error(&transformed.errors) {
        return Err(message);
    }

    Ok(Codegen::new().build(&program).code)
}

/// Compress and mangle a concatenated bundle.
pub fn minify(source: &str) -> Result<String, String> {
    let allocator = Allocator::default();

    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(message) = first_error(&parsed.errors) {
        return Err(message);
    }
    let mut program = parsed.program;

    let minified = Minifier::new(MinifierOptions::default()).build(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions::minify())
        .with_scoping(minified.scoping)
        .build(&program)
        .code)
}

/// Transpile, concatenate and minify `sources` in order.
pub fn bundle(sources: &[(PathBuf, String)], target: &str) -> Result<String, TaskError> {
    let options = transform_options(target)?;

    let mut joined = String::new();
    for (path, source) in sources {
        let lowered = transpile(path, source, &options).map_err(|message| TaskError::Script {
            path: path.clone(),
            message,
        })?;
        joined.push_str(&lowered);
        joined.push('\n');
    }

    minify(&joined).map_err(|message| TaskError::Script {
        path: PathBuf::from(OUTPUT_FILE),
        message,
    })
}

pub(crate) async fn run(pipeline: &Pipeline) -> Result<TaskReport, TaskError> {
    let start = Instant::now();
    let paths = pipeline.paths();
    let entry = paths.entry(Category::Scripts);
    let files = entry.source.files(paths.root());

    if files.is_empty() {
        tracing::debug!("No scripts match {}", entry.source.pattern());
        return Ok(TaskReport::finish("scripts", 0, start));
    }

    let mut sources = Vec::with_capacity(files.len());
    for file in files {
        let source = tokio::fs::read_to_string(&file)
            .await
            .map_err(io_error(&file))?;
        sources.push((file, source));
    }

    let count = sources.len();
    let target = pipeline.script_target().to_string();
    let code = tokio::task::spawn_blocking(move || bundle(&sources, &target))
        .await
        .map_err(join_error)??;

    let output = paths.dest_dir(Category::Scripts).join(OUTPUT_FILE);
    write_output(&output, code).await?;
    tracing::debug!("Bundled {} scripts into {}", count, output.display());

    Ok(TaskReport::finish("scripts", 1, start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lowers_modern_syntax() {
        let options = transform_options("es2015").unwrap();
        let out = transpile(
            Path::new("menu.js"),
            "const open = menu?.classList ?? null;",
            &options,
        )
        .unwrap();

        assert!(!out.contains("?."));
        assert!(!out.contains("??"));
    }

    #[test]
    fn reports_syntax_errors() {
        let options = transform_options("es2015").unwrap();
        assert!(transpile(Path::new("bad.js"), "function (", &options).is_err());
    }

    #[test]
    fn minifies_bundle() {
        let source = "function greet(name) {\n  return 'hi ' + name;\n}\nconsole.log(greet('x'));\n";
        let out = minify(source).unwrap();

        assert!(out.len() < source.len());
        assert!(out.contains("console.log"));
    }

    #[tokio::test]
    async fn bundles_sources_in_path_order() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/scripts/b.js", "console.log('second');");
        write(temp.path(), "src/scripts/a.js", "console.log('first');");

        let report = run(&pipeline(temp.path())).await.unwrap();

        assert_eq!(report.files_written, 1);
        let js = fs::read_to_string(temp.path().join("build/scripts/index.js")).unwrap();
        let first = js.find("first").unwrap();
        let second = js.find("second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn script_errors_fail_the_task() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/scripts/ok.js", "console.log(1);");
        write(temp.path(), "src/scripts/broken.js", "let = ;");

        let err = run(&pipeline(temp.path())).await.unwrap_err();

        match err {
            TaskError::Script { path, .. } => assert!(path.ends_with("broken.js")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!temp.path().join("build/scripts/index.js").exists());
    }
}
