//! Markup: render page templates against the JSON data file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use minijinja::{context, path_loader, Environment, Value};

use crate::paths::Category;
use crate::pipeline::{io_error, join_error, write_output, Pipeline, TaskError, TaskReport};
use crate::reload::ReloadKind;

/// Directory name whose template becomes the site index.
pub const HOME_DIR: &str = "home";

/// Output file name for a template, from its containing directory.
///
/// `pages/home/index.html` → `index.html`, `pages/about/index.html` → `about.html`.
pub fn output_name(template: &Path) -> Option<String> {
    let dir = template.parent()?.file_name()?.to_str()?;
    if dir == HOME_DIR {
        Some("index.html".to_string())
    } else {
        Some(format!("{}.html", dir))
    }
}

/// Read the data file from disk. There is deliberately no cache.
pub async fn load_data(path: &Path) -> Result<serde_json::Value, TaskError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("Data file not found: {}", path.display());
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Err(e) => return Err(io_error(path)(e)),
    };

    serde_json::from_str(&raw).map_err(|e| TaskError::Data {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Template context: object keys become variables, anything else is `data`.
fn template_context(data: &serde_json::Value) -> Value {
    if data.is_object() {
        Value::from_serialize(data)
    } else {
        context! { data => Value::from_serialize(data) }
    }
}

/// Template name as the loader sees it: project-relative with `/` separators.
fn template_name(root: &Path, template: &Path) -> String {
    let relative = template.strip_prefix(root).unwrap_or(template);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// A rendered (or failed) template.
struct Rendered {
    template: PathBuf,
    output: Option<String>,
    html: Result<String, minijinja::Error>,
}

/// Render every template with a fresh environment rooted at `root`.
fn render_all(root: &Path, templates: Vec<PathBuf>, data: &serde_json::Value) -> Vec<Rendered> {
    let mut env = Environment::new();
    env.set_loader(path_loader(root));
    let ctx = template_context(data);

    templates
        .into_iter()
        .map(|template| {
            let name = template_name(root, &template);
            let html = env.get_template(&name).and_then(|tmpl| tmpl.render(&ctx));
            Rendered {
                output: output_name(&template),
                template,
                html,
            }
        })
        .collect()
}

pub(crate) async fn run(pipeline: &Pipeline) -> Result<TaskReport, TaskError> {
    let start = Instant::now();
    let paths = pipeline.paths();
    let entry = paths.entry(Category::Markup);
    let templates = entry.source.files(paths.root());

    if templates.is_empty() {
        tracing::debug!("No templates match {}", entry.source.pattern());
        return Ok(TaskReport::finish("markup", 0, start));
    }

    let data = load_data(&paths.data_file()).await?;
    let root = paths.root().to_path_buf();
    let rendered = tokio::task::spawn_blocking(move || render_all(&root, templates, &data))
        .await
        .map_err(join_error)?;

    let dest = paths.dest_dir(Category::Markup);
    let mut written = 0;
    for page in rendered {
        let Some(output) = page.output else {
            tracing::warn!("Cannot derive an output name for {}", page.template.display());
            continue;
        };

        match page.html {
            Ok(html) => {
                write_output(&dest.join(&output), html).await?;
                written += 1;
            }
            Err(e) => {
                tracing::error!("Failed to render {}: {:#}", page.template.display(), e);
            }
        }
    }

    pipeline.notify(ReloadKind::FullReload);

    Ok(TaskReport::finish("markup", written, start))
}
