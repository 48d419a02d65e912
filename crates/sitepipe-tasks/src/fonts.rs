//! Fonts: verbatim copy.

use std::time::Instant;

use crate::paths::Category;
use crate::pipeline::{io_error, Pipeline, TaskError, TaskReport};

pub(crate) async fn run(pipeline: &Pipeline) -> Result<TaskReport, TaskError> {
    let start = Instant::now();
    let paths = pipeline.paths();
    let entry = paths.entry(Category::Fonts);
    let dest = paths.dest_dir(Category::Fonts);

    let mut written = 0;
    for file in entry.source.files(paths.root()) {
        let target = dest.join(entry.source.relative_to_base(paths.root(), &file));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        tokio::fs::copy(&file, &target)
            .await
            .map_err(io_error(&file))?;
        written += 1;
    }

    Ok(TaskReport::finish("fonts", written, start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn copies_fonts_verbatim() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/fonts/inter/Inter.woff2", [0u8, 1, 2, 255]);

        let report = run(&pipeline(temp.path())).await.unwrap();

        assert_eq!(report.files_written, 1);
        assert_eq!(
            fs::read(temp.path().join("build/fonts/inter/Inter.woff2")).unwrap(),
            vec![0u8, 1, 2, 255]
        );
    }
}
