//! Path table: where each asset category is read from and written to.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

/// An asset category with its own transform task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Styles,
    Markup,
    Scripts,
    Images,
    Fonts,
}

impl Category {
    /// Every category, in registry order.
    pub const ALL: [Category; 5] = [
        Category::Styles,
        Category::Markup,
        Category::Scripts,
        Category::Images,
        Category::Fonts,
    ];

    /// Task name for this category.
    pub fn name(self) -> &'static str {
        match self {
            Category::Styles => "styles",
            Category::Markup => "markup",
            Category::Scripts => "scripts",
            Category::Images => "images",
            Category::Fonts => "fonts",
        }
    }

    /// Look up a category by its task name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Whether the transform pushes its own live-reload signal when it finishes.
    pub fn notifies_on_completion(self) -> bool {
        matches!(self, Category::Styles | Category::Markup)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while building a path table.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("Destination for {category} must stay inside the build root: {path}")]
    EscapesBuildRoot { category: Category, path: PathBuf },

    #[error("Build root must be a non-empty relative path inside the project: {0}")]
    InvalidBuildRoot(PathBuf),

    #[error("Build root {path} overlaps the {category} sources")]
    BuildRootOverlapsSource { category: Category, path: PathBuf },
}

/// A compiled source glob, relative to the project root.
#[derive(Debug, Clone)]
pub struct SourceGlob {
    pattern: String,
    base: PathBuf,
    matcher: GlobMatcher,
}

impl SourceGlob {
    /// Compile a glob such as `src/**/*.scss`.
    ///
    /// `*` does not cross directory separators; `**` does.
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        let pattern = pattern.trim_start_matches("./");
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| PathError::InvalidGlob {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            pattern: pattern.to_string(),
            base: literal_base(pattern),
            matcher: glob.compile_matcher(),
        })
    }

    /// The pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Longest directory prefix of the pattern without glob syntax.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether a project-relative path matches.
    pub fn is_match(&self, relative: &Path) -> bool {
        self.matcher.is_match(relative)
    }

    /// All files under `root` matching the glob, sorted by path.
    ///
    /// A missing base directory yields an empty list.
    pub fn files(&self, root: &Path) -> Vec<PathBuf> {
        let base = root.join(&self.base);
        if !base.exists() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&base)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| {
                path.strip_prefix(root)
                    .map(|rel| self.matcher.is_match(rel))
                    .unwrap_or(false)
            })
            .collect();

        files.sort();
        files
    }

    /// Path of `file` relative to the glob base, used to mirror directory structure.
    pub fn relative_to_base(&self, root: &Path, file: &Path) -> PathBuf {
        let base = root.join(&self.base);
        file.strip_prefix(&base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file.file_name().map(PathBuf::from).unwrap_or_default())
    }
}

/// Directory part of a pattern before the first component with glob syntax.
///
/// The final component is never part of the base, so a literal file pattern
/// yields its parent directory.
fn literal_base(pattern: &str) -> PathBuf {
    let parts: Vec<&str> = pattern.split('/').collect();
    let mut base = PathBuf::new();

    for part in &parts[..parts.len().saturating_sub(1)] {
        if part.contains(['*', '?', '[', '{']) {
            break;
        }
        if part.is_empty() || *part == "." {
            continue;
        }
        base.push(part);
    }

    base
}

/// Raw settings for one category before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    /// Source glob, relative to the project root
    pub source: String,
    /// Destination directory, relative to the build root
    pub dest: String,
    /// Globs that retrigger the task; empty means the source glob
    pub watch: Vec<String>,
}

impl EntrySpec {
    /// Default layout for a category.
    pub fn defaults(category: Category) -> Self {
        let (source, dest, watch): (&str, &str, &[&str]) = match category {
            Category::Styles => ("src/**/*.scss", "styles", &[]),
            Category::Markup => (
                "src/pages/**/index.html",
                "",
                &[
                    "src/pages/**/*.html",
                    "src/partials/**/*.html",
                    DEFAULT_DATA_FILE,
                ],
            ),
            Category::Scripts => ("src/scripts/**/*.js", "scripts", &[]),
            Category::Images => ("src/assets/images/**/*", "images", &[]),
            Category::Fonts => ("src/fonts/**/*", "fonts", &[]),
        };

        Self {
            source: source.to_string(),
            dest: dest.to_string(),
            watch: watch.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// Default build root.
pub const DEFAULT_BUILD_ROOT: &str = "build";

/// Default template data file.
pub const DEFAULT_DATA_FILE: &str = "src/assets/data.json";

/// Raw path table settings before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub build: String,
    pub data: String,
    /// Indexed by `Category::ALL` order
    pub entries: [EntrySpec; 5],
}

impl PathSpec {
    /// One category's settings.
    pub fn entry(&self, category: Category) -> &EntrySpec {
        &self.entries[category.index()]
    }

    /// Mutable access to one category's settings.
    pub fn entry_mut(&mut self, category: Category) -> &mut EntrySpec {
        &mut self.entries[category.index()]
    }
}

impl Default for PathSpec {
    fn default() -> Self {
        Self {
            build: DEFAULT_BUILD_ROOT.to_string(),
            data: DEFAULT_DATA_FILE.to_string(),
            entries: Category::ALL.map(EntrySpec::defaults),
        }
    }
}

/// One validated category entry.
#[derive(Debug, Clone)]
pub struct PathEntry {
    pub category: Category,
    pub source: SourceGlob,
    /// Relative to the build root
    pub dest: PathBuf,
    pub watch: Vec<SourceGlob>,
}

impl PathEntry {
    /// Globs whose changes retrigger this category.
    pub fn watch_globs(&self) -> &[SourceGlob] {
        if self.watch.is_empty() {
            std::slice::from_ref(&self.source)
        } else {
            &self.watch
        }
    }
}

/// Validated mapping from category to source and destination.
///
/// Built once at startup; read-only afterwards.
#[derive(Debug, Clone)]
pub struct PathTable {
    root: PathBuf,
    build: PathBuf,
    data: PathBuf,
    entries: Vec<PathEntry>,
}

impl PathTable {
    /// Validate `spec` against the project `root`.
    pub fn new(root: impl Into<PathBuf>, spec: &PathSpec) -> Result<Self, PathError> {
        let build = normalize_build_root(&spec.build)
            .ok_or_else(|| PathError::InvalidBuildRoot(PathBuf::from(&spec.build)))?;

        let mut entries = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let raw = &spec.entries[category.index()];
            let dest = PathBuf::from(&raw.dest);
            if !is_contained(&dest) {
                return Err(PathError::EscapesBuildRoot {
                    category,
                    path: dest,
                });
            }

            let source = SourceGlob::new(&raw.source)?;
            if overlaps(&build, source.base()) {
                return Err(PathError::BuildRootOverlapsSource {
                    category,
                    path: build,
                });
            }

            entries.push(PathEntry {
                category,
                source,
                dest,
                watch: raw
                    .watch
                    .iter()
                    .map(|w| SourceGlob::new(w))
                    .collect::<Result<_, _>>()?,
            });
        }

        Ok(Self {
            root: root.into(),
            build,
            data: PathBuf::from(&spec.data),
            entries,
        })
    }

    /// Default layout rooted at `root`.
    pub fn standard(root: impl Into<PathBuf>) -> Result<Self, PathError> {
        Self::new(root, &PathSpec::default())
    }

    /// Project root all globs are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute build root.
    pub fn build_root(&self) -> PathBuf {
        self.root.join(&self.build)
    }

    /// Absolute path of the template data file.
    pub fn data_file(&self) -> PathBuf {
        self.root.join(&self.data)
    }

    /// Entry for a category.
    pub fn entry(&self, category: Category) -> &PathEntry {
        &self.entries[category.index()]
    }

    /// Absolute destination directory for a category.
    pub fn dest_dir(&self, category: Category) -> PathBuf {
        self.build_root().join(&self.entry(category).dest)
    }

    /// All entries in category order.
    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    /// Categories whose watch globs match `path`.
    ///
    /// Paths outside the project or inside the build root never match.
    pub fn categories_for(&self, path: &Path) -> Vec<Category> {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return Vec::new();
        };
        if relative.starts_with(&self.build) {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter(|entry| entry.watch_globs().iter().any(|g| g.is_match(relative)))
            .map(|entry| entry.category)
            .collect()
    }

    /// Directories to watch recursively: glob bases with nested ones collapsed.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut bases: Vec<PathBuf> = self
            .entries
            .iter()
            .flat_map(|entry| entry.watch_globs().iter().map(|g| g.base().to_path_buf()))
            .collect();
        bases.sort();
        bases.dedup();

        let mut roots: Vec<PathBuf> = Vec::new();
        for base in bases {
            if roots.iter().any(|r| base.starts_with(r)) {
                continue;
            }
            roots.push(base);
        }

        roots.into_iter().map(|b| self.root.join(b)).collect()
    }
}

/// Build root with `.` components dropped. `None` unless at least one named
/// component remains and nothing climbs out or is absolute.
fn normalize_build_root(raw: &str) -> Option<PathBuf> {
    let mut build = PathBuf::new();
    for component in Path::new(raw.trim()).components() {
        match component {
            Component::Normal(part) => build.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!build.as_os_str().is_empty()).then_some(build)
}

/// Cleaning `build` would delete sources under `base`, or outputs would land
/// among them. An empty base (project root) always contains the build root.
fn overlaps(build: &Path, base: &Path) -> bool {
    !base.as_os_str().is_empty() && (base.starts_with(build) || build.starts_with(base))
}

/// Relative, and never climbs out with `..`.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn computes_literal_base() {
        assert_eq!(literal_base("src/**/*.scss"), PathBuf::from("src"));
        assert_eq!(literal_base("src/pages/**/index.html"), PathBuf::from("src/pages"));
        assert_eq!(literal_base("src/assets/data.json"), PathBuf::from("src/assets"));
        assert_eq!(literal_base("*.js"), PathBuf::new());
    }

    #[test]
    fn star_does_not_cross_directories() {
        let glob = SourceGlob::new("src/*.scss").unwrap();
        assert!(glob.is_match(Path::new("src/main.scss")));
        assert!(!glob.is_match(Path::new("src/partials/_a.scss")));

        let glob = SourceGlob::new("./src/**/*.scss").unwrap();
        assert!(glob.is_match(Path::new("src/partials/_a.scss")));
        assert!(glob.is_match(Path::new("src/main.scss")));
    }

    #[test]
    fn lists_matching_files_sorted() {
        let temp = tempdir().unwrap();
        let scripts = temp.path().join("src/scripts");
        fs::create_dir_all(scripts.join("nested")).unwrap();
        fs::write(scripts.join("b.js"), "").unwrap();
        fs::write(scripts.join("a.js"), "").unwrap();
        fs::write(scripts.join("nested/c.js"), "").unwrap();
        fs::write(scripts.join("notes.txt"), "").unwrap();

        let glob = SourceGlob::new("src/scripts/**/*.js").unwrap();
        let files = glob.files(temp.path());

        assert_eq!(
            files,
            vec![
                scripts.join("a.js"),
                scripts.join("b.js"),
                scripts.join("nested/c.js"),
            ]
        );
    }

    #[test]
    fn missing_base_yields_no_files() {
        let temp = tempdir().unwrap();
        let glob = SourceGlob::new("src/fonts/**/*").unwrap();
        assert!(glob.files(temp.path()).is_empty());
    }

    #[test]
    fn rejects_destinations_outside_build_root() {
        let mut spec = PathSpec::default();
        spec.entry_mut(Category::Fonts).dest = "../fonts".to_string();

        let err = PathTable::new("/project", &spec).unwrap_err();
        assert!(matches!(
            err,
            PathError::EscapesBuildRoot {
                category: Category::Fonts,
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty_or_absolute_build_root() {
        let spec = PathSpec {
            build: String::new(),
            ..PathSpec::default()
        };
        assert!(matches!(
            PathTable::new("/project", &spec),
            Err(PathError::InvalidBuildRoot(_))
        ));

        let spec = PathSpec {
            build: "/tmp/out".to_string(),
            ..PathSpec::default()
        };
        assert!(PathTable::new("/project", &spec).is_err());
    }

    #[test]
    fn rejects_build_root_naming_the_project() {
        for build in [".", "./", "./.", "build/.."] {
            let spec = PathSpec {
                build: build.to_string(),
                ..PathSpec::default()
            };
            assert!(
                matches!(
                    PathTable::new("/project", &spec),
                    Err(PathError::InvalidBuildRoot(_))
                ),
                "accepted build root {build:?}"
            );
        }
    }

    #[test]
    fn rejects_build_root_overlapping_sources() {
        for build in ["src", "src/styles/out"] {
            let spec = PathSpec {
                build: build.to_string(),
                ..PathSpec::default()
            };
            assert!(
                matches!(
                    PathTable::new("/project", &spec),
                    Err(PathError::BuildRootOverlapsSource { .. })
                ),
                "accepted build root {build:?}"
            );
        }
    }

    #[test]
    fn normalizes_dotted_build_root() {
        let spec = PathSpec {
            build: "./build".to_string(),
            ..PathSpec::default()
        };
        let table = PathTable::new("/project", &spec).unwrap();

        assert_eq!(table.build_root(), PathBuf::from("/project/build"));
        assert!(table
            .categories_for(Path::new("/project/build/styles/main.css"))
            .is_empty());
    }

    #[test]
    fn maps_changed_paths_to_categories() {
        let table = PathTable::standard("/project").unwrap();

        assert_eq!(
            table.categories_for(Path::new("/project/src/styles/main.scss")),
            vec![Category::Styles]
        );
        assert_eq!(
            table.categories_for(Path::new("/project/src/assets/data.json")),
            vec![Category::Markup]
        );
        assert_eq!(
            table.categories_for(Path::new("/project/src/partials/header.html")),
            vec![Category::Markup]
        );
        assert_eq!(
            table.categories_for(Path::new("/project/src/assets/images/logo.png")),
            vec![Category::Images]
        );
        assert!(table
            .categories_for(Path::new("/project/build/styles/main.css"))
            .is_empty());
        assert!(table.categories_for(Path::new("/elsewhere/a.scss")).is_empty());
    }

    #[test]
    fn collapses_nested_watch_roots() {
        let table = PathTable::standard("/project").unwrap();
        assert_eq!(table.watch_roots(), vec![PathBuf::from("/project/src")]);
    }

    #[test]
    fn resolves_destinations_under_build_root() {
        let table = PathTable::standard("/project").unwrap();
        assert_eq!(
            table.dest_dir(Category::Styles),
            PathBuf::from("/project/build/styles")
        );
        assert_eq!(table.dest_dir(Category::Markup), PathBuf::from("/project/build/"));
        assert_eq!(Category::from_name("fonts"), Some(Category::Fonts));
        assert_eq!(Category::from_name("css"), None);
    }
}
