//! Asset transform tasks for sitepipe.
//!
//! Compiles styles, renders markup, bundles scripts, optimizes images and copies
//! fonts into a single build root, driven by a registry of named tasks.

mod fonts;
pub mod images;
pub mod markup;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod reload;
pub mod scripts;
pub mod styles;

pub use paths::{Category, EntrySpec, PathEntry, PathError, PathSpec, PathTable, SourceGlob};
pub use pipeline::{Pipeline, PipelineConfig, TaskError, TaskReport};
pub use registry::{Action, TaskDef, TaskRegistry, BUILD, CLEAN, TRANSFORMS};
pub use reload::{ReloadKind, ReloadNotifier};
