//! Named tasks with explicit dependency edges.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt};

use crate::paths::Category;
use crate::pipeline::{Pipeline, TaskError, TaskReport};

/// One-shot build: clean, then every transform.
pub const BUILD: &str = "build";

/// Every transform without cleaning first.
pub const TRANSFORMS: &str = "transforms";

/// Clean task name.
pub const CLEAN: &str = "clean";

/// What a task does once its dependencies have finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Delete the build root
    Clean,
    /// Run one category's transform
    Transform(Category),
    /// Run the named tasks concurrently and wait for all of them
    Group(Vec<String>),
}

/// A registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDef {
    pub name: String,
    pub action: Action,
    /// Tasks that must complete, in order, before this one starts
    pub depends_on: Vec<String>,
}

impl TaskDef {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            depends_on: Vec::new(),
        }
    }

    /// Add a dependency edge.
    pub fn depends_on(mut self, task: impl Into<String>) -> Self {
        self.depends_on.push(task.into());
        self
    }
}

/// Map from task name to definition, built once and passed by reference.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskDef>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard tasks: clean, one per category, `transforms` and `build`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(TaskDef::new(CLEAN, Action::Clean));

        for category in Category::ALL {
            registry.register(TaskDef::new(category.name(), Action::Transform(category)));
        }

        let all: Vec<String> = Category::ALL.iter().map(|c| c.name().to_string()).collect();
        registry.register(TaskDef::new(TRANSFORMS, Action::Group(all.clone())));
        registry.register(TaskDef::new(BUILD, Action::Group(all)).depends_on(CLEAN));

        registry
    }

    /// Register a task, replacing and returning any task with the same name.
    pub fn register(&mut self, task: TaskDef) -> Option<TaskDef> {
        self.tasks.insert(task.name.clone(), task)
    }

    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run a task after its dependencies.
    ///
    /// Returns a report for every task that ran, or the first failure.
    pub async fn run(&self, name: &str, pipeline: &Pipeline) -> Result<Vec<TaskReport>, TaskError> {
        self.run_task(name, pipeline, Vec::new()).await
    }

    fn run_task<'a>(
        &'a self,
        name: &'a str,
        pipeline: &'a Pipeline,
        mut stack: Vec<String>,
    ) -> BoxFuture<'a, Result<Vec<TaskReport>, TaskError>> {
        async move {
            if stack.iter().any(|n| n == name) {
                return Err(TaskError::Cycle(name.to_string()));
            }
            let task = self
                .get(name)
                .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
            stack.push(name.to_string());

            let mut reports = Vec::new();
            for dependency in &task.depends_on {
                reports.extend(self.run_task(dependency, pipeline, stack.clone()).await?);
            }

            let start = Instant::now();
            tracing::info!("Starting '{}'", name);

            match &task.action {
                Action::Clean => reports.push(pipeline.clean()?),
                Action::Transform(category) => reports.push(pipeline.transform(*category).await?),
                Action::Group(members) => {
                    let results = join_all(
                        members
                            .iter()
                            .map(|member| self.run_task(member, pipeline, stack.clone())),
                    )
                    .await;

                    let mut first_error = None;
                    for (member, result) in members.iter().zip(results) {
                        match result {
                            Ok(member_reports) => reports.extend(member_reports),
                            Err(e) => {
                                tracing::error!("Task '{}' failed: {}", member, e);
                                first_error.get_or_insert(e);
                            }
                        }
                    }
                    if let Some(e) = first_error {
                        return Err(e);
                    }
                }
            }

            tracing::info!(
                "Finished '{}' after {}ms",
                name,
                start.elapsed().as_millis()
            );

            Ok(reports)
        }
        .boxed()
    }
}
