//! Concurrent package orchestration.
//!
//! Every (package, backend) pair is one task. A task compiles its package on
//! the blocking pool, builds the generation request and hands it to its
//! backend. Tasks run concurrently, bounded by a semaphore, and never
//! cancel each other. Results flow back to a single loop that owns the
//! output; if any task failed, its buffered diagnostics are written to the
//! sink in task order and no files are returned.

use crate::backend::Backend;
use crate::config::{Config, ConfigError, Source};
use crate::options::RunOptions;
use sqlforge_codegen::{
    File, GenerateBackend, GenerateContext, GenerateRequest, JsonBackend, ProcessBackend,
    Settings, TemplateBackend,
};
use sqlforge_compiler::{CompileError, CompiledResult, Compiler, ParseOptions};
use sqlforge_core::{DebugOptions, MultiError, SqlSource};
use sqlforge_sql::Engine;
use sqlforge_wasm::WasmBackend;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// One failed task and what it reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Position in the task list
    pub index: usize,
    /// Package name
    pub package: String,
    /// Backend name
    pub backend: String,
    /// Diagnostics, one per line
    pub diagnostics: Vec<String>,
}

/// Errors from a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The configuration could not be turned into tasks
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// At least one task failed; nothing was produced
    #[error("{count} of {total} tasks failed", count = .failures.len())]
    Failed {
        /// Failed tasks, in task order
        failures: Vec<TaskFailure>,
        /// Number of tasks run
        total: usize,
    },
}

/// Everything a successful run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOutput {
    /// File contents keyed by `out/<file name>`
    pub files: BTreeMap<String, String>,
    /// Every request sent, in task order
    pub requests: Vec<GenerateRequest>,
}

#[derive(Debug)]
struct PackageSources {
    engine: Engine,
    schema: Vec<SqlSource>,
    queries: Vec<SqlSource>,
}

/// A (package, backend) unit of work
#[derive(Debug)]
pub struct Task {
    /// Position in the task list
    pub index: usize,
    /// Package name
    pub package: String,
    /// Output directory the backend's files are placed under
    pub out: String,
    /// The backend
    pub backend: Backend,
    settings: Settings,
    sources: Arc<PackageSources>,
}

struct Generated {
    out: String,
    files: Vec<File>,
    request: GenerateRequest,
}

struct TaskOutcome {
    index: usize,
    result: Result<Generated, Vec<String>>,
}

/// Runs every package of a configuration
#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    base_dir: PathBuf,
    options: RunOptions,
}

impl Orchestrator {
    /// Create an orchestrator; file sources resolve against `base_dir`
    #[must_use]
    pub fn new(config: Config, base_dir: impl Into<PathBuf>, options: RunOptions) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            options,
        }
    }

    /// Base directory of the configuration
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Load every source and expand packages into tasks
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be read or a backend cannot be built
    pub fn plan(&self) -> Result<Vec<Task>, ConfigError> {
        let cache = self.options.module_cache();
        let mut tasks = Vec::new();
        for package in &self.config.sql {
            let engine = package.engine()?;
            let schema = load_all(&package.schema, &self.base_dir)?;
            let queries = load_all(&package.queries, &self.base_dir)?;
            let settings = Settings {
                version: self.config.version.clone(),
                engine,
                package: package.name.clone(),
                schema: schema.iter().map(|s| s.name.clone()).collect(),
                queries: queries.iter().map(|s| s.name.clone()).collect(),
                rust: None,
                json: None,
                codegen: None,
            };
            let sources = Arc::new(PackageSources {
                engine,
                schema,
                queries,
            });
            let mut push = |backend: Backend, out: &str, settings: Settings| {
                tasks.push(Task {
                    index: tasks.len(),
                    package: package.name.clone(),
                    out: out.to_string(),
                    backend,
                    settings,
                    sources: Arc::clone(&sources),
                });
            };

            if let Some(rust) = &package.r#gen.rust {
                let settings = Settings {
                    rust: Some(rust.clone()),
                    ..settings.clone()
                };
                push(Backend::Template(TemplateBackend::new()), &rust.out, settings);
            }
            if let Some(json) = &package.r#gen.json {
                let settings = Settings {
                    json: Some(json.clone()),
                    ..settings.clone()
                };
                push(Backend::Json(JsonBackend::new()), &json.out, settings);
            }
            for codegen in &package.codegen {
                let plugin = self.config.plugin(&codegen.plugin).ok_or_else(|| {
                    ConfigError::PluginNotFound {
                        package: package.name.clone(),
                        plugin: codegen.plugin.clone(),
                    }
                })?;
                let backend = match (&plugin.process, &plugin.wasm) {
                    (Some(process), None) => {
                        if !self.options.debug.process_plugins {
                            return Err(ConfigError::ProcessPluginsDisabled(plugin.name.clone()));
                        }
                        Backend::Process(ProcessBackend::new(&plugin.name, &process.cmd))
                    }
                    (None, Some(wasm)) => {
                        let backend = WasmBackend::new(
                            &plugin.name,
                            &wasm.url,
                            wasm.sha256,
                            cache.clone(),
                            self.options.sandbox.clone(),
                        )
                        .map_err(|err| ConfigError::Plugin {
                            plugin: plugin.name.clone(),
                            message: err.to_string(),
                        })?;
                        Backend::Wasm(backend)
                    }
                    _ => return Err(ConfigError::PluginKind(plugin.name.clone())),
                };
                let settings = Settings {
                    codegen: Some(codegen.clone()),
                    ..settings.clone()
                };
                push(backend, &codegen.out, settings);
            }
        }
        Ok(tasks)
    }

    /// Run every task and merge the results.
    ///
    /// Diagnostics of failed tasks are written to `sink` once all tasks are
    /// done.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Config`] if planning fails and
    /// [`RunError::Failed`] if any task failed
    pub async fn run<W: Write + ?Sized>(&self, sink: &mut W) -> Result<GenerateOutput, RunError> {
        let tasks = self.plan()?;
        let total = tasks.len();
        let parallelism = self.options.effective_parallelism();
        tracing::debug!(tasks = total, parallelism, "starting run");

        let semaphore = Arc::new(Semaphore::new(parallelism));
        let ctx = GenerateContext::new()
            .with_cancel(self.options.cancel.clone())
            .with_timeout(self.options.timeout);
        let debug = self.options.debug;

        let mut set = JoinSet::new();
        let mut labels = Vec::with_capacity(total);
        for task in tasks {
            let span = tracing::info_span!("package", name = %task.package, backend = %task.backend.name());
            labels.push((task.package.clone(), task.backend.name().to_string()));
            let index = task.index;
            let semaphore = Arc::clone(&semaphore);
            let ctx = ctx.clone();
            set.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return TaskOutcome {
                            index,
                            result: Err(vec!["scheduler closed".to_string()]),
                        };
                    };
                    execute(task, &ctx, debug).await
                }
                .instrument(span),
            );
        }

        let mut outcomes: Vec<Option<TaskOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    let index = outcome.index;
                    outcomes[index] = Some(outcome);
                }
                // The slot stays empty and the task is reported as unfinished
                Err(err) => tracing::warn!(error = %err, "task aborted"),
            }
        }

        let (output, failures) = merge(outcomes, labels);
        if failures.is_empty() {
            tracing::debug!(files = output.files.len(), "run complete");
            return Ok(output);
        }
        if let Err(err) = write_diagnostics(sink, &failures) {
            tracing::warn!(error = %err, "could not write diagnostics");
        }
        Err(RunError::Failed { failures, total })
    }
}

fn load_all(sources: &[Source], base: &Path) -> Result<Vec<SqlSource>, ConfigError> {
    let mut loaded = Vec::new();
    for source in sources {
        loaded.extend(source.load(base)?);
    }
    Ok(loaded)
}

fn lines(merr: MultiError) -> Vec<String> {
    merr.sorted().errs().iter().map(ToString::to_string).collect()
}

fn compile(sources: &PackageSources, debug: DebugOptions) -> Result<CompiledResult, Vec<String>> {
    let mut compiler = Compiler::new(sources.engine, debug);
    compiler.parse_catalog(&sources.schema).map_err(lines)?;
    match compiler.parse_queries(&sources.queries, &ParseOptions::default()) {
        Ok(()) => Ok(compiler.result()),
        Err(CompileError::Aggregate(merr)) => Err(lines(merr)),
        Err(other) => Err(vec![other.to_string()]),
    }
}

async fn execute(task: Task, ctx: &GenerateContext, debug: DebugOptions) -> TaskOutcome {
    let Task {
        index,
        out,
        backend,
        settings,
        sources,
        ..
    } = task;

    let span = tracing::debug_span!("parse");
    let compiled = tokio::task::spawn_blocking(move || span.in_scope(|| compile(&sources, debug)))
        .await
        .unwrap_or_else(|err| Err(vec![format!("compiler task failed: {}", err)]));
    let compiled = match compiled {
        Ok(compiled) => compiled,
        Err(diagnostics) => {
            tracing::warn!(errors = diagnostics.len(), "package failed to compile");
            return TaskOutcome {
                index,
                result: Err(diagnostics),
            };
        }
    };

    let request = GenerateRequest::new(settings, compiled);
    if debug.dump_request {
        match serde_json::to_string(&request) {
            Ok(json) => tracing::debug!(request = %json, "generate request"),
            Err(err) => tracing::debug!(error = %err, "request dump failed"),
        }
    }

    let result = match backend.generate(ctx, &request).await {
        Ok(response) => Ok(Generated {
            out,
            files: response.files,
            request,
        }),
        Err(err) => {
            tracing::warn!(error = %err, "generation failed");
            Err(vec![format!("{}: {}", backend.name(), err)])
        }
    };
    TaskOutcome { index, result }
}

fn output_path(out: &str, name: &str) -> String {
    let out = out.trim_end_matches('/');
    if out.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", out, name)
    }
}

/// Join a generated file name onto its output directory. The name must be
/// relative and stay below `out`.
fn checked_path(out: &str, name: &str) -> Result<String, String> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path.components().any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(format!("{:?}: file name escapes the output directory", name));
    }
    Ok(output_path(out, name))
}

fn merge(
    outcomes: Vec<Option<TaskOutcome>>,
    labels: Vec<(String, String)>,
) -> (GenerateOutput, Vec<TaskFailure>) {
    let mut output = GenerateOutput::default();
    let mut failures = Vec::new();
    for (index, (outcome, (package, backend))) in outcomes.into_iter().zip(labels).enumerate() {
        let result = outcome.map_or_else(|| Err(vec!["task did not finish".to_string()]), |o| o.result);
        let diagnostics = match result {
            Ok(generated) => {
                let mut conflicts = Vec::new();
                for file in generated.files {
                    let key = match checked_path(&generated.out, &file.name) {
                        Ok(key) => key,
                        Err(message) => {
                            conflicts.push(message);
                            continue;
                        }
                    };
                    if output.files.contains_key(&key) {
                        conflicts.push(format!("{}: generated more than once", key));
                    } else {
                        output.files.insert(key, file.contents);
                    }
                }
                if conflicts.is_empty() {
                    output.requests.push(generated.request);
                    continue;
                }
                conflicts
            }
            Err(diagnostics) => diagnostics,
        };
        failures.push(TaskFailure {
            index,
            package,
            backend,
            diagnostics,
        });
    }
    (output, failures)
}

fn write_diagnostics<W: Write + ?Sized>(sink: &mut W, failures: &[TaskFailure]) -> std::io::Result<()> {
    for failure in failures {
        writeln!(sink, "# package {} ({})", failure.package, failure.backend)?;
        for line in &failure.diagnostics {
            writeln!(sink, "{}", line)?;
        }
    }
    sink.flush()
}
