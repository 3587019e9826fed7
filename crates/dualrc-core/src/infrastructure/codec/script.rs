//! Sandboxed evaluation of script-form config files.
//!
//! Script-form files are [Rhai](https://rhai.rs) scripts.  While a script
//! runs it can call exactly two functions that reach back into the store:
//!
//! ```rhai
//! set_config(#{ port: 4005, host: "localhost" });  // merge values
//! set_profile("fast", #{ jobs: 8 });               // register a profile
//! ```
//!
//! # Scoping
//!
//! Every evaluation builds a fresh [`Engine`] whose hook functions capture
//! the [`ScriptHooks`] passed to [`ScriptSandbox::evaluate`].  The engine is
//! a local of `evaluate`, so the hooks are released when it returns, whether
//! the script succeeded or not.  Nothing is registered globally.
//!
//! # The autogenerated section
//!
//! Before evaluation the autogenerated section is swapped for
//! `set_config(AUTOGENERATED_CONFIG);` padded with the same number of line
//! breaks, and `AUTOGENERATED_CONFIG` is bound to the section's JSON payload.
//! The payload never becomes a Rhai map (those are sorted by key), so the
//! saved key order and JSON value types come back exactly.  A hand-edited
//! section that is no longer JSON is evaluated as ordinary script text.
//!
//! # Key order
//!
//! Rhai object maps are ordered by key, so the keys of one `set_config` map
//! literal arrive sorted: `set_config(#{ zeta: 1, alpha: 2 })` yields
//! `alpha` then `zeta`.  Across calls, keys keep the order in which they were
//! first set.  Only the autogenerated payload keeps its saved order.
//!
//! # Limits
//!
//! Module imports are disabled and evaluation stops after a fixed number of
//! operations, so a runaway `loop {}` fails instead of stalling the load.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Map, Scope};
use tracing::{debug, info};

use super::CodecError;
use crate::domain::autogen::{self, PROFILE_HOOK, SETTER_HOOK};
use crate::domain::config_map::ConfigMap;

/// Scope constant holding the autogenerated section's payload.
const AUTOGENERATED_VAR: &str = "AUTOGENERATED_CONFIG";

const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;
const DEFAULT_MAX_EXPR_DEPTH: usize = 64;

/// Receiver for the two calls a script can make back into the store.
pub trait ScriptHooks: Send + Sync {
    /// Called once per `set_config(map)`; every key is merged, last wins.
    fn set_config(&self, values: ConfigMap);

    /// Called once per `set_profile(name, map)` or `set_profile(name)`.
    fn set_profile(&self, name: &str, overrides: ConfigMap);
}

/// Observer for text a script prints with `print(...)`.
pub type PrintSink = Arc<dyn Fn(&str) + Send + Sync>;

/// The autogenerated payload, passed to the script as an opaque value.
#[derive(Debug, Clone)]
struct AutogeneratedConfig(ConfigMap);

/// Evaluation settings for script-form config files.
#[derive(Clone)]
pub struct ScriptSandbox {
    max_operations: u64,
    max_expr_depth: usize,
    print_sink: Option<PrintSink>,
}

impl fmt::Debug for ScriptSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptSandbox")
            .field("max_operations", &self.max_operations)
            .field("max_expr_depth", &self.max_expr_depth)
            .field("print_sink", &self.print_sink.is_some())
            .finish()
    }
}

impl Default for ScriptSandbox {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_expr_depth: DEFAULT_MAX_EXPR_DEPTH,
            print_sink: None,
        }
    }
}

impl ScriptSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of operations a single evaluation may perform.
    #[must_use]
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Forwards everything the script prints to `sink`, in addition to the
    /// `tracing` log.
    #[must_use]
    pub fn with_print_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.print_sink = Some(Arc::new(sink));
        self
    }

    /// Evaluates `source`, reporting hook calls to `hooks`.
    ///
    /// `origin` is only used in log messages.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Script`] if the script fails to parse, raises an
    /// error, passes a non-map to a hook or exceeds the sandbox limits.  Hook
    /// calls made before the failure have already been delivered.
    pub fn evaluate(
        &self,
        source: &str,
        origin: &Path,
        hooks: Arc<dyn ScriptHooks>,
    ) -> Result<(), CodecError> {
        let (script, autogenerated) = split_autogenerated(source);

        let engine = self.engine(hooks, origin);
        let mut scope = Scope::new();
        if let Some(config) = autogenerated {
            scope.push_constant(AUTOGENERATED_VAR, AutogeneratedConfig(config));
        }

        engine
            .run_with_scope(&mut scope, &script)
            .map_err(|e| CodecError::Script(e.to_string()))
    }

    fn engine(&self, hooks: Arc<dyn ScriptHooks>, origin: &Path) -> Engine {
        let mut engine = Engine::new();
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.set_max_operations(self.max_operations);
        engine.set_max_expr_depths(self.max_expr_depth, self.max_expr_depth);
        engine.register_type_with_name::<AutogeneratedConfig>("AutogeneratedConfig");

        let setter = Arc::clone(&hooks);
        engine.register_fn(SETTER_HOOK, move |values: Map| -> Result<(), Box<EvalAltResult>> {
            setter.set_config(config_from_rhai(values)?);
            Ok(())
        });

        let setter = Arc::clone(&hooks);
        engine.register_fn(SETTER_HOOK, move |snapshot: AutogeneratedConfig| {
            setter.set_config(snapshot.0);
        });

        let profiles = Arc::clone(&hooks);
        engine.register_fn(
            PROFILE_HOOK,
            move |name: ImmutableString, overrides: Map| -> Result<(), Box<EvalAltResult>> {
                profiles.set_profile(name.as_str(), config_from_rhai(overrides)?);
                Ok(())
            },
        );

        let profiles = hooks;
        engine.register_fn(PROFILE_HOOK, move |name: ImmutableString| {
            profiles.set_profile(name.as_str(), ConfigMap::new());
        });

        let label = origin.display().to_string();
        let sink = self.print_sink.clone();
        engine.on_print(move |text| {
            info!("{label}: {text}");
            if let Some(sink) = &sink {
                sink(text);
            }
        });

        let label = origin.display().to_string();
        engine.on_debug(move |text, _source, pos| {
            debug!("{label} ({pos}): {text}");
        });

        engine
    }
}

/// Converts a Rhai object map into JSON; keys come out sorted.
fn config_from_rhai(map: Map) -> Result<ConfigMap, Box<EvalAltResult>> {
    rhai::serde::from_dynamic(&Dynamic::from_map(map))
}

/// Replaces a JSON autogenerated section with a call on a bound constant.
fn split_autogenerated(source: &str) -> (Cow<'_, str>, Option<ConfigMap>) {
    let Some(section) = autogen::locate(source) else {
        return (Cow::Borrowed(source), None);
    };
    let Some(config) = autogen::payload(source, &section) else {
        return (Cow::Borrowed(source), None);
    };

    let line_breaks = source[section.span.clone()].matches('\n').count();
    let mut script = String::with_capacity(source.len());
    script.push_str(&source[..section.span.start]);
    script.push_str(SETTER_HOOK);
    script.push('(');
    script.push_str(AUTOGENERATED_VAR);
    script.push_str(");");
    script.push_str(&"\n".repeat(line_breaks));
    script.push_str(&source[section.span.end..]);
    (Cow::Owned(script), Some(config))
}
