#![warn(clippy::pedantic)]
//! Semantic analysis for the Practical language.
//!
//! Given a parsed [`practical_ast::nodes::Module`], this crate assigns a
//! canonical [`static_type::StaticType`] to every expression, proves or
//! disproves integer-overflow safety through value-range propagation, splices
//! in implicit conversions found by a weighted search over the registered cast
//! graph, and replays the typed program into a code-generation backend.
//!
//! ## Subsystems
//!
//! - [`static_type`] - structurally compared scalar, function, pointer, array
//!   and struct types with orthogonal `ref` / `mut` qualifier flags;
//! - [`value_range`] - provable `[min, max]` bounds per integer expression.
//!   Unsigned arithmetic wraps; guaranteed signed overflow is reported as
//!   [`errors::UndefinedBehavior`];
//! - [`cast`] - minimum-weight, unambiguous conversion chains under an
//!   expression-wide weight budget;
//! - [`lookup_context`] - parent-chained scopes of named types and objects;
//! - [`builtins`] - the builtin scalars, their cast graph and operators;
//! - [`codegen`] - the backend callback interface.
//!
//! ## Quick Start
//!
//! ```ignore
//! use practical_sema::{AnalyzerBuilder, builtins, options::AnalyzerOptions};
//!
//! let builtins = builtins::prepare(&mut backend);
//! let typed = AnalyzerBuilder::build_typed_module(&builtins, &module, &AnalyzerOptions::default())?
//!     .typed_module();
//! typed.code_gen(&mut backend);
//! ```
//!
//! On failure the `anyhow::Error` wraps an [`errors::AnalysisFailed`] holding
//! every collected [`errors::SemaError`].

use std::marker::PhantomData;

use practical_ast::nodes::Module;

use crate::builtins::Builtins;
use crate::codegen::ModuleGen;
use crate::errors::AnalysisFailed;
use crate::options::AnalyzerOptions;
use crate::typed_tree::TypedModule;

mod analyzer;
pub mod builtins;
pub mod cast;
pub mod codegen;
pub mod errors;
pub mod lookup_context;
pub mod operators;
pub mod options;
pub mod static_type;
pub mod typed_tree;
pub mod value_range;

/// Marker state indicating no module has been analysed yet.
pub struct AnalyzerInitState;

/// Marker state indicating analysis succeeded and the typed module is ready.
pub struct AnalyzerCompleteState;

pub type CompletedAnalyzerBuilder = AnalyzerBuilder<AnalyzerCompleteState>;

/// Runs semantic analysis on one module.
///
/// Uses the typestate pattern so the typed module can only be taken from a
/// successful run.
pub struct AnalyzerBuilder<S> {
    typed_module: Option<TypedModule>,
    _state: PhantomData<S>,
}

impl Default for AnalyzerBuilder<AnalyzerInitState> {
    fn default() -> Self {
        AnalyzerBuilder::new()
    }
}

impl AnalyzerBuilder<AnalyzerInitState> {
    #[must_use]
    pub fn new() -> Self {
        AnalyzerBuilder {
            typed_module: None,
            _state: PhantomData,
        }
    }

    /// Analyses `module` against the prepared builtins.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisFailed`] carrying every error found in the module.
    #[must_use = "returns builder with typed module, extract with .typed_module()"]
    pub fn build_typed_module(
        builtins: &Builtins,
        module: &Module,
        options: &AnalyzerOptions,
    ) -> anyhow::Result<AnalyzerBuilder<AnalyzerCompleteState>> {
        let typed_module = analyzer::analyze_module(builtins, module, options)
            .map_err(|errors| AnalysisFailed { errors })?;
        Ok(AnalyzerBuilder {
            typed_module: Some(typed_module),
            _state: PhantomData,
        })
    }
}

impl AnalyzerBuilder<AnalyzerCompleteState> {
    /// Consume the builder and return the typed module.
    #[must_use = "consumes builder and returns the typed module"]
    pub fn typed_module(self) -> TypedModule {
        match self.typed_module {
            Some(module) => module,
            None => errors::ice!("completed analyzer holds no module"),
        }
    }
}

/// Analyses `module` and, if it is error free, replays it into `backend`.
///
/// # Errors
///
/// See [`AnalyzerBuilder::build_typed_module`]. Nothing is emitted on error.
pub fn compile(
    builtins: &Builtins,
    module: &Module,
    options: &AnalyzerOptions,
    backend: &mut dyn ModuleGen,
) -> anyhow::Result<()> {
    let typed = AnalyzerBuilder::build_typed_module(builtins, module, options)?.typed_module();
    typed.code_gen(backend);
    Ok(())
}
