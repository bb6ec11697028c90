//! Compile-time aspect weaving
//!
//! Given a compiled module and its world (referenced modules plus the core
//! runtime module), the weaver discovers advice methods tagged with
//! join-point and pointcut metadata, validates them, and rewrites matched
//! target method bodies so advice runs before, after, after-returning or
//! after-throwing relative to the original logic.
//!
//! A module comes back unmodified when it is excluded by name, opts out,
//! fails aspect- or advice-level validation, matches nothing, or an
//! unexpected internal failure is caught (logged, never propagated).

pub mod binding;
pub mod diag;
pub mod error;
pub mod options;
pub mod pointcut;
pub mod registry;
pub mod scratch;
pub mod siglog;
pub mod validate;
pub mod weave;

pub use diag::{Diagnostic, Diagnostics, ErrorCode, Severity};
pub use error::WeaveError;
pub use options::Options;
pub use pointcut::{PatternPointcut, Pointcut};
pub use registry::AdviceDescriptor;
pub use weave::SHADOW_PREFIX;

use weft_model::world::TypeEnv;
use weft_model::{Module, World};

/// What happened to one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Method bodies were rewritten in place
    Modified {
        /// Number of rewritten methods
        methods: usize,
    },
    /// The module was left untouched
    Unchanged,
}

/// Outcome and accumulated diagnostics for one module.
#[derive(Debug)]
pub struct Report {
    /// What happened
    pub outcome: Outcome,
    /// Everything reported along the way
    pub diagnostics: Diagnostics,
}

impl Report {
    /// Whether the module was modified.
    pub fn is_modified(&self) -> bool {
        matches!(self.outcome, Outcome::Modified { .. })
    }
}

/// The weaving engine for one configuration.
#[derive(Debug, Default)]
pub struct Weaver {
    options: Options,
}

impl Weaver {
    /// Create a weaver with the given options.
    pub fn new(options: Options) -> Self {
        Weaver { options }
    }

    /// The active options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Process one module: discover and validate advice, weave every
    /// eligible method in place. Never panics past this boundary; internal
    /// failures are logged and produce an unchanged outcome.
    pub fn process(&self, module: &mut Module, world: &World) -> Report {
        let mut diagnostics = Diagnostics::new();
        let outcome = match self.try_process(module, world, &mut diagnostics) {
            Ok(0) => Outcome::Unchanged,
            Ok(methods) => Outcome::Modified { methods },
            Err(e) => {
                log::error!(
                    "weaving module {} failed: {e}; leaving it unchanged",
                    module.name
                );
                Outcome::Unchanged
            }
        };
        Report {
            outcome,
            diagnostics,
        }
    }

    fn try_process(
        &self,
        module: &mut Module,
        world: &World,
        diags: &mut Diagnostics,
    ) -> Result<usize, WeaveError> {
        if self.options.is_excluded(&module.name) {
            return Ok(0);
        }

        siglog::write_reports(module, world, &self.options);

        let advices = registry::collect(module, world, &self.options, diags);

        {
            let env = TypeEnv::new(module, world);
            for adv in advices.iter().filter(|a| a.local) {
                validate::validate_advice(&env, adv, diags);
            }
        }

        // Aspect- and advice-level errors suppress weaving for the whole
        // module; the driver moves on to the next one.
        if diags.has_errors() {
            return Ok(0);
        }

        if module.opt_out {
            return Ok(0);
        }

        weave::weave_module(module, world, &advices, diags)
    }
}

/// Drive a whole pass: process each module against the shared world,
/// isolating failures per module.
pub fn weave_all(modules: &mut [Module], world: &World, options: &Options) -> Vec<Report> {
    let weaver = Weaver::new(options.clone());
    modules
        .iter_mut()
        .map(|module| weaver.process(module, world))
        .collect()
}
