//! Pointcut matching
//!
//! A [`Pointcut`] decides whether an advice applies to a target method.
//! The surface is capability-polymorphic so further matcher kinds can be
//! added; the one implemented today matches a compiled regular expression
//! against the target's signature rendered under the pointcut's detail
//! mask.

use regex::Regex;

use weft_model::world::TypeEnv;
use weft_model::{DetailFlags, MethodDef, MethodSite, PointcutSpec, TypeDef};

/// A predicate selecting target methods.
pub trait Pointcut {
    /// Whether the pointcut selects the method.
    fn is_match(&self, env: &TypeEnv, site: MethodSite) -> bool;
}

/// Pattern pointcut: a regex over the rendered signature.
#[derive(Debug)]
pub struct PatternPointcut {
    regex: Regex,
    mask: DetailFlags,
}

impl PatternPointcut {
    /// Compile a pointcut from its declared spec.
    pub fn from_spec(spec: &PointcutSpec) -> Result<Self, regex::Error> {
        Ok(PatternPointcut {
            regex: Regex::new(&spec.pattern)?,
            mask: spec.mask,
        })
    }

    /// The detail mask the pattern is matched under.
    pub fn mask(&self) -> DetailFlags {
        self.mask
    }
}

impl Pointcut for PatternPointcut {
    fn is_match(&self, env: &TypeEnv, site: MethodSite) -> bool {
        let signature = weft_render::render(env, site, self.mask);
        self.regex.is_match(&signature)
    }
}

/// Pointcut specs that apply to an advice method: its own, plus those of
/// its declaring type and every ancestor declaring type, walked outward
/// from innermost to outermost.
pub fn combined_specs(env: &TypeEnv, owner: &TypeDef, method: &MethodDef) -> Vec<PointcutSpec> {
    let mut specs = Vec::new();
    let mut ty = Some(owner);
    while let Some(current) = ty {
        specs.extend(current.pointcuts.iter().cloned());
        ty = current.declaring.as_ref().and_then(|name| env.resolve(name));
    }
    specs.extend(method.pointcuts.iter().cloned());
    specs
}
