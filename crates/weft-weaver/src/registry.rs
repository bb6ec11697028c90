//! Advice discovery
//!
//! Builds one [`AdviceDescriptor`] per advice-tagged method, scanning the
//! local module first (gated by aspect-level validation), then every type
//! of the referenced modules, then the fixed core runtime module whose
//! advice applies globally. The set is rebuilt once per processing pass
//! and never persisted.

use std::fmt;

use weft_model::module::Accessor;
use weft_model::world::TypeEnv;
use weft_model::{
    JoinPoint, MethodDef, MethodSite, Module, TypeDef, TypeName, TypeRef, World,
};

use crate::diag::{codes, Diagnostics};
use crate::options::Options;
use crate::pointcut::{combined_specs, PatternPointcut, Pointcut};
use crate::validate;

/// Everything the matcher, validator and weaver need to know about one
/// advice method.
pub struct AdviceDescriptor {
    /// Name of the module declaring the advice
    pub module: String,
    /// Declaring aspect type
    pub owner: TypeName,
    /// The advice method, body stripped
    pub method: MethodDef,
    /// Join point
    pub join_point: JoinPoint,
    /// Permits by-reference advice parameters
    pub unsafe_injection: bool,
    /// Combined pointcuts; all must match a target
    pub pointcuts: Vec<Box<dyn Pointcut>>,
    /// Declares a method-handle accessor
    pub has_method_accessor: bool,
    /// Declares an argument-view accessor
    pub has_args_accessor: bool,
    /// Declared this-accessor type
    pub this_type: Option<TypeRef>,
    /// Declared return-accessor type
    pub returned_type: Option<TypeRef>,
    /// Declared thrown-accessor type
    pub thrown_type: Option<TypeRef>,
    /// Declared in the module under transformation
    pub local: bool,
}

impl AdviceDescriptor {
    /// `Type::method` path for diagnostics.
    pub fn path(&self) -> String {
        format!("{}::{}", self.owner, self.method.name)
    }

    /// Whether the advice is a constructor (aspect-instantiating).
    pub fn is_ctor(&self) -> bool {
        self.method.is_ctor
    }

    /// Whether the advice takes an aspect-instance receiver.
    pub fn has_this(&self) -> bool {
        self.method.has_this() && !self.method.is_ctor
    }

    /// Whether every combined pointcut selects the target.
    pub fn matches(&self, env: &TypeEnv, site: MethodSite) -> bool {
        self.pointcuts.iter().all(|p| p.is_match(env, site))
    }
}

impl fmt::Debug for AdviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceDescriptor")
            .field("path", &self.path())
            .field("join_point", &self.join_point)
            .field("pointcuts", &self.pointcuts.len())
            .finish()
    }
}

/// Build the full advice set for one processing pass.
pub fn collect(
    main: &Module,
    world: &World,
    options: &Options,
    diags: &mut Diagnostics,
) -> Vec<AdviceDescriptor> {
    let env = TypeEnv::new(main, world);
    let mut out = Vec::new();

    for ty in &main.types {
        if !ty.is_aspect {
            continue;
        }
        if validate::validate_aspect(ty, diags) {
            continue;
        }
        for method in &ty.methods {
            import_advice(&env, &main.name, ty, method, true, &mut out, diags);
        }
    }

    for module in &world.refs {
        if module.name == main.name
            || options.is_excluded(&module.name)
            || !main.references.iter().any(|r| *r == module.name)
        {
            continue;
        }
        scan_module(&env, module, &mut out, diags);
    }
    // The core runtime module supplies advice regardless of references.
    scan_module(&env, &world.core, &mut out, diags);

    out
}

fn scan_module(
    env: &TypeEnv,
    module: &Module,
    out: &mut Vec<AdviceDescriptor>,
    diags: &mut Diagnostics,
) {
    for ty in &module.types {
        if !ty.is_aspect {
            continue;
        }
        for method in &ty.methods {
            import_advice(env, &module.name, ty, method, false, out, diags);
        }
    }
}

fn import_advice(
    env: &TypeEnv,
    module_name: &str,
    ty: &TypeDef,
    method: &MethodDef,
    local: bool,
    out: &mut Vec<AdviceDescriptor>,
    diags: &mut Diagnostics,
) {
    let Some(tag) = method.advice else {
        return;
    };

    let path = format!("{}::{}", ty.name, method.name);
    let mut pointcuts: Vec<Box<dyn Pointcut>> = Vec::new();
    for spec in combined_specs(env, ty, method) {
        match PatternPointcut::from_spec(&spec) {
            Ok(p) => pointcuts.push(Box::new(p)),
            Err(e) => diags.error(
                codes::BAD_POINTCUT_PATTERN,
                path.clone(),
                format!("pointcut pattern {:?} does not compile: {e}", spec.pattern),
            ),
        }
    }

    let accessor_ty = |kind: Accessor| {
        method
            .params
            .iter()
            .find(|p| p.accessor == Some(kind))
            .map(|p| p.ty.clone())
    };

    let mut stripped = method.clone();
    stripped.body = None;

    log::debug!("collected advice {path} from {module_name}");
    out.push(AdviceDescriptor {
        module: module_name.to_string(),
        owner: ty.name.clone(),
        method: stripped,
        join_point: tag.join_point,
        unsafe_injection: tag.unsafe_injection,
        pointcuts,
        has_method_accessor: method
            .params
            .iter()
            .any(|p| p.accessor == Some(Accessor::MethodHandle)),
        has_args_accessor: method
            .params
            .iter()
            .any(|p| p.accessor == Some(Accessor::Args)),
        this_type: accessor_ty(Accessor::This),
        returned_type: accessor_ty(Accessor::Returned),
        thrown_type: accessor_ty(Accessor::Thrown),
        local,
    });
}
