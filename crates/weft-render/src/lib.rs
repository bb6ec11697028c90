//! Deterministic signature rendering
//!
//! [`render`] produces the canonical text form of a method's structural
//! signature under a [`DetailFlags`] mask. Pointcut patterns are matched
//! against this text, so the output is deterministic: the same method and
//! mask always render identically, and rendering reads only structural
//! metadata.

use weft_model::module::{Attribute, AttrValue, ParamDirection, Virtuality};
use weft_model::ty::{TypeName, TypeRef};
use weft_model::world::TypeEnv;
use weft_model::{DetailFlags, MethodSite, TypeDef, TypeKind};

/// Render the signature of `site.method` under `flags`.
pub fn render(env: &TypeEnv, site: MethodSite, flags: DetailFlags) -> String {
    let method = site.method;
    let owner = site.owner;

    let full = flags.contains(DetailFlags::TYPE_FULL_NAMES);
    let mut out = String::new();

    if flags.contains(DetailFlags::MODULE_NAME) {
        out.push_str(&site.module.name);
    }

    if flags.contains(DetailFlags::MODULE_ATTRS) {
        append_attrs(&mut out, env, "module", &site.module.attrs, flags);
    }

    if flags.contains(DetailFlags::DECLARING_TYPE_ATTRS) {
        if flags.contains(DetailFlags::ANCESTOR_DECLARING_TYPE_ATTRS) {
            let mut attrs = Vec::new();
            collect_declaring_attrs(env, owner, &mut attrs);
            append_attrs(&mut out, env, "declaring", &attrs, flags);
        } else {
            append_attrs(&mut out, env, "declaring", &owner.attrs, flags);
        }
    }

    if flags.contains(DetailFlags::RETURN_TYPE_ATTRS) {
        append_attrs(&mut out, env, "return", &method.return_attrs, flags);
    }

    if flags.contains(DetailFlags::METHOD_ATTRS) {
        append_attrs(&mut out, env, "", &method.attrs, flags);
    }

    if flags.contains(DetailFlags::ACCESS_MODIFIER) {
        separate(&mut out);
        out.push_str(method.access.keyword());
    }

    if flags.contains(DetailFlags::STATIC_MODIFIER) && method.is_static {
        separate(&mut out);
        out.push_str("static");
    }

    if flags.contains(DetailFlags::OVERRIDE_MODIFIER) {
        let keyword = match method.virtuality {
            Virtuality::None => None,
            Virtuality::Virtual => Some("virtual"),
            Virtuality::Override => Some("override"),
            Virtuality::New => Some("new"),
            Virtuality::Sealed => Some("sealed override"),
        };
        if let Some(keyword) = keyword {
            separate(&mut out);
            out.push_str(keyword);
        }
    }

    if flags.contains(DetailFlags::RETURN_TYPE_NAME) {
        separate(&mut out);
        append_type_name(&mut out, env, &method.return_type, full, None);
    }

    if flags.contains(DetailFlags::DECLARING_TYPE_NAME) {
        separate(&mut out);
        append_named(&mut out, env, &owner.name, full);
    }

    let declaring_generics = !owner.generic_params.is_empty()
        && flags.intersects(
            DetailFlags::DECLARING_TYPE_GENERIC_ATTRS | DetailFlags::DECLARING_TYPE_GENERIC_NAMES,
        );
    if declaring_generics {
        out.push('<');
        for (i, gp) in owner.generic_params.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if flags.contains(DetailFlags::DECLARING_TYPE_GENERIC_ATTRS) {
                append_attrs(&mut out, env, "", &gp.attrs, flags);
            }
            if flags.contains(DetailFlags::DECLARING_TYPE_GENERIC_NAMES) {
                out.push_str(&gp.name);
            }
        }
        out.push('>');
    }

    if flags.contains(DetailFlags::METHOD_NAME) {
        if flags.contains(DetailFlags::DECLARING_TYPE_NAME) || declaring_generics {
            out.push_str("::");
        } else {
            separate(&mut out);
        }
        out.push_str(&method.name);
    }

    let method_generics = !method.generic_params.is_empty()
        && flags.intersects(DetailFlags::GENERIC_ARG_ATTRS | DetailFlags::GENERIC_ARG_NAMES);
    if method_generics {
        out.push('<');
        for (i, gp) in method.generic_params.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if flags.contains(DetailFlags::GENERIC_ARG_ATTRS) {
                append_attrs(&mut out, env, "", &gp.attrs, flags);
            }
            if flags.contains(DetailFlags::GENERIC_ARG_NAMES) {
                out.push_str(&gp.name);
            }
        }
        out.push('>');
    }

    let params = flags.intersects(
        DetailFlags::PARAM_ATTRS | DetailFlags::PARAM_TYPE_NAMES | DetailFlags::PARAM_NAMES,
    );
    if params {
        out.push('(');
        for (i, p) in method.params.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if flags.contains(DetailFlags::PARAM_ATTRS) {
                append_attrs(&mut out, env, "", &p.attrs, flags);
            }
            if flags.contains(DetailFlags::PARAM_TYPE_NAMES) {
                append_type_name(&mut out, env, &p.ty, full, Some(p.direction));
            }
            if flags.contains(DetailFlags::PARAM_NAMES) {
                if !out.is_empty() && flags.contains(DetailFlags::PARAM_TYPE_NAMES) {
                    out.push(' ');
                }
                out.push_str(&p.name);
            }
        }
        out.push(')');
    }

    out
}

/// Attributes of the declaring type and every ancestor declaring type,
/// outermost first.
fn collect_declaring_attrs(env: &TypeEnv, ty: &TypeDef, out: &mut Vec<Attribute>) {
    if let Some(declaring) = ty.declaring.as_ref().and_then(|name| env.resolve(name)) {
        collect_declaring_attrs(env, declaring, out);
    }
    out.extend(ty.attrs.iter().cloned());
}

fn append_attrs(out: &mut String, env: &TypeEnv, label: &str, attrs: &[Attribute], flags: DetailFlags) {
    if attrs.is_empty() {
        return;
    }

    if label.is_empty() {
        out.push('[');
    } else {
        out.push('[');
        out.push_str(label);
        out.push(':');
    }

    let full = flags.contains(DetailFlags::TYPE_FULL_NAMES);
    for (i, attr) in attrs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }

        append_named(out, env, &attr.ty, full);

        let with_args = flags.contains(DetailFlags::ATTR_ARGUMENTS) && !attr.args.is_empty();
        let with_props = flags.contains(DetailFlags::ATTR_PROPERTIES) && !attr.props.is_empty();
        if with_args || with_props {
            out.push('(');
            let mut first = true;
            if with_args {
                for arg in &attr.args {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    append_value(out, env, arg, full);
                }
            }
            if with_props {
                for (name, value) in &attr.props {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    out.push_str(name);
                    out.push('=');
                    append_value(out, env, value, full);
                }
            }
            out.push(')');
        }
    }

    out.push(']');
}

fn append_value(out: &mut String, env: &TypeEnv, value: &AttrValue, full: bool) {
    match value {
        AttrValue::Str(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        AttrValue::Array(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                append_value(out, env, item, full);
            }
            out.push('}');
        }
        AttrValue::Enum { ty, value } => match env.resolve(ty) {
            Some(def) if def.kind == TypeKind::Enum => append_enum(out, env, def, *value, full),
            _ => out.push_str(&value.to_string()),
        },
        AttrValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        AttrValue::Int(v) => out.push_str(&v.to_string()),
        AttrValue::Float(v) => out.push_str(&v.to_string()),
    }
}

/// Render an enum constant: the named member when one matches, a
/// `|`-joined decomposition into named bits for flags enums, or the
/// numeric literal when no exact named cover exists.
fn append_enum(out: &mut String, env: &TypeEnv, def: &TypeDef, value: i64, full: bool) {
    let bits = value as u64;
    if !def.is_flags || bits == 0 {
        if let Some(variant) = def.enum_variants.iter().find(|v| v.value == value) {
            append_named(out, env, &def.name, full);
            out.push('.');
            out.push_str(&variant.name);
        } else {
            out.push_str(&value.to_string());
        }
        return;
    }

    let mut ordered: Vec<_> = def
        .enum_variants
        .iter()
        .filter(|v| v.value != 0)
        .collect();
    ordered.sort_by(|a, b| (b.value as u64).cmp(&(a.value as u64)));

    let mut used = Vec::new();
    let mut remain = bits;
    for variant in ordered {
        let vbits = variant.value as u64;
        if remain & vbits == vbits {
            used.push(variant);
            remain &= !vbits;
            if remain == 0 {
                break;
            }
        }
    }

    if remain != 0 {
        out.push_str(&value.to_string());
        return;
    }

    used.reverse();
    for (i, variant) in used.iter().enumerate() {
        if i > 0 {
            out.push('|');
        }
        append_named(out, env, &def.name, full);
        out.push('.');
        out.push_str(&variant.name);
    }
}

fn append_type_name(
    out: &mut String,
    env: &TypeEnv,
    ty: &TypeRef,
    full: bool,
    direction: Option<ParamDirection>,
) {
    if let Some(elem) = ty.nullable_elem() {
        append_type_name(out, env, elem, full, direction);
        out.push('?');
        return;
    }

    match ty {
        TypeRef::ByRef(elem) => {
            out.push_str(match direction {
                Some(ParamDirection::In) => "in ",
                Some(ParamDirection::Out) => "out ",
                _ => "ref ",
            });
            append_type_name(out, env, elem, full, direction);
        }
        TypeRef::Pointer(elem) => {
            append_type_name(out, env, elem, full, direction);
            out.push('*');
        }
        TypeRef::Array { elem, rank } => {
            append_type_name(out, env, elem, full, direction);
            out.push('[');
            for _ in 1..*rank {
                out.push(',');
            }
            out.push(']');
        }
        TypeRef::GenericInst { base, args } => {
            append_type_name(out, env, base, full, direction);
            out.push('<');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                append_type_name(out, env, arg, full, direction);
            }
            out.push('>');
        }
        TypeRef::Pinned(elem) => {
            out.push_str("pinned(");
            append_type_name(out, env, elem, full, direction);
            out.push(')');
        }
        TypeRef::Modified { elem, .. } => {
            append_type_name(out, env, elem, full, direction);
        }
        TypeRef::FnPointer { params, ret } => {
            out.push_str("fn(");
            for (i, p) in params.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                append_type_name(out, env, p, full, direction);
            }
            out.push_str(")->");
            append_type_name(out, env, ret, full, direction);
        }
        TypeRef::GenericParam(p) => out.push_str(&p.name),
        TypeRef::Primitive(p) => out.push_str(&p.to_string()),
        TypeRef::Named(name) => append_named(out, env, name, full),
    }
}

/// Render a named type: nested types qualify through the declaring chain,
/// top-level types through the namespace.
fn append_named(out: &mut String, env: &TypeEnv, name: &TypeName, full: bool) {
    if full {
        match env.resolve(name).and_then(|def| def.declaring.as_ref()) {
            Some(declaring) => {
                append_named(out, env, declaring, full);
                out.push('.');
            }
            None => {
                if !name.namespace.is_empty() {
                    out.push_str(&name.namespace);
                    out.push('.');
                }
            }
        }
    }
    out.push_str(&name.name);
}

/// Insert a single space between adjacent word-like fragments, never after
/// punctuation.
fn separate(out: &mut String) {
    let Some(c) = out.chars().last() else {
        return;
    };
    const PUNCT: &[char] = &[
        '<', '>', '[', ']', '(', ')', '{', '}', '"', '\'', ':', ',', '.', '=', '|', '?', ' ',
    ];
    if !PUNCT.contains(&c) {
        out.push(' ');
    }
}
