//! Shared fixtures and a minimal evaluator for weaving tests
//!
//! The evaluator runs woven bodies directly: calls to methods with bodies
//! execute recursively, calls to body-less methods (advice stubs, sinks)
//! are recorded in a trace, and the pooled-buffer runtime helpers are
//! counted so tests can assert the rent/release discipline.

#![allow(dead_code)]

use weft_model::module::Accessor;
use weft_model::ty::Primitive;
use weft_model::world::TypeEnv;
use weft_model::{
    AdviceTag, Body, Const, HandlerKind, Instr, InstrId, JoinPoint, MethodDef, MethodSpec, Module,
    Param, PointcutSpec, TypeDef, TypeName, TypeRef, World,
};

pub fn void() -> TypeRef {
    TypeRef::Primitive(Primitive::Void)
}

pub fn int() -> TypeRef {
    TypeRef::Primitive(Primitive::Int32)
}

pub fn str_ty() -> TypeRef {
    TypeRef::Primitive(Primitive::Str)
}

pub fn object() -> TypeRef {
    TypeRef::Primitive(Primitive::Object)
}

/// The fixed core runtime module: exception base, handle and view types.
pub fn core_module() -> Module {
    let mut core = Module::new("weft.core");
    for name in ["Exception", "MethodToken", "ArgView", "Nullable"] {
        core.types.push(TypeDef::new(TypeName::core(name)));
    }
    core
}

/// A world around the core runtime module.
pub fn core_world() -> World {
    World::new(core_module())
}

/// A class deriving from the core exception type.
pub fn exception_class(ns: &str, name: &str) -> TypeDef {
    let mut ty = TypeDef::new(TypeName::new(ns, name));
    ty.base = Some(TypeRef::Named(TypeName::core("Exception")));
    ty
}

/// A static aspect type.
pub fn static_aspect(ns: &str, name: &str) -> TypeDef {
    let mut ty = TypeDef::new(TypeName::new(ns, name));
    ty.is_aspect = true;
    ty.is_static = true;
    ty
}

/// A static advice method with one pattern pointcut.
pub fn advice(name: &str, jp: JoinPoint, pattern: &str) -> MethodDef {
    let mut m = MethodDef::new(name, void());
    m.is_static = true;
    m.advice = Some(AdviceTag {
        join_point: jp,
        unsafe_injection: false,
    });
    m.pointcuts.push(PointcutSpec::new(pattern));
    m
}

/// An accessor-tagged parameter.
pub fn accessor_param(name: &str, ty: TypeRef, accessor: Accessor) -> Param {
    let mut p = Param::new(name, ty);
    p.accessor = Some(accessor);
    p
}

/// A body that calls the body-less `game.Sink::record` (traced), then
/// returns the constant.
pub fn body_record_then_return(value: i32) -> Body {
    let mut body = Body::new();
    body.push(Instr::Call(MethodSpec::new(
        TypeRef::named("game", "Sink"),
        "record",
    )));
    body.push(Instr::LoadConst(Const::I32(value)));
    body.push(Instr::Return);
    body
}

/// A body that constructs and throws an exception of the given type.
pub fn body_throwing(exc: &TypeName) -> Body {
    let mut body = Body::new();
    let mut ctor = MethodSpec::new(TypeRef::Named(exc.clone()), "new");
    ctor.is_ctor = true;
    body.push(Instr::NewObj(ctor));
    body.push(Instr::Throw);
    body
}

/// The trace sink type: body-less methods record invocations.
pub fn sink_type() -> TypeDef {
    let mut ty = TypeDef::new(TypeName::new("game", "Sink"));
    let mut record = MethodDef::new("record", void());
    record.is_static = true;
    ty.methods.push(record);
    ty
}

/// A runtime value in the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Obj(TypeName),
    Buffer(usize),
    View(usize),
    Token(String),
    Handle(String),
    ArgAddr(usize),
    LocalAddr(usize),
}

impl Value {
    fn is_falsy(&self) -> bool {
        matches!(self, Value::Null | Value::Bool(false) | Value::I32(0))
    }

    fn text(&self) -> String {
        match self {
            Value::Unit => "()".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::Obj(ty) => ty.to_string(),
            Value::Buffer(_) => "buf".to_string(),
            Value::View(_) => "args".to_string(),
            Value::Token(name) => format!("token:{name}"),
            Value::Handle(name) => format!("&{name}"),
            Value::ArgAddr(i) => format!("arg@{i}"),
            Value::LocalAddr(i) => format!("local@{i}"),
        }
    }
}

/// Pending control transfer while finally handlers run.
enum Pending {
    Leave(usize, Vec<usize>),
    Unwind(Value, Vec<usize>, Option<usize>),
}

/// Stack-machine evaluator over a module and its world.
pub struct Machine<'a> {
    pub module: &'a Module,
    pub world: &'a World,
    /// Recorded body-less calls and constructions, in execution order
    pub trace: Vec<String>,
    pub rents: usize,
    pub releases: usize,
    buffers: Vec<Option<Vec<Value>>>,
}

impl<'a> Machine<'a> {
    pub fn new(module: &'a Module, world: &'a World) -> Self {
        Machine {
            module,
            world,
            trace: Vec::new(),
            rents: 0,
            releases: 0,
            buffers: Vec::new(),
        }
    }

    /// Invoke a method by declaring type and name. `Err` carries a thrown
    /// exception value.
    pub fn call(
        &mut self,
        ty: &TypeName,
        method: &str,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, Value> {
        let (owner, def) = self
            .lookup(ty, method)
            .unwrap_or_else(|| panic!("method {ty}::{method} not found"));
        self.invoke(owner, def, this, args)
    }

    fn lookup(&self, ty: &TypeName, method: &str) -> Option<(&'a TypeDef, &'a MethodDef)> {
        let env = TypeEnv::new(self.module, self.world);
        let owner = env.resolve(ty)?;
        let def = owner.method(method)?;
        Some((owner, def))
    }

    fn invoke(
        &mut self,
        owner: &'a TypeDef,
        def: &'a MethodDef,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, Value> {
        match &def.body {
            Some(body) => self.exec(body, def, this, args),
            None => {
                let rendered = args.iter().map(Value::text).collect::<Vec<_>>().join(",");
                self.trace
                    .push(format!("{}::{}({rendered})", owner.name.name, def.name));
                Ok(Value::Unit)
            }
        }
    }

    fn exec(
        &mut self,
        body: &'a Body,
        def: &'a MethodDef,
        this: Option<Value>,
        mut args: Vec<Value>,
    ) -> Result<Value, Value> {
        let order: Vec<InstrId> = body.ids().collect();
        let pos = |id: InstrId| -> usize {
            order
                .iter()
                .position(|i| *i == id)
                .expect("jump target present")
        };

        let mut locals = vec![Value::Unit; body.locals.len()];
        let mut stack: Vec<Value> = Vec::new();
        let mut control: Vec<Pending> = Vec::new();
        let mut current_exn: Option<Value> = None;
        let mut pc = 0usize;

        loop {
            assert!(pc < order.len(), "fell off the end of {}", def.name);
            let instr = body.get(order[pc]).expect("instruction present");
            match instr {
                Instr::Nop => pc += 1,
                Instr::LoadConst(c) => {
                    stack.push(match c {
                        Const::Null => Value::Null,
                        Const::Bool(b) => Value::Bool(*b),
                        Const::I32(v) => Value::I32(*v),
                        Const::I64(v) => Value::I64(*v),
                        Const::F64(v) => Value::F64(*v),
                        Const::Str(s) => Value::Str(s.clone()),
                    });
                    pc += 1;
                }
                Instr::LoadThis => {
                    stack.push(this.clone().expect("receiver present"));
                    pc += 1;
                }
                Instr::LoadArg(i) => {
                    stack.push(args[*i].clone());
                    pc += 1;
                }
                Instr::LoadArgAddr(i) => {
                    stack.push(Value::ArgAddr(*i));
                    pc += 1;
                }
                Instr::LoadLocal(l) => {
                    stack.push(locals[l.0].clone());
                    pc += 1;
                }
                Instr::LoadLocalAddr(l) => {
                    stack.push(Value::LocalAddr(l.0));
                    pc += 1;
                }
                Instr::StoreLocal(l) => {
                    locals[l.0] = stack.pop().expect("value to store");
                    pc += 1;
                }
                Instr::LoadIndirect(_) => {
                    let v = match stack.pop().expect("address") {
                        Value::ArgAddr(i) => args[i].clone(),
                        Value::LocalAddr(i) => locals[i].clone(),
                        v => v,
                    };
                    stack.push(v);
                    pc += 1;
                }
                Instr::StoreElem => {
                    let value = stack.pop().expect("element value");
                    let index = match stack.pop() {
                        Some(Value::I32(i)) => i as usize,
                        other => panic!("element index, got {other:?}"),
                    };
                    let buffer = match stack.pop() {
                        Some(Value::Buffer(id)) => id,
                        other => panic!("buffer, got {other:?}"),
                    };
                    self.buffers[buffer].as_mut().expect("live buffer")[index] = value;
                    pc += 1;
                }
                Instr::Box(_) => pc += 1,
                Instr::Dup => {
                    let top = stack.last().expect("value to dup").clone();
                    stack.push(top);
                    pc += 1;
                }
                Instr::Pop => {
                    stack.pop().expect("value to pop");
                    pc += 1;
                }
                Instr::IsInst(ty) => {
                    let v = stack.pop().expect("value to test");
                    if self.is_instance(&v, ty) {
                        stack.push(v);
                    } else {
                        stack.push(Value::Null);
                    }
                    pc += 1;
                }
                Instr::Branch(t) => pc = pos(*t),
                Instr::BranchIfFalse(t) => {
                    let v = stack.pop().expect("condition");
                    pc = if v.is_falsy() { pos(*t) } else { pc + 1 };
                }
                Instr::Leave(t) => {
                    let target = pos(*t);
                    let mut finallies: Vec<usize> = Vec::new();
                    for h in &body.handlers {
                        if h.kind != HandlerKind::Finally {
                            continue;
                        }
                        let (ts, te) = (pos(h.try_start), pos(h.try_end));
                        if ts <= pc && pc < te && !(ts <= target && target < te) {
                            finallies.push(pos(h.handler_start));
                        }
                    }
                    stack.clear();
                    match finallies.split_first() {
                        Some((first, rest)) => {
                            control.push(Pending::Leave(target, rest.to_vec()));
                            pc = *first;
                        }
                        None => pc = target,
                    }
                }
                Instr::EndFinally => match control.pop() {
                    Some(Pending::Leave(target, mut rest)) => {
                        if rest.is_empty() {
                            pc = target;
                        } else {
                            let next = rest.remove(0);
                            control.push(Pending::Leave(target, rest));
                            pc = next;
                        }
                    }
                    Some(Pending::Unwind(exn, mut rest, catch)) => {
                        if let Some(next) = (!rest.is_empty()).then(|| rest.remove(0)) {
                            control.push(Pending::Unwind(exn, rest, catch));
                            pc = next;
                        } else if let Some(catch) = catch {
                            stack.clear();
                            stack.push(exn.clone());
                            current_exn = Some(exn);
                            pc = catch;
                        } else {
                            return Err(exn);
                        }
                    }
                    None => panic!("endfinally outside a handler"),
                },
                Instr::Throw => {
                    let exn = stack.pop().expect("exception to throw");
                    match self.dispatch(body, &pos, pc, exn, &mut stack, &mut control) {
                        Dispatch::Continue(next, entered) => {
                            if let Some(exn) = entered {
                                current_exn = Some(exn);
                            }
                            pc = next;
                        }
                        Dispatch::Propagate(exn) => return Err(exn),
                    }
                }
                Instr::Rethrow => {
                    let exn = current_exn.clone().expect("active exception");
                    match self.dispatch(body, &pos, pc, exn, &mut stack, &mut control) {
                        Dispatch::Continue(next, entered) => {
                            if let Some(exn) = entered {
                                current_exn = Some(exn);
                            }
                            pc = next;
                        }
                        Dispatch::Propagate(exn) => return Err(exn),
                    }
                }
                Instr::LoadMethodToken(spec) => {
                    stack.push(Value::Token(spec.name.clone()));
                    pc += 1;
                }
                Instr::Call(spec) => {
                    match self.call_spec(spec, &mut stack, &mut args) {
                        Ok(()) => pc += 1,
                        Err(exn) => {
                            match self.dispatch(body, &pos, pc, exn, &mut stack, &mut control) {
                                Dispatch::Continue(next, entered) => {
                                    if let Some(exn) = entered {
                                        current_exn = Some(exn);
                                    }
                                    pc = next;
                                }
                                Dispatch::Propagate(exn) => return Err(exn),
                            }
                        }
                    }
                }
                Instr::NewObj(spec) => {
                    let ty = declaring_name(&spec.declaring);
                    let count = self
                        .lookup(&ty, &spec.name)
                        .map(|(_, def)| def.params.len())
                        .unwrap_or(0);
                    let popped = stack.split_off(stack.len() - count);
                    let rendered = popped.iter().map(Value::text).collect::<Vec<_>>().join(",");
                    self.trace.push(format!("new {}({rendered})", ty.name));
                    stack.push(Value::Obj(ty));
                    pc += 1;
                }
                Instr::CallRuntime(f) => {
                    match f {
                        weft_model::RuntimeFn::RentArgs => {
                            let len = match stack.pop() {
                                Some(Value::I32(v)) => v as usize,
                                other => panic!("buffer length, got {other:?}"),
                            };
                            self.rents += 1;
                            self.buffers.push(Some(vec![Value::Unit; len]));
                            stack.push(Value::Buffer(self.buffers.len() - 1));
                        }
                        weft_model::RuntimeFn::ReleaseArgs => {
                            let id = match stack.pop() {
                                Some(Value::Buffer(id)) => id,
                                other => panic!("buffer to release, got {other:?}"),
                            };
                            assert!(self.buffers[id].take().is_some(), "double release");
                            self.releases += 1;
                        }
                        weft_model::RuntimeFn::NewArgView => {
                            let id = match stack.pop() {
                                Some(Value::Buffer(id)) => id,
                                other => panic!("buffer for view, got {other:?}"),
                            };
                            match stack.pop() {
                                Some(Value::I32(_)) => {}
                                other => panic!("view length, got {other:?}"),
                            }
                            stack.push(Value::View(id));
                        }
                        weft_model::RuntimeFn::MethodFromToken => {
                            let name = match stack.pop() {
                                Some(Value::Token(name)) => name,
                                other => panic!("method token, got {other:?}"),
                            };
                            stack.push(Value::Handle(name));
                        }
                    }
                    pc += 1;
                }
                Instr::Return => {
                    return Ok(if def.has_return() {
                        stack.pop().expect("return value")
                    } else {
                        Value::Unit
                    });
                }
            }
        }
    }

    fn call_spec(
        &mut self,
        spec: &MethodSpec,
        stack: &mut Vec<Value>,
        caller_args: &mut [Value],
    ) -> Result<(), Value> {
        let ty = declaring_name(&spec.declaring);
        let (owner, def) = self
            .lookup(&ty, &spec.name)
            .unwrap_or_else(|| panic!("call target {ty}::{} not found", spec.name));

        // Dereference argument addresses for traced (body-less) callees so
        // tests observe live values.
        let count = def.params.len();
        let mut popped = stack.split_off(stack.len() - count);
        if def.body.is_none() {
            for v in popped.iter_mut() {
                if let Value::ArgAddr(i) = v {
                    *v = caller_args[*i].clone();
                }
            }
        }
        let this = def.has_this().then(|| stack.pop().expect("receiver"));

        let result = self.invoke(owner, def, this, popped)?;
        if def.has_return() {
            stack.push(result);
        }
        Ok(())
    }

    fn is_instance(&self, value: &Value, ty: &TypeRef) -> bool {
        if matches!(ty, TypeRef::Primitive(Primitive::Object)) {
            return true;
        }
        let Value::Obj(name) = value else {
            return false;
        };
        let env = TypeEnv::new(self.module, self.world);
        env.is_compatible(&TypeRef::Named(name.clone()), ty)
    }

    /// Find the handlers for an exception at `pc`: finally handlers on the
    /// way to the first matching catch, in region order.
    fn dispatch(
        &mut self,
        body: &'a Body,
        pos: &dyn Fn(InstrId) -> usize,
        pc: usize,
        exn: Value,
        stack: &mut Vec<Value>,
        control: &mut Vec<Pending>,
    ) -> Dispatch {
        let mut finallies: Vec<usize> = Vec::new();
        let mut catch = None;
        for h in &body.handlers {
            let (ts, te) = (pos(h.try_start), pos(h.try_end));
            if !(ts <= pc && pc < te) {
                continue;
            }
            match &h.kind {
                HandlerKind::Catch(ty) if self.is_instance(&exn, ty) => {
                    catch = Some(pos(h.handler_start));
                    break;
                }
                HandlerKind::Catch(_) => {}
                HandlerKind::Finally => finallies.push(pos(h.handler_start)),
            }
        }

        match (finallies.split_first(), catch) {
            (Some((first, rest)), _) => {
                stack.clear();
                control.push(Pending::Unwind(exn, rest.to_vec(), catch));
                Dispatch::Continue(*first, None)
            }
            (None, Some(handler)) => {
                stack.clear();
                stack.push(exn.clone());
                Dispatch::Continue(handler, Some(exn))
            }
            (None, None) => Dispatch::Propagate(exn),
        }
    }
}

enum Dispatch {
    /// Continue at this position; `Some` when a catch handler was entered
    Continue(usize, Option<Value>),
    Propagate(Value),
}

fn declaring_name(ty: &TypeRef) -> TypeName {
    match ty {
        TypeRef::Named(name) => name.clone(),
        TypeRef::GenericInst { base, .. } => declaring_name(base),
        other => panic!("call target declaring type {other:?}"),
    }
}
