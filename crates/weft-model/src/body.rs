//! Method bodies
//!
//! A [`Body`] is an ordered sequence of stack-machine instructions stored
//! in an arena with stable [`InstrId`] keys, plus locals and exception
//! regions. Branch operands and region boundaries reference instructions
//! by identity, so weaving can insert and remove instructions without
//! renumbering anything.

use slotmap::SlotMap;
use thiserror::Error;

use crate::ty::TypeRef;

slotmap::new_key_type! {
    /// Stable identity of an instruction within one body.
    pub struct InstrId;
}

/// Index of a local variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub usize);

/// A local variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    /// Slot type
    pub ty: TypeRef,
}

impl Local {
    /// Create a local of the given type.
    pub fn new(ty: TypeRef) -> Self {
        Local { ty }
    }
}

/// A constant operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// Null reference
    Null,
    /// Boolean constant
    Bool(bool),
    /// 32-bit integer constant
    I32(i32),
    /// 64-bit integer constant
    I64(i64),
    /// 64-bit float constant
    F64(f64),
    /// String constant
    Str(String),
}

/// Helpers of the fixed core runtime invoked by woven code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFn {
    /// Rent a pooled argument buffer: pops a length, pushes the buffer
    RentArgs,
    /// Return a rented buffer: pops the buffer
    ReleaseArgs,
    /// Wrap a buffer in a read-only view: pops buffer then length, pushes
    /// the view
    NewArgView,
    /// Resolve a method token to a reflective handle: pops the token,
    /// pushes the handle
    MethodFromToken,
}

/// A call target: declaring type, method name, and the method's own generic
/// instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    /// Declaring type, generic-instantiated when needed
    pub declaring: TypeRef,
    /// Method name
    pub name: String,
    /// Generic arguments of the method itself
    pub method_args: Vec<TypeRef>,
    /// Constructor call
    pub is_ctor: bool,
}

impl MethodSpec {
    /// A non-generic, non-constructor call target.
    pub fn new(declaring: TypeRef, name: impl Into<String>) -> Self {
        MethodSpec {
            declaring,
            name: name.into(),
            method_args: Vec::new(),
            is_ctor: false,
        }
    }
}

/// A stack-machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// No operation; used as a branch/region anchor during weaving
    Nop,
    /// Push a constant
    LoadConst(Const),
    /// Push the receiver
    LoadThis,
    /// Push argument `n`
    LoadArg(usize),
    /// Push the address of argument `n`
    LoadArgAddr(usize),
    /// Push local `n`
    LoadLocal(LocalId),
    /// Push the address of local `n`
    LoadLocalAddr(LocalId),
    /// Pop into local `n`
    StoreLocal(LocalId),
    /// Pop an address, push the value behind it
    LoadIndirect(TypeRef),
    /// Pop value, index and buffer, store value at index
    StoreElem,
    /// Pop a value, push its boxed representation
    Box(TypeRef),
    /// Duplicate the top of stack
    Dup,
    /// Discard the top of stack
    Pop,
    /// Pop a reference; push it back if it is an instance of the type,
    /// else push null
    IsInst(TypeRef),
    /// Unconditional jump
    Branch(InstrId),
    /// Pop a value, jump when false/null/zero
    BranchIfFalse(InstrId),
    /// Exit one or more protected regions toward the target
    Leave(InstrId),
    /// End a finally handler
    EndFinally,
    /// Pop an exception value and raise it
    Throw,
    /// Re-raise the exception being handled
    Rethrow,
    /// Push the token of a method
    LoadMethodToken(MethodSpec),
    /// Call a method; pops receiver (if any) and arguments, pushes the
    /// return value (if any)
    Call(MethodSpec),
    /// Construct an instance; pops arguments, pushes the instance
    NewObj(MethodSpec),
    /// Invoke a core runtime helper
    CallRuntime(RuntimeFn),
    /// Return from the method
    Return,
}

impl Instr {
    /// The branch target, for jump instructions.
    pub fn jump_target(&self) -> Option<InstrId> {
        match self {
            Instr::Branch(t) | Instr::BranchIfFalse(t) | Instr::Leave(t) => Some(*t),
            _ => None,
        }
    }

    /// The local slot this instruction reads or writes, if any.
    pub fn local(&self) -> Option<LocalId> {
        match self {
            Instr::LoadLocal(l) | Instr::LoadLocalAddr(l) | Instr::StoreLocal(l) => Some(*l),
            _ => None,
        }
    }
}

/// What an exception handler does.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerKind {
    /// Catch exceptions of a type (and subtypes)
    Catch(TypeRef),
    /// Run unconditionally on exit
    Finally,
}

/// A protected region over `[try_start, try_end)` with a handler over
/// `[handler_start, handler_end)`. Boundaries are instruction identities in
/// the same body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Handler kind
    pub kind: HandlerKind,
    /// First protected instruction
    pub try_start: InstrId,
    /// First instruction past the protected range
    pub try_end: InstrId,
    /// First handler instruction
    pub handler_start: InstrId,
    /// First instruction past the handler
    pub handler_end: InstrId,
}

/// Structural defects [`Body::validate`] reports.
#[derive(Debug, Error, PartialEq)]
pub enum BodyError {
    /// A jump operand references an instruction not in the body
    #[error("jump target is not part of the body")]
    MissingJumpTarget,

    /// A handler boundary references an instruction not in the body
    #[error("exception handler boundary is not part of the body")]
    MissingHandlerBoundary,

    /// A handler range is inverted
    #[error("exception handler range is inverted")]
    InvertedHandlerRange,

    /// An instruction references a local slot past the local table
    #[error("local slot {index} out of range ({count} locals)")]
    LocalOutOfRange {
        /// Referenced slot
        index: usize,
        /// Number of declared locals
        count: usize,
    },
}

/// An executable method body.
#[derive(Debug, Clone, Default)]
pub struct Body {
    instrs: SlotMap<InstrId, Instr>,
    order: Vec<InstrId>,
    /// Local variable slots
    pub locals: Vec<Local>,
    /// Exception regions, innermost first
    pub handlers: Vec<ExceptionHandler>,
}

impl Body {
    /// Create an empty body.
    pub fn new() -> Self {
        Body::default()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the body has no instructions.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append an instruction, returning its stable identity.
    pub fn push(&mut self, instr: Instr) -> InstrId {
        let id = self.instrs.insert(instr);
        self.order.push(id);
        id
    }

    /// Declare a new local slot.
    pub fn add_local(&mut self, local: Local) -> LocalId {
        self.locals.push(local);
        LocalId(self.locals.len() - 1)
    }

    /// Look up an instruction.
    pub fn get(&self, id: InstrId) -> Option<&Instr> {
        self.instrs.get(id)
    }

    /// Look up an instruction mutably.
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instr> {
        self.instrs.get_mut(id)
    }

    /// Position of an instruction in execution order.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|i| *i == id)
    }

    /// Instruction identities in execution order.
    pub fn ids(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.order.iter().copied()
    }

    /// Instructions in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instr)> + '_ {
        self.order.iter().map(move |id| (*id, &self.instrs[*id]))
    }

    /// Identities referenced by jump operands or handler boundaries.
    fn referenced(&self) -> Vec<InstrId> {
        let mut refs = Vec::new();
        for (_, instr) in self.iter() {
            if let Some(t) = instr.jump_target() {
                refs.push(t);
            }
        }
        for h in &self.handlers {
            refs.extend([h.try_start, h.try_end, h.handler_start, h.handler_end]);
        }
        refs
    }

    /// Remove `Nop` instructions that are neither jump targets nor handler
    /// boundaries. Purely cosmetic compaction after weaving.
    pub fn normalize(&mut self) {
        let referenced = self.referenced();
        let instrs = &mut self.instrs;
        self.order.retain(|id| {
            let keep = !matches!(instrs[*id], Instr::Nop) || referenced.contains(id);
            if !keep {
                instrs.remove(*id);
            }
            keep
        });
    }

    /// Check structural well-formedness: jump targets and handler
    /// boundaries are present, handler ranges are ordered, and local slots
    /// are in range.
    pub fn validate(&self) -> Result<(), BodyError> {
        for (_, instr) in self.iter() {
            if let Some(t) = instr.jump_target() {
                if self.position(t).is_none() {
                    return Err(BodyError::MissingJumpTarget);
                }
            }
            if let Some(LocalId(index)) = instr.local() {
                if index >= self.locals.len() {
                    return Err(BodyError::LocalOutOfRange {
                        index,
                        count: self.locals.len(),
                    });
                }
            }
        }

        for h in &self.handlers {
            let bounds = [h.try_start, h.try_end, h.handler_start, h.handler_end];
            let mut positions = [0usize; 4];
            for (slot, id) in positions.iter_mut().zip(bounds) {
                *slot = self
                    .position(id)
                    .ok_or(BodyError::MissingHandlerBoundary)?;
            }
            if positions[0] > positions[1] || positions[2] > positions[3] {
                return Err(BodyError::InvertedHandlerRange);
            }
        }

        Ok(())
    }
}
