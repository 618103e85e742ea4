//! Reduced concrete syntax tree for the subset of SystemVerilog this facade
//! understands. Every declarator carries its own [`Span`] separately from
//! the span of the construct that contains it, which is what lets
//! `semantic::index_visitor` implement the name-range-extraction table
//! precisely instead of falling back to whole-node spans.

use crate::sv::source::Span;

#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Module,
    Package,
    Interface,
}

#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub containers: Vec<ContainerDecl>,
}

/// A module, package, or interface declaration. The three share enough
/// structure (named member list, optional end label, optional port list)
/// that keeping one shape avoids a three-way type fork throughout the
/// binder and visitor.
#[derive(Debug, Clone)]
pub struct ContainerDecl {
    pub kind: ContainerKind,
    pub name: Ident,
    pub full_span: Span,
    pub end_label: Option<Ident>,
    pub parameters: Vec<ParamDecl>,
    pub ports: Vec<PortDecl>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: Ident,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct PortDecl {
    pub name: Ident,
    pub type_ref: Option<TypeRef>,
    /// The modport name in `iface_name.modport_name port_name`; `type_ref`
    /// carries the interface name itself. `None` for a data port or an
    /// interface port with no modport qualifier.
    pub modport: Option<Ident>,
}

#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub type_ref: Option<TypeRef>,
    pub names: Vec<Ident>,
}

#[derive(Debug, Clone)]
pub struct TypedefDecl {
    pub name: Ident,
    pub type_ref: Option<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: Option<Ident>,
    pub values: Vec<Ident>,
}

#[derive(Debug, Clone)]
pub struct SubroutineDecl {
    pub is_task: bool,
    pub name: Ident,
    pub args: Vec<PortDecl>,
    pub end_label: Option<Ident>,
    pub body: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub extends: Option<TypeRef>,
    pub end_label: Option<Ident>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct GenvarDecl {
    pub names: Vec<Ident>,
}

#[derive(Debug, Clone)]
pub struct GenerateBlock {
    pub label: Option<Ident>,
    pub condition: Option<Expr>,
    pub body: Vec<Member>,
    pub else_branch: Option<Box<GenerateBlock>>,
}

#[derive(Debug, Clone)]
pub struct NamedBlock {
    pub label: Option<Ident>,
    pub body: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct ModportPort {
    pub name: Ident,
}

#[derive(Debug, Clone)]
pub struct ModportDecl {
    pub name: Ident,
    pub ports: Vec<ModportPort>,
}

/// `import pkg::item;` or `import pkg::*;` (member is `None` for the latter).
#[derive(Debug, Clone)]
pub struct ImportItem {
    pub package: Ident,
    pub member: Option<Ident>,
}

#[derive(Debug, Clone)]
pub struct PortConnection {
    pub port_name: Ident,
    pub expr: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct InstanceItem {
    pub name: Ident,
    pub connections: Vec<PortConnection>,
}

#[derive(Debug, Clone)]
pub struct Instantiation {
    pub module_name: Ident,
    pub param_overrides: Vec<(Ident, Option<Expr>)>,
    pub instances: Vec<InstanceItem>,
}

#[derive(Debug, Clone)]
pub struct AssignStmt {
    pub lhs: Expr,
    pub rhs: Option<Expr>,
}

/// A (possibly scoped, possibly specialised) type reference, e.g. `word_t`,
/// `config_pkg::word_t`, or `Queue #(int)`.
#[derive(Debug, Clone)]
pub struct TypeRef {
    pub scope: Option<Ident>,
    pub name: Ident,
    /// `#(P)` / `#(.NAME(P))` specialisation parameters; name is `None` for
    /// a positional parameter, `Some` for a named override.
    pub class_params: Vec<(Option<Ident>, Expr)>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident(Ident),
    /// `pkg::item`
    Scoped(Ident, Ident),
    /// `base.member`
    Member(Box<Expr>, Ident),
    /// `callee(args)`, callee already resolved to an identifier-shaped expr
    Call(Box<Expr>, Vec<Expr>),
    /// `Class::method(args)`
    ClassScopedCall(Ident, Ident, Vec<Expr>),
    /// Anything we didn't bother modeling precisely (numeric/string literal,
    /// unsupported operator expression); carries only a span for range
    /// validation purposes.
    Opaque(Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Ident(i) => i.span,
            Expr::Scoped(a, b) => Span::new(a.span.buffer, a.span.start, b.span.end),
            Expr::Member(base, member) => {
                Span::new(member.span.buffer, base.span().start, member.span.end)
            }
            Expr::Call(callee, _) => callee.span(),
            Expr::ClassScopedCall(c, _, _) => c.span,
            Expr::Opaque(s) => *s,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Member {
    Parameter(ParamDecl),
    Variable(VariableDecl),
    Typedef(TypedefDecl),
    Enum(EnumDecl),
    Subroutine(SubroutineDecl),
    Class(ClassDecl),
    Genvar(GenvarDecl),
    Generate(GenerateBlock),
    NamedBlock(NamedBlock),
    Modport(ModportDecl),
    Import(ImportItem),
    Instance(Instantiation),
    Assign(AssignStmt),
    /// `initial`/`always*` block: statements flattened to assignments plus
    /// opaque expressions, enough to surface references inside them.
    ProceduralBlock(Vec<Member>),
}
