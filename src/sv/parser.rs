//! Recursive-descent parser over the token stream produced by
//! [`crate::sv::lexer`]. Recovers from unexpected tokens by skipping to the
//! next statement boundary rather than aborting, since a single malformed
//! declaration in an overlay buffer must not prevent every other symbol in
//! the file from being indexed.

use crate::sv::ast::*;
use crate::sv::diagnostics::{CompilerDiagnostic, DiagnosticCode, Severity};
use crate::sv::lexer::{Keyword, Token, TokenKind};
use crate::sv::source::{BufferId, Span};

pub struct ParseResult {
    pub unit: CompilationUnit,
    pub diagnostics: Vec<CompilerDiagnostic>,
}

pub fn parse(buffer: BufferId, tokens: Vec<Token>) -> ParseResult {
    let mut parser = Parser {
        buffer,
        tokens,
        pos: 0,
        diagnostics: Vec::new(),
    };
    let unit = parser.parse_unit();
    ParseResult {
        unit,
        diagnostics: parser.diagnostics,
    }
}

struct Parser {
    buffer: BufferId,
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<CompilerDiagnostic>,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.is_eof() {
            self.pos += 1;
        }
        tok
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek().kind, TokenKind::Keyword(k) if k == kw)
    }

    fn at_punct(&self, text: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Punct) && self.peek().text == text
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        if self.at_punct(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, text: &str) {
        if !self.eat_punct(text) {
            self.error_here(
                DiagnosticCode::UnexpectedToken,
                format!("expected '{text}'"),
            );
        }
    }

    fn expect_ident(&mut self) -> Ident {
        if matches!(self.peek().kind, TokenKind::Identifier) {
            let tok = self.advance();
            Ident {
                name: tok.text,
                span: tok.span,
            }
        } else {
            self.error_here(DiagnosticCode::ExpectedIdentifier, "expected identifier");
            let span = self.peek().span;
            Ident {
                name: String::new(),
                span,
            }
        }
    }

    fn error_here(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.diagnostics.push(CompilerDiagnostic::new(
            code,
            Severity::Error,
            message,
            self.peek().span,
        ));
    }

    /// Skip tokens until `;` (consumed) or EOF, used for recovery and for
    /// constructs we deliberately don't model in depth (e.g. struct bodies).
    fn skip_to_semicolon(&mut self) {
        while !self.is_eof() && !self.at_punct(";") {
            if self.at_punct("{") || self.at_punct("(") {
                self.skip_balanced();
                continue;
            }
            self.advance();
        }
        self.eat_punct(";");
    }

    /// Skip a balanced `(...)`, `{...}`, or `[...]` group; cursor must be on
    /// the opening delimiter.
    fn skip_balanced(&mut self) {
        let (open, close) = match self.peek().text.as_str() {
            "(" => ("(", ")"),
            "{" => ("{", "}"),
            "[" => ("[", "]"),
            _ => return,
        };
        let mut depth = 0i32;
        loop {
            if self.is_eof() {
                return;
            }
            if self.at_punct(open) {
                depth += 1;
            } else if self.at_punct(close) {
                depth -= 1;
                if depth == 0 {
                    self.advance();
                    return;
                }
            }
            self.advance();
        }
    }

    fn parse_unit(&mut self) -> CompilationUnit {
        let mut containers = Vec::new();
        while !self.is_eof() {
            if self.at_keyword(Keyword::Module) {
                containers.push(self.parse_container(ContainerKind::Module));
            } else if self.at_keyword(Keyword::Package) {
                containers.push(self.parse_container(ContainerKind::Package));
            } else if self.at_keyword(Keyword::Interface) {
                containers.push(self.parse_container(ContainerKind::Interface));
            } else if matches!(self.peek().kind, TokenKind::Directive) {
                self.advance();
            } else {
                self.advance();
            }
        }
        CompilationUnit { containers }
    }

    fn end_keyword_for(kind: ContainerKind) -> Keyword {
        match kind {
            ContainerKind::Module => Keyword::Endmodule,
            ContainerKind::Package => Keyword::Endpackage,
            ContainerKind::Interface => Keyword::Endinterface,
        }
    }

    fn parse_container(&mut self, kind: ContainerKind) -> ContainerDecl {
        let start = self.peek().span;
        self.advance(); // module/package/interface
        let name = self.expect_ident();

        let parameters = if self.at_punct("#") {
            self.advance();
            self.expect_punct("(");
            self.parse_param_list()
        } else {
            Vec::new()
        };

        let ports = if kind != ContainerKind::Package && self.at_punct("(") {
            self.advance();
            self.parse_ansi_port_list()
        } else {
            Vec::new()
        };

        self.eat_punct(";");

        let end_kw = Self::end_keyword_for(kind);
        let members = self.parse_members(&[end_kw]);

        let end_span = self.peek().span;
        self.eat_keyword(end_kw);
        let end_label = if self.eat_punct(":") {
            Some(self.expect_ident())
        } else {
            None
        };

        ContainerDecl {
            kind,
            name,
            full_span: Span::new(self.buffer, start.start, end_span.end),
            end_label,
            parameters,
            ports,
            members,
        }
    }

    /// Parse a `#( ... )` parameter port list; cursor is just past `(`.
    fn parse_param_list(&mut self) -> Vec<ParamDecl> {
        let mut out = Vec::new();
        while !self.is_eof() && !self.at_punct(")") {
            self.eat_keyword(Keyword::Parameter);
            self.skip_type_tokens();
            let name = self.expect_ident();
            let default = if self.eat_punct("=") {
                Some(self.parse_simple_expr())
            } else {
                None
            };
            out.push(ParamDecl { name, default });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")");
        out
    }

    /// Parse an ANSI port list; cursor is just past `(`.
    fn parse_ansi_port_list(&mut self) -> Vec<PortDecl> {
        let mut out = Vec::new();
        while !self.is_eof() && !self.at_punct(")") {
            self.eat_keyword(Keyword::Input);
            self.eat_keyword(Keyword::Output);
            self.eat_keyword(Keyword::Inout);
            let type_ref = self.try_parse_type_ref();
            // `iface_name.modport_name port_name`: the `.` here is never a
            // member-access expression, so it can't be confused with one.
            let modport = if self.at_punct(".") {
                self.advance();
                Some(self.expect_ident())
            } else {
                None
            };
            self.skip_array_dims();
            let name = self.expect_ident();
            self.skip_array_dims();
            out.push(PortDecl { name, type_ref, modport });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")");
        out
    }

    fn skip_array_dims(&mut self) {
        while self.at_punct("[") {
            self.skip_balanced();
        }
    }

    /// Consume leading type-like keyword tokens (`logic`, `bit`, `signed`,
    /// etc.) without building a `TypeRef`; used where we only care about
    /// skipping past the type to reach a declarator name.
    fn skip_type_tokens(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::Keyword(
                    Keyword::Logic
                    | Keyword::Bit
                    | Keyword::Wire
                    | Keyword::Reg
                    | Keyword::Int
                    | Keyword::Const
                    | Keyword::Static,
                ) => {
                    self.advance();
                }
                _ => break,
            }
        }
        self.skip_array_dims();
    }

    /// Try to read a type reference: `name`, `pkg::name`, or
    /// `pkg::name #( params )`. Returns `None` for built-in keyword types
    /// (`logic`, `bit`, ...), which callers skip separately.
    fn try_parse_type_ref(&mut self) -> Option<TypeRef> {
        match self.peek().kind {
            TokenKind::Keyword(
                Keyword::Logic
                | Keyword::Bit
                | Keyword::Wire
                | Keyword::Reg
                | Keyword::Int
                | Keyword::Const
                | Keyword::Static
                | Keyword::Virtual,
            ) => {
                self.advance();
                None
            }
            TokenKind::Identifier => {
                let first = self.expect_ident();
                let (scope, name) = if self.at_punct("::") {
                    self.advance();
                    let member = self.expect_ident();
                    (Some(first), member)
                } else {
                    (None, first)
                };
                let class_params = if self.at_punct("#") {
                    self.advance();
                    self.expect_punct("(");
                    let mut params = Vec::new();
                    while !self.is_eof() && !self.at_punct(")") {
                        if self.eat_punct(".") {
                            let param_name = self.expect_ident();
                            self.expect_punct("(");
                            let expr = if self.at_punct(")") {
                                Expr::Opaque(self.peek().span)
                            } else {
                                self.parse_simple_expr()
                            };
                            self.expect_punct(")");
                            params.push((Some(param_name), expr));
                        } else {
                            params.push((None, self.parse_simple_expr()));
                        }
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                    self.expect_punct(")");
                    params
                } else {
                    Vec::new()
                };
                Some(TypeRef {
                    scope,
                    name,
                    class_params,
                })
            }
            _ => None,
        }
    }

    /// A deliberately shallow expression parser: enough to recover
    /// identifiers, scoped names, member access and call expressions for
    /// reference tracking, without implementing operator precedence.
    fn parse_simple_expr(&mut self) -> Expr {
        let start = self.peek().span;
        let mut expr = match self.peek().kind {
            TokenKind::Identifier => {
                let id = self.expect_ident();
                if self.at_punct("::") {
                    self.advance();
                    let member = self.expect_ident();
                    if self.at_punct("(") {
                        self.advance();
                        let args = self.parse_call_args();
                        Expr::ClassScopedCall(id, member, args)
                    } else {
                        Expr::Scoped(id, member)
                    }
                } else {
                    Expr::Ident(id)
                }
            }
            _ => {
                let tok = self.advance();
                if self.at_punct("(") || self.at_punct("{") || self.at_punct("[") {
                    self.skip_balanced();
                }
                Expr::Opaque(tok.span)
            }
        };

        loop {
            if self.eat_punct(".") {
                let member = self.expect_ident();
                expr = Expr::Member(Box::new(expr), member);
            } else if self.at_punct("(") {
                self.advance();
                let args = self.parse_call_args();
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }

        // Consume any trailing operator tail up to the statement/list
        // boundary so callers land cleanly on `,`/`;`/`)`.
        while !self.is_eof()
            && !self.at_punct(",")
            && !self.at_punct(";")
            && !self.at_punct(")")
            && !self.at_punct("}")
        {
            if self.at_punct("(") || self.at_punct("{") || self.at_punct("[") {
                self.skip_balanced();
                continue;
            }
            self.advance();
        }
        let _ = start;
        expr
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        while !self.is_eof() && !self.at_punct(")") {
            args.push(self.parse_simple_expr());
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")");
        args
    }

    fn parse_members(&mut self, stop: &[Keyword]) -> Vec<Member> {
        let mut members = Vec::new();
        loop {
            if self.is_eof() {
                break;
            }
            if let TokenKind::Keyword(k) = self.peek().kind {
                if stop.contains(&k) {
                    break;
                }
            }
            if let Some(member) = self.parse_member() {
                members.push(member);
            }
        }
        members
    }

    fn parse_member(&mut self) -> Option<Member> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Parameter) | TokenKind::Keyword(Keyword::Localparam) => {
                self.advance();
                self.skip_type_tokens();
                let name = self.expect_ident();
                let default = if self.eat_punct("=") {
                    Some(self.parse_simple_expr())
                } else {
                    None
                };
                self.skip_to_semicolon();
                Some(Member::Parameter(ParamDecl { name, default }))
            }
            TokenKind::Keyword(Keyword::Typedef) => {
                self.advance();
                if self.eat_keyword(Keyword::Enum) {
                    let values = self.parse_enum_body();
                    let name = self.expect_ident();
                    self.skip_to_semicolon();
                    Some(Member::Enum(EnumDecl {
                        name: Some(name),
                        values,
                    }))
                } else if self.eat_keyword(Keyword::Struct) {
                    self.skip_balanced_after_brace_search();
                    let name = self.expect_ident();
                    self.skip_to_semicolon();
                    Some(Member::Typedef(TypedefDecl {
                        name,
                        type_ref: None,
                    }))
                } else {
                    let type_ref = self.try_parse_type_ref();
                    self.skip_array_dims();
                    let name = self.expect_ident();
                    self.skip_to_semicolon();
                    Some(Member::Typedef(TypedefDecl { name, type_ref }))
                }
            }
            TokenKind::Keyword(Keyword::Enum) => {
                self.advance();
                let values = self.parse_enum_body();
                let name = if matches!(self.peek().kind, TokenKind::Identifier) {
                    Some(self.expect_ident())
                } else {
                    None
                };
                self.skip_to_semicolon();
                Some(Member::Enum(EnumDecl { name, values }))
            }
            TokenKind::Keyword(Keyword::Import) => {
                self.advance();
                let package = self.expect_ident();
                self.expect_punct("::");
                let member = if self.eat_punct("*") {
                    None
                } else {
                    Some(self.expect_ident())
                };
                self.skip_to_semicolon();
                Some(Member::Import(ImportItem { package, member }))
            }
            TokenKind::Keyword(Keyword::Export) => {
                self.advance();
                self.skip_to_semicolon();
                None
            }
            TokenKind::Keyword(Keyword::Function) | TokenKind::Keyword(Keyword::Task) => {
                let is_task = self.at_keyword(Keyword::Task);
                self.advance();
                // optional lifetime / return type
                if !is_task {
                    self.eat_keyword(Keyword::Static);
                    if matches!(self.peek().kind, TokenKind::Identifier)
                        && matches!(self.peek_at(1).kind, TokenKind::Identifier)
                    {
                        self.try_parse_type_ref();
                    } else {
                        self.skip_type_tokens();
                    }
                }
                let name = self.expect_ident();
                let args = if self.eat_punct("(") {
                    self.parse_ansi_port_list()
                } else {
                    Vec::new()
                };
                self.eat_punct(";");
                let stop_kw = if is_task {
                    Keyword::Endtask
                } else {
                    Keyword::Endfunction
                };
                let body = self.parse_members(&[stop_kw]);
                self.eat_keyword(stop_kw);
                let end_label = if self.eat_punct(":") {
                    Some(self.expect_ident())
                } else {
                    None
                };
                Some(Member::Subroutine(SubroutineDecl {
                    is_task,
                    name,
                    args,
                    end_label,
                    body,
                }))
            }
            TokenKind::Keyword(Keyword::Class) => {
                self.advance();
                let name = self.expect_ident();
                let type_params = if self.at_punct("#") {
                    self.advance();
                    self.expect_punct("(");
                    let mut params = Vec::new();
                    while !self.is_eof() && !self.at_punct(")") {
                        self.skip_type_tokens();
                        params.push(self.expect_ident());
                        if self.eat_punct("=") {
                            self.parse_simple_expr();
                        }
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                    self.expect_punct(")");
                    params
                } else {
                    Vec::new()
                };
                let extends = if self.eat_keyword(Keyword::Extends) {
                    self.try_parse_type_ref()
                } else {
                    None
                };
                self.eat_punct(";");
                let members = self.parse_members(&[Keyword::Endclass]);
                self.eat_keyword(Keyword::Endclass);
                let end_label = if self.eat_punct(":") {
                    Some(self.expect_ident())
                } else {
                    None
                };
                Some(Member::Class(ClassDecl {
                    name,
                    type_params,
                    extends,
                    end_label,
                    members,
                }))
            }
            TokenKind::Keyword(Keyword::Genvar) => {
                self.advance();
                let mut names = vec![self.expect_ident()];
                while self.eat_punct(",") {
                    names.push(self.expect_ident());
                }
                self.skip_to_semicolon();
                Some(Member::Genvar(GenvarDecl { names }))
            }
            TokenKind::Keyword(Keyword::Generate) => {
                self.advance();
                let body = self.parse_members(&[Keyword::Endgenerate]);
                self.eat_keyword(Keyword::Endgenerate);
                Some(Member::Generate(GenerateBlock {
                    label: None,
                    condition: None,
                    body,
                    else_branch: None,
                }))
            }
            TokenKind::Keyword(Keyword::If) => {
                self.advance();
                self.expect_punct("(");
                let condition = Some(self.parse_simple_expr());
                let body = self.parse_begin_end_or_single();
                let else_branch = if self.eat_keyword(Keyword::Else) {
                    if self.at_keyword(Keyword::If) {
                        match self.parse_member() {
                            Some(Member::Generate(g)) => Some(Box::new(g)),
                            _ => None,
                        }
                    } else {
                        Some(Box::new(GenerateBlock {
                            label: None,
                            condition: None,
                            body: self.parse_begin_end_or_single(),
                            else_branch: None,
                        }))
                    }
                } else {
                    None
                };
                Some(Member::Generate(GenerateBlock {
                    label: None,
                    condition,
                    body,
                    else_branch,
                }))
            }
            TokenKind::Keyword(Keyword::Begin) => {
                self.advance();
                let label = if self.eat_punct(":") {
                    Some(self.expect_ident())
                } else {
                    None
                };
                let body = self.parse_members(&[Keyword::End]);
                self.eat_keyword(Keyword::End);
                if self.eat_punct(":") {
                    self.expect_ident();
                }
                Some(Member::NamedBlock(NamedBlock { label, body }))
            }
            TokenKind::Keyword(Keyword::Modport) => {
                self.advance();
                let name = self.expect_ident();
                self.expect_punct("(");
                let mut ports = Vec::new();
                while !self.is_eof() && !self.at_punct(")") {
                    self.eat_keyword(Keyword::Input);
                    self.eat_keyword(Keyword::Output);
                    self.eat_keyword(Keyword::Inout);
                    ports.push(ModportPort {
                        name: self.expect_ident(),
                    });
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")");
                self.skip_to_semicolon();
                Some(Member::Modport(ModportDecl { name, ports }))
            }
            TokenKind::Keyword(Keyword::Assign) => {
                self.advance();
                let lhs = self.parse_simple_expr();
                let rhs = if self.eat_punct("=") {
                    Some(self.parse_simple_expr())
                } else {
                    None
                };
                self.eat_punct(";");
                Some(Member::Assign(AssignStmt { lhs, rhs }))
            }
            TokenKind::Keyword(
                Keyword::Initial | Keyword::Always | Keyword::AlwaysComb | Keyword::AlwaysFf,
            ) => {
                self.advance();
                if self.eat_punct("@") {
                    if self.at_punct("(") {
                        self.skip_balanced();
                    } else {
                        self.advance();
                    }
                }
                let body = self.parse_begin_end_or_single();
                Some(Member::ProceduralBlock(body))
            }
            TokenKind::Keyword(Keyword::Virtual) => {
                self.advance();
                None
            }
            TokenKind::Keyword(
                Keyword::Logic | Keyword::Bit | Keyword::Wire | Keyword::Reg | Keyword::Int,
            ) => self.parse_variable_or_instance(),
            TokenKind::Identifier => self.parse_variable_or_instance(),
            TokenKind::Directive => {
                self.advance();
                None
            }
            TokenKind::Eof => None,
            _ => {
                self.advance();
                None
            }
        }
    }

    fn parse_begin_end_or_single(&mut self) -> Vec<Member> {
        if self.at_keyword(Keyword::Begin) {
            match self.parse_member() {
                Some(Member::NamedBlock(b)) => b.body,
                other => other.into_iter().collect(),
            }
        } else {
            self.parse_member().into_iter().collect()
        }
    }

    /// `typedef struct { ... }` bodies aren't indexed as members; skip the
    /// brace group if present.
    fn skip_balanced_after_brace_search(&mut self) {
        while !self.is_eof() && !self.at_punct("{") && !self.at_punct(";") {
            self.advance();
        }
        if self.at_punct("{") {
            self.skip_balanced();
        }
    }

    fn parse_enum_body(&mut self) -> Vec<Ident> {
        self.skip_type_tokens();
        let mut values = Vec::new();
        if self.eat_punct("{") {
            while !self.is_eof() && !self.at_punct("}") {
                values.push(self.expect_ident());
                if self.at_punct("=") {
                    self.advance();
                    self.parse_simple_expr();
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("}");
        }
        values
    }

    /// Disambiguates a `<type> <name>...` sequence between a variable
    /// declaration (`logic [7:0] data;`) and a module instantiation
    /// (`adder #(...) u_adder (.a(x), .b(y));`) by scanning ahead for a `(`
    /// that isn't part of a type's array dimensions before the terminating
    /// `;`.
    fn parse_variable_or_instance(&mut self) -> Option<Member> {
        let checkpoint = self.pos;
        let type_ref = self.try_parse_type_ref();
        self.skip_array_dims();

        if self.at_punct("#") {
            // parameter override on an instantiation: `Adder #(.W(8)) u (...)`
            self.pos = checkpoint;
            return self.parse_instantiation();
        }

        if matches!(self.peek().kind, TokenKind::Identifier)
            && matches!(self.peek_at(1).kind, TokenKind::Punct if self.peek_at(1).text == "(")
        {
            // `name (` right after the type: could be instance or function
            // call statement reusing declarator syntax. We only reach here
            // inside a container body, where a bare call is not legal, so
            // treat it as an instantiation.
            self.pos = checkpoint;
            return self.parse_instantiation();
        }

        if self.at_punct("=") {
            // No declarator name followed the identifier we just consumed as
            // a candidate type: it was actually the lhs of a bare assignment
            // statement (`x = 1;` inside a procedural block).
            if let Some(tr) = &type_ref {
                if tr.scope.is_none() && tr.class_params.is_empty() {
                    let lhs = Expr::Ident(tr.name.clone());
                    self.advance();
                    let rhs = self.parse_simple_expr();
                    self.skip_to_semicolon();
                    return Some(Member::Assign(AssignStmt { lhs, rhs: Some(rhs) }));
                }
            }
        }

        let mut names = Vec::new();
        loop {
            let name = self.expect_ident();
            self.skip_array_dims();
            if self.eat_punct("=") {
                self.parse_simple_expr();
            }
            names.push(name);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.skip_to_semicolon();
        if names.is_empty() {
            None
        } else {
            Some(Member::Variable(VariableDecl { type_ref, names }))
        }
    }

    fn parse_instantiation(&mut self) -> Option<Member> {
        let module_name = self.expect_ident();
        let param_overrides = if self.eat_punct("#") {
            self.expect_punct("(");
            let mut overrides = Vec::new();
            while !self.is_eof() && !self.at_punct(")") {
                if self.eat_punct(".") {
                    let name = self.expect_ident();
                    self.expect_punct("(");
                    let expr = if self.at_punct(")") {
                        None
                    } else {
                        Some(self.parse_simple_expr())
                    };
                    self.expect_punct(")");
                    overrides.push((name, expr));
                } else {
                    self.parse_simple_expr();
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct(")");
            overrides
        } else {
            Vec::new()
        };

        let mut instances = Vec::new();
        loop {
            let name = self.expect_ident();
            self.skip_array_dims();
            let mut connections = Vec::new();
            if self.eat_punct("(") {
                while !self.is_eof() && !self.at_punct(")") {
                    if self.eat_punct(".") {
                        let port_name = self.expect_ident();
                        self.expect_punct("(");
                        let expr = if self.at_punct(")") {
                            None
                        } else {
                            Some(self.parse_simple_expr())
                        };
                        self.expect_punct(")");
                        connections.push(PortConnection { port_name, expr });
                    } else {
                        self.parse_simple_expr();
                    }
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")");
            }
            instances.push(InstanceItem { name, connections });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.skip_to_semicolon();
        Some(Member::Instance(Instantiation {
            module_name,
            param_overrides,
            instances,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::lexer::Lexer;

    fn parse_src(src: &str) -> ParseResult {
        let buffer = BufferId::fresh();
        let tokens = Lexer::new(buffer, src).tokenize();
        parse(buffer, tokens)
    }

    fn only_module(result: &ParseResult) -> &ContainerDecl {
        assert_eq!(result.unit.containers.len(), 1);
        &result.unit.containers[0]
    }

    #[test]
    fn bare_assignment_in_a_procedural_block_parses_as_assign_not_a_declaration() {
        let result = parse_src("module m; logic x; initial x = 1; endmodule");
        let module = only_module(&result);
        assert!(matches!(module.members[0], Member::Variable(_)));
        match &module.members[1] {
            Member::ProceduralBlock(body) => match &body[0] {
                Member::Assign(a) => match &a.lhs {
                    Expr::Ident(id) => assert_eq!(id.name, "x"),
                    other => panic!("expected lhs to be a bare identifier, got {other:?}"),
                },
                other => panic!("expected an assignment, got {other:?}"),
            },
            other => panic!("expected a procedural block, got {other:?}"),
        }
    }

    #[test]
    fn continuous_assign_parses_lhs_and_rhs_as_references() {
        let result = parse_src("module m; wire y; assign y = 1; endmodule");
        let module = only_module(&result);
        match &module.members[1] {
            Member::Assign(a) => {
                assert!(matches!(&a.lhs, Expr::Ident(id) if id.name == "y"));
                assert!(a.rhs.is_some());
            }
            other => panic!("expected an assignment, got {other:?}"),
        }
    }

    #[test]
    fn module_instantiation_is_not_confused_with_a_variable_declaration() {
        let result = parse_src("module top; ALU inst(.a_port(sig)); endmodule");
        let module = only_module(&result);
        match &module.members[0] {
            Member::Instance(inst) => {
                assert_eq!(inst.module_name.name, "ALU");
                assert_eq!(inst.instances[0].name.name, "inst");
                assert_eq!(inst.instances[0].connections[0].port_name.name, "a_port");
            }
            other => panic!("expected an instantiation, got {other:?}"),
        }
    }

    #[test]
    fn typedef_with_a_builtin_base_type_discards_the_base_type_and_binds_the_name() {
        let result = parse_src("package p; typedef logic [7:0] word_t; endpackage");
        let pkg = only_module(&result);
        match &pkg.members[0] {
            Member::Typedef(t) => {
                assert_eq!(t.name.name, "word_t");
                assert!(t.type_ref.is_none());
            }
            other => panic!("expected a typedef, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_port_list_recovers_without_panicking() {
        let result = parse_src("module top( input clk");
        assert!(!result.diagnostics.is_empty());
    }
}
