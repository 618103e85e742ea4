//! Minimal SystemVerilog tokenizer.
//!
//! Covers the token classes the parser (`sv::parser`) needs to recognise
//! the constructs named in the semantic-index range-extraction table:
//! identifiers/keywords, numbers, strings, punctuation and the handful of
//! compiler directives (`` `include ``, `` `define ``, and friends) that show
//! up in real source without trying to be a conforming preprocessor.

use crate::sv::source::{BufferId, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword(Keyword),
    Number,
    StringLiteral,
    Directive,
    /// Any single- or multi-character punctuation/operator token.
    Punct,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Module,
    Endmodule,
    Package,
    Endpackage,
    Interface,
    Endinterface,
    Modport,
    Parameter,
    Localparam,
    Typedef,
    Enum,
    Struct,
    Import,
    Export,
    Function,
    Endfunction,
    Task,
    Endtask,
    Class,
    Endclass,
    Extends,
    Genvar,
    Generate,
    Endgenerate,
    Begin,
    End,
    If,
    Else,
    Case,
    Endcase,
    Input,
    Output,
    Inout,
    Logic,
    Bit,
    Wire,
    Reg,
    Int,
    Initial,
    Always,
    AlwaysComb,
    AlwaysFf,
    Assign,
    Virtual,
    Const,
    Static,
}

fn keyword_from_str(s: &str) -> Option<Keyword> {
    use Keyword::*;
    Some(match s {
        "module" => Module,
        "endmodule" => Endmodule,
        "package" => Package,
        "endpackage" => Endpackage,
        "interface" => Interface,
        "endinterface" => Endinterface,
        "modport" => Modport,
        "parameter" => Parameter,
        "localparam" => Localparam,
        "typedef" => Typedef,
        "enum" => Enum,
        "struct" => Struct,
        "import" => Import,
        "export" => Export,
        "function" => Function,
        "endfunction" => Endfunction,
        "task" => Task,
        "endtask" => Endtask,
        "class" => Class,
        "endclass" => Endclass,
        "extends" => Extends,
        "genvar" => Genvar,
        "generate" => Generate,
        "endgenerate" => Endgenerate,
        "begin" => Begin,
        "end" => End,
        "if" => If,
        "else" => Else,
        "case" => Case,
        "endcase" => Endcase,
        "input" => Input,
        "output" => Output,
        "inout" => Inout,
        "logic" => Logic,
        "bit" => Bit,
        "wire" => Wire,
        "reg" => Reg,
        "int" => Int,
        "initial" => Initial,
        "always" => Always,
        "always_comb" => AlwaysComb,
        "always_ff" => AlwaysFf,
        "assign" => Assign,
        "virtual" => Virtual,
        "const" => Const,
        "static" => Static,
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

pub struct Lexer<'a> {
    buffer: BufferId,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(buffer: BufferId, src: &'a str) -> Self {
        Self {
            buffer,
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            if self.pos >= self.bytes.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(self.buffer, start as u32, start as u32),
                    text: String::new(),
                });
                break;
            }
            let c = self.bytes[self.pos];
            if c == b'`' {
                self.pos += 1;
                while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
                    self.pos += 1;
                }
                tokens.push(self.make_token(start, TokenKind::Directive));
                continue;
            }
            if is_ident_start(c) {
                self.pos += 1;
                while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
                    self.pos += 1;
                }
                let text = &self.src[start..self.pos];
                let kind = match keyword_from_str(text) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Identifier,
                };
                tokens.push(self.make_token(start, kind));
                continue;
            }
            if c == b'$' {
                // system task/function name, e.g. $display
                self.pos += 1;
                while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
                    self.pos += 1;
                }
                tokens.push(self.make_token(start, TokenKind::Identifier));
                continue;
            }
            if c.is_ascii_digit() {
                self.pos += 1;
                while self.pos < self.bytes.len()
                    && (self.bytes[self.pos].is_ascii_alphanumeric()
                        || self.bytes[self.pos] == b'_'
                        || self.bytes[self.pos] == b'\'')
                {
                    self.pos += 1;
                }
                tokens.push(self.make_token(start, TokenKind::Number));
                continue;
            }
            if c == b'"' {
                self.pos += 1;
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'"' {
                    if self.bytes[self.pos] == b'\\' {
                        self.pos += 1;
                    }
                    self.pos += 1;
                }
                if self.pos < self.bytes.len() {
                    self.pos += 1; // closing quote
                }
                tokens.push(self.make_token(start, TokenKind::StringLiteral));
                continue;
            }
            // Punctuation: greedily match the longest known multi-char operator.
            let rest = &self.src[self.pos..];
            let punct_len = longest_punct(rest);
            self.pos += punct_len.max(1);
            tokens.push(self.make_token(start, TokenKind::Punct));
        }
        tokens
    }

    fn make_token(&self, start: usize, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span::new(self.buffer, start as u32, self.pos as u32),
            text: self.src[start..self.pos].to_string(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos + 1 < self.bytes.len()
                && self.bytes[self.pos] == b'/'
                && self.bytes[self.pos + 1] == b'/'
            {
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            if self.pos + 1 < self.bytes.len()
                && self.bytes[self.pos] == b'/'
                && self.bytes[self.pos + 1] == b'*'
            {
                self.pos += 2;
                while self.pos + 1 < self.bytes.len()
                    && !(self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/')
                {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.bytes.len());
                continue;
            }
            break;
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

const MULTI_PUNCT: &[&str] = &[
    "::", "<=", ">=", "==", "!=", "&&", "||", "->", "+:", "-:", "**", "<<", ">>", "+=", "-=",
];

fn longest_punct(rest: &str) -> usize {
    for p in MULTI_PUNCT {
        if rest.starts_with(p) {
            return p.len();
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::source::BufferId;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(BufferId::fresh(), src).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_are_distinguished_from_identifiers() {
        assert_eq!(
            kinds("module foo"),
            vec![TokenKind::Keyword(Keyword::Module), TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn scope_resolution_is_a_single_token_not_two_colons() {
        assert_eq!(
            kinds("pkg::item"),
            vec![TokenKind::Identifier, TokenKind::Punct, TokenKind::Identifier, TokenKind::Eof]
        );
        let tokens = Lexer::new(BufferId::fresh(), "pkg::item").tokenize();
        assert_eq!(tokens[1].text, "::");
    }

    #[test]
    fn line_and_block_comments_are_skipped_as_trivia() {
        assert_eq!(
            kinds("module // trailing comment\n/* block */ endmodule"),
            vec![TokenKind::Keyword(Keyword::Module), TokenKind::Keyword(Keyword::Endmodule), TokenKind::Eof]
        );
    }

    #[test]
    fn backtick_directives_become_a_single_directive_token() {
        assert_eq!(kinds("`define FOO"), vec![TokenKind::Directive, TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn every_token_stream_ends_with_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(*kinds("module m; endmodule").last().unwrap(), TokenKind::Eof);
    }
}
