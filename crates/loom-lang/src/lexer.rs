//! Hand-written scanner for Verilog/SystemVerilog.
//!
//! Comments and whitespace are dropped. Compiler directives (`` `include ``,
//! `` `define ``, …) are kept as single tokens so the include scanner can see
//! them. `<=` is lexed once as [`TokenKind::NonBlocking`]; the parser decides
//! from context whether it is an assignment or a comparison.

use crate::ir::SourcePos;

/// Structural keywords the parser cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Module,
    Endmodule,
    Package,
    Endpackage,
    Interface,
    Endinterface,
    Class,
    Endclass,
    Program,
    Endprogram,
    Input,
    Output,
    Inout,
    Ref,
    Parameter,
    Localparam,
    Defparam,
    Always,
    AlwaysComb,
    AlwaysFf,
    AlwaysLatch,
    Initial,
    Begin,
    End,
    Case,
    Casex,
    Casez,
    Endcase,
    Default,
    Unique,
    Priority,
    Generate,
    Endgenerate,
    Import,
    Assign,
    Function,
    Endfunction,
    Task,
    Endtask,
    Wire,
    Reg,
    Logic,
    Bit,
    Byte,
    Int,
    Integer,
    Shortint,
    Longint,
    Real,
    Time,
    Genvar,
    Signed,
    Unsigned,
}

impl Keyword {
    fn lookup(text: &str) -> Option<Self> {
        Some(match text {
            "module" => Self::Module,
            "endmodule" => Self::Endmodule,
            "package" => Self::Package,
            "endpackage" => Self::Endpackage,
            "interface" => Self::Interface,
            "endinterface" => Self::Endinterface,
            "class" => Self::Class,
            "endclass" => Self::Endclass,
            "program" => Self::Program,
            "endprogram" => Self::Endprogram,
            "input" => Self::Input,
            "output" => Self::Output,
            "inout" => Self::Inout,
            "ref" => Self::Ref,
            "parameter" => Self::Parameter,
            "localparam" => Self::Localparam,
            "defparam" => Self::Defparam,
            "always" => Self::Always,
            "always_comb" => Self::AlwaysComb,
            "always_ff" => Self::AlwaysFf,
            "always_latch" => Self::AlwaysLatch,
            "initial" => Self::Initial,
            "begin" => Self::Begin,
            "end" => Self::End,
            "case" => Self::Case,
            "casex" => Self::Casex,
            "casez" => Self::Casez,
            "endcase" => Self::Endcase,
            "default" => Self::Default,
            "unique" => Self::Unique,
            "priority" => Self::Priority,
            "generate" => Self::Generate,
            "endgenerate" => Self::Endgenerate,
            "import" => Self::Import,
            "assign" => Self::Assign,
            "function" => Self::Function,
            "endfunction" => Self::Endfunction,
            "task" => Self::Task,
            "endtask" => Self::Endtask,
            "wire" => Self::Wire,
            "reg" => Self::Reg,
            "logic" => Self::Logic,
            "bit" => Self::Bit,
            "byte" => Self::Byte,
            "int" => Self::Int,
            "integer" => Self::Integer,
            "shortint" => Self::Shortint,
            "longint" => Self::Longint,
            "real" => Self::Real,
            "time" => Self::Time,
            "genvar" => Self::Genvar,
            "signed" => Self::Signed,
            "unsigned" => Self::Unsigned,
            _ => return None,
        })
    }

    /// Keywords that open a net/variable declaration.
    #[must_use]
    pub fn is_data_type(self) -> bool {
        matches!(
            self,
            Self::Wire
                | Self::Reg
                | Self::Logic
                | Self::Bit
                | Self::Byte
                | Self::Int
                | Self::Integer
                | Self::Shortint
                | Self::Longint
                | Self::Real
                | Self::Time
                | Self::Genvar
        )
    }
}

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    /// A backtick compiler directive, e.g. `` `include ``.
    Directive,
    Keyword(Keyword),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Comma,
    Dot,
    Colon,
    ColonColon,
    Hash,
    At,
    Star,
    /// `=` used both for assignment and parameter defaults.
    Assign,
    /// `<=`: non-blocking assignment or comparison; parser reclassifies.
    NonBlocking,
    /// Anything else (operators, punctuation) the parser skips over.
    Other,
    Eof,
}

/// A lexed token with its source text and position.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: SourcePos,
}

/// The scanner.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Lex the whole buffer, ending with an `Eof` token.
    #[must_use]
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if eof {
                break;
            }
        }
        tokens
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, off: usize) -> u8 {
        *self.src.get(self.pos + off).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek();
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.at_end() && self.peek() != b'\n' {
                        self.bump();
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.bump();
                    self.bump();
                    while !self.at_end() {
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.bump();
                            self.bump();
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let pos = SourcePos::new(self.line, self.col);

        if self.at_end() {
            return Token {
                kind: TokenKind::Eof,
                text: String::new(),
                pos,
            };
        }

        let c = self.peek();

        // Identifier or keyword
        if c.is_ascii_alphabetic() || c == b'_' {
            let start = self.pos;
            while !self.at_end()
                && (self.peek().is_ascii_alphanumeric()
                    || self.peek() == b'_'
                    || self.peek() == b'$')
            {
                self.bump();
            }
            let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            let kind = match Keyword::lookup(&text) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident,
            };
            return Token { kind, text, pos };
        }

        // Escaped identifier: backslash to next whitespace
        if c == b'\\' {
            let start = self.pos;
            self.bump();
            while !self.at_end() && !self.peek().is_ascii_whitespace() {
                self.bump();
            }
            let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            return Token {
                kind: TokenKind::Ident,
                text,
                pos,
            };
        }

        // Numbers, including sized/based literals like 8'hFF and 'b01
        if c.is_ascii_digit() || (c == b'\'' && self.peek_at(1).is_ascii_alphabetic()) {
            let start = self.pos;
            while !self.at_end() {
                let p = self.peek();
                if p.is_ascii_alphanumeric() || p == b'\'' || p == b'_' || p == b'.' {
                    self.bump();
                } else {
                    break;
                }
            }
            let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            return Token {
                kind: TokenKind::Number,
                text,
                pos,
            };
        }

        // String literal
        if c == b'"' {
            let start = self.pos;
            self.bump();
            while !self.at_end() && self.peek() != b'"' {
                if self.peek() == b'\\' {
                    self.bump();
                }
                self.bump();
            }
            if !self.at_end() {
                self.bump(); // closing quote
            }
            let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            return Token {
                kind: TokenKind::Str,
                text,
                pos,
            };
        }

        // Compiler directive: backtick + word, kept as one token
        if c == b'`' {
            let start = self.pos;
            self.bump();
            while !self.at_end()
                && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_')
            {
                self.bump();
            }
            let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            return Token {
                kind: TokenKind::Directive,
                text,
                pos,
            };
        }

        // Punctuation and operators
        let kind = match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b';' => TokenKind::Semi,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            b'#' => TokenKind::Hash,
            b'@' => TokenKind::At,
            b'*' => TokenKind::Star,
            b':' => {
                if self.peek_at(1) == b':' {
                    self.bump();
                    self.bump();
                    return Token {
                        kind: TokenKind::ColonColon,
                        text: "::".to_string(),
                        pos,
                    };
                }
                TokenKind::Colon
            }
            b'<' => {
                if self.peek_at(1) == b'=' {
                    self.bump();
                    self.bump();
                    return Token {
                        kind: TokenKind::NonBlocking,
                        text: "<=".to_string(),
                        pos,
                    };
                }
                TokenKind::Other
            }
            b'=' => {
                if self.peek_at(1) == b'=' {
                    self.bump();
                    self.bump();
                    return Token {
                        kind: TokenKind::Other,
                        text: "==".to_string(),
                        pos,
                    };
                }
                TokenKind::Assign
            }
            _ => TokenKind::Other,
        };

        let text = (self.bump() as char).to_string();
        Token { kind, text, pos }
    }
}
