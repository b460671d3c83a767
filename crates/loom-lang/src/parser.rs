//! Heuristic structural parser for Verilog/SystemVerilog.
//!
//! Single pass, no backtracking beyond bounded lookahead. Instantiations are
//! detected by shape (`IDENT IDENT (` and `IDENT #( … ) IDENT (`), and
//! anything unrecognized is skipped until the next structural keyword with a
//! diagnostic where the input is clearly malformed.

use crate::ir::{
    AlwaysBlock, AlwaysKind, Assignment, CaseKind, CaseStatement, DesignUnit,
    DesignUnitKind, Diagnostic, GenerateBlock, ImportDecl, Instantiation,
    LabeledBlock, ParamDecl, ParseResult, PortDecl, PortDir, SignalDecl,
    SourcePos,
};
use crate::lexer::{Keyword, Token, TokenKind};

/// The structural parser.
pub struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    file: String,
    units: Vec<DesignUnit>,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    #[must_use]
    pub fn new(tokens: Vec<Token>, file: &str) -> Self {
        Self {
            tokens,
            idx: 0,
            file: file.to_string(),
            units: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Parse the token stream into design units and diagnostics.
    #[must_use]
    pub fn parse(mut self) -> ParseResult {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Keyword(kw) => {
                    if let Some((unit_kind, end_kw)) = unit_keywords(kw) {
                        self.parse_unit(unit_kind, end_kw, 0);
                    } else {
                        self.advance();
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }

        ParseResult {
            units: self.units,
            diagnostics: self.diagnostics,
        }
    }

    // ---- token plumbing ----

    fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, off: usize) -> &Token {
        &self.tokens[(self.idx + off).min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> &Token {
        let i = self.idx.min(self.tokens.len() - 1);
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        } else {
            self.idx = self.tokens.len() - 1;
        }
        &self.tokens[i]
    }

    fn pos(&self) -> SourcePos {
        self.peek().pos
    }

    fn diag(&mut self, message: impl Into<String>, pos: SourcePos) {
        self.diagnostics.push(Diagnostic {
            message: message.into(),
            file: self.file.clone(),
            line: pos.line,
            col: pos.col,
        });
    }

    fn skip_to_semi(&mut self) {
        while !self.at_end() {
            if self.peek_kind() == TokenKind::Semi {
                self.advance();
                return;
            }
            // Stop at structural keywords so recovery never eats an end.
            if let TokenKind::Keyword(kw) = self.peek_kind() {
                if is_structural(kw) {
                    return;
                }
            }
            self.advance();
        }
    }

    /// Skip a balanced `( … )` group; assumes the current token is `(`.
    fn skip_parens(&mut self) {
        if self.peek_kind() != TokenKind::LParen {
            return;
        }
        let mut depth = 0usize;
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                    continue;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ---- design units ----

    fn parse_unit(&mut self, kind: DesignUnitKind, end_kw: Keyword, depth: u32) {
        let pos = self.pos();
        self.advance(); // unit keyword

        let name = match self.peek_kind() {
            TokenKind::Ident => self.advance().text.clone(),
            _ => {
                self.diag(format!("expected name after {kind:?} keyword"), self.pos());
                self.skip_until_end_keyword(end_kw);
                return;
            }
        };

        let mut unit = DesignUnit::new(kind, name, depth, pos);

        // SV allows imports between the name and the port list.
        while self.peek_kind() == TokenKind::Keyword(Keyword::Import) {
            self.parse_import(&mut unit);
        }

        // #( … ) parameter list
        if self.peek_kind() == TokenKind::Hash && self.peek_at(1).kind == TokenKind::LParen {
            self.advance(); // '#'
            self.parse_param_list(&mut unit);
        }

        // ( … ) port list
        if self.peek_kind() == TokenKind::LParen {
            self.parse_port_list(&mut unit);
        }

        // Header terminator
        if self.peek_kind() == TokenKind::Semi {
            self.advance();
        }

        self.parse_unit_body(&mut unit, end_kw);
        self.units.push(unit);
    }

    fn skip_until_end_keyword(&mut self, end_kw: Keyword) {
        while !self.at_end() {
            if self.peek_kind() == TokenKind::Keyword(end_kw) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    #[allow(clippy::too_many_lines)]
    fn parse_unit_body(&mut self, unit: &mut DesignUnit, end_kw: Keyword) {
        // Stack of open `begin [: label]` blocks for label pairing.
        let mut begin_stack: Vec<(String, SourcePos)> = Vec::new();

        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Keyword(kw) if kw == end_kw => {
                    unit.end_line = self.pos().line;
                    self.advance();
                    // Optional `: name` after the end keyword.
                    if self.peek_kind() == TokenKind::Colon
                        && self.peek_at(1).kind == TokenKind::Ident
                    {
                        self.advance();
                        self.advance();
                    }
                    return;
                }
                TokenKind::Keyword(kw) => {
                    if let Some((nested_kind, nested_end)) = unit_keywords(kw) {
                        self.parse_unit(nested_kind, nested_end, unit.depth + 1);
                        continue;
                    }
                    match kw {
                        Keyword::Import => self.parse_import(unit),
                        Keyword::Parameter | Keyword::Localparam => {
                            self.parse_param_decl(unit, kw == Keyword::Localparam);
                        }
                        Keyword::Defparam => {
                            unit.has_defparam = true;
                            self.advance();
                            self.skip_to_semi();
                        }
                        Keyword::Always
                        | Keyword::AlwaysComb
                        | Keyword::AlwaysFf
                        | Keyword::AlwaysLatch => self.parse_always(unit),
                        Keyword::Initial => {
                            self.advance();
                            self.skip_statement_or_block();
                        }
                        Keyword::Unique | Keyword::Priority => {
                            let is_unique = kw == Keyword::Unique;
                            self.advance();
                            if let TokenKind::Keyword(ck) = self.peek_kind() {
                                if case_kind(ck).is_some() {
                                    self.parse_case(unit, is_unique, !is_unique);
                                    continue;
                                }
                            }
                        }
                        Keyword::Case | Keyword::Casex | Keyword::Casez => {
                            self.parse_case(unit, false, false);
                        }
                        Keyword::Generate => self.parse_generate(unit),
                        Keyword::Endgenerate => {
                            self.advance();
                        }
                        Keyword::Begin => {
                            let pos = self.pos();
                            self.advance();
                            let label = self.take_block_label();
                            begin_stack.push((label, pos));
                        }
                        Keyword::End => {
                            self.advance();
                            let end_label = self.take_block_label();
                            if let Some((begin_label, pos)) = begin_stack.pop() {
                                if !begin_label.is_empty() || !end_label.is_empty() {
                                    let labels_match = end_label.is_empty()
                                        || begin_label == end_label;
                                    unit.labeled_blocks.push(LabeledBlock {
                                        begin_label,
                                        end_label,
                                        labels_match,
                                        pos,
                                    });
                                }
                            }
                        }
                        Keyword::Function => {
                            self.skip_until_end_keyword(Keyword::Endfunction);
                        }
                        Keyword::Task => {
                            self.skip_until_end_keyword(Keyword::Endtask);
                        }
                        Keyword::Assign => {
                            self.advance();
                            self.skip_to_semi();
                        }
                        Keyword::Input | Keyword::Output | Keyword::Inout | Keyword::Ref => {
                            self.parse_body_port_decl(unit);
                        }
                        _ if kw.is_data_type() => self.parse_signal_decl(unit),
                        _ => {
                            self.advance();
                        }
                    }
                }
                TokenKind::Ident => {
                    if !self.try_parse_instantiation(unit) {
                        self.advance();
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }

        // Ran out of tokens without the closing keyword.
        self.diag(
            format!("unterminated {:?} '{}'", unit.kind, unit.name),
            unit.pos,
        );
        unit.end_line = self.pos().line;
    }

    /// Consume `: label` after `begin`/`end` if present.
    fn take_block_label(&mut self) -> String {
        if self.peek_kind() == TokenKind::Colon && self.peek_at(1).kind == TokenKind::Ident {
            self.advance();
            return self.advance().text.clone();
        }
        String::new()
    }

    // ---- header lists ----

    fn parse_param_list(&mut self, unit: &mut DesignUnit) {
        // Current token is '('.
        self.advance();
        loop {
            match self.peek_kind() {
                TokenKind::RParen => {
                    self.advance();
                    return;
                }
                TokenKind::Eof => return,
                _ => {}
            }
            self.parse_param_entry(unit, false, &[TokenKind::Comma, TokenKind::RParen]);
            if self.peek_kind() == TokenKind::Comma {
                self.advance();
            }
        }
    }

    /// Parse one `[parameter] [type] NAME [= default]` entry, stopping before
    /// any of `stops` at bracket/paren depth zero.
    fn parse_param_entry(&mut self, unit: &mut DesignUnit, localparam: bool, stops: &[TokenKind]) {
        if self.peek_kind() == TokenKind::Keyword(Keyword::Parameter) {
            self.advance();
        }

        let mut name = String::new();
        let mut pos = self.pos();
        let mut default = String::new();
        let mut in_default = false;
        let mut depth = 0usize;

        while !self.at_end() {
            let kind = self.peek_kind();
            if depth == 0 && stops.contains(&kind) {
                break;
            }
            match kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                }
                TokenKind::Assign if depth == 0 => {
                    in_default = true;
                    self.advance();
                    continue;
                }
                TokenKind::Ident if !in_default => {
                    name = self.peek().text.clone();
                    pos = self.pos();
                }
                _ => {}
            }
            if in_default {
                append_text(&mut default, &self.peek().text);
            }
            self.advance();
        }

        if !name.is_empty() {
            unit.params.push(ParamDecl {
                name,
                default_text: default,
                is_localparam: localparam,
                pos,
            });
        }
    }

    fn parse_port_list(&mut self, unit: &mut DesignUnit) {
        // Current token is '('.
        self.advance();
        let mut direction = PortDir::Input;
        let mut carried_type = String::new();

        loop {
            match self.peek_kind() {
                TokenKind::RParen => {
                    self.advance();
                    return;
                }
                TokenKind::Eof => return,
                TokenKind::Comma => {
                    self.advance();
                    continue;
                }
                _ => {}
            }

            if let Some(dir) = direction_keyword(self.peek_kind()) {
                direction = dir;
                carried_type.clear();
                self.advance();
                continue;
            }

            // Gather the tokens of one port entry up to a top-level ',' / ')'.
            let mut type_text = String::new();
            let mut name = String::new();
            let mut pos = self.pos();
            let mut depth = 0usize;

            while !self.at_end() {
                let kind = self.peek_kind();
                if depth == 0 && matches!(kind, TokenKind::Comma | TokenKind::RParen) {
                    break;
                }
                match kind {
                    TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                    TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                        depth = depth.saturating_sub(1);
                    }
                    TokenKind::Assign if depth == 0 => {
                        // Default value: not part of the type or name.
                        self.advance();
                        continue;
                    }
                    TokenKind::Ident => {
                        // Previous candidate was part of the type after all.
                        if !name.is_empty() {
                            append_text(&mut type_text, &name);
                        }
                        name = self.peek().text.clone();
                        pos = self.pos();
                        self.advance();
                        continue;
                    }
                    _ => {}
                }
                if name.is_empty() {
                    append_text(&mut type_text, &self.peek().text);
                }
                self.advance();
            }

            if !name.is_empty() {
                if !type_text.is_empty() {
                    carried_type = type_text.clone();
                }
                unit.ports.push(PortDecl {
                    name,
                    direction,
                    type_text: if type_text.is_empty() {
                        carried_type.clone()
                    } else {
                        type_text
                    },
                    pos,
                });
            }
        }
    }

    /// Non-ANSI `input [3:0] a, b;` declarations inside the body.
    fn parse_body_port_decl(&mut self, unit: &mut DesignUnit) {
        let direction = direction_keyword(self.peek_kind()).unwrap_or(PortDir::Input);
        self.advance();

        let mut type_text = String::new();
        let mut depth = 0usize;

        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Semi => {
                    self.advance();
                    return;
                }
                TokenKind::LBracket => {
                    depth += 1;
                    append_text(&mut type_text, &self.peek().text);
                    self.advance();
                }
                TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    append_text(&mut type_text, &self.peek().text);
                    self.advance();
                }
                TokenKind::Keyword(kw)
                    if kw.is_data_type()
                        || kw == Keyword::Signed
                        || kw == Keyword::Unsigned =>
                {
                    append_text(&mut type_text, &self.peek().text);
                    self.advance();
                }
                TokenKind::Ident if depth == 0 => {
                    let name = self.peek().text.clone();
                    let pos = self.pos();
                    self.advance();
                    // Refine an ANSI-less header port, or append a new one.
                    if let Some(port) = unit.ports.iter_mut().find(|p| p.name == name) {
                        port.direction = direction;
                        port.type_text = type_text.clone();
                    } else {
                        unit.ports.push(PortDecl {
                            name,
                            direction,
                            type_text: type_text.clone(),
                            pos,
                        });
                    }
                }
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::Keyword(kw) if is_structural(kw) => return,
                _ => {
                    if depth > 0 {
                        append_text(&mut type_text, &self.peek().text);
                    }
                    self.advance();
                }
            }
        }
    }

    // ---- declarations ----

    fn parse_param_decl(&mut self, unit: &mut DesignUnit, localparam: bool) {
        self.advance(); // parameter / localparam
        loop {
            self.parse_param_entry(unit, localparam, &[TokenKind::Comma, TokenKind::Semi]);
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::Semi => {
                    self.advance();
                    return;
                }
                _ => return,
            }
        }
    }

    fn parse_signal_decl(&mut self, unit: &mut DesignUnit) {
        let mut type_text = String::new();
        let mut bracket_depth = 0usize;

        // Leading type keywords and packed dimensions.
        loop {
            match self.peek_kind() {
                TokenKind::Keyword(kw)
                    if kw.is_data_type()
                        || kw == Keyword::Signed
                        || kw == Keyword::Unsigned =>
                {
                    append_text(&mut type_text, &self.peek().text);
                    self.advance();
                }
                TokenKind::LBracket => {
                    bracket_depth += 1;
                    append_text(&mut type_text, &self.peek().text);
                    self.advance();
                }
                TokenKind::RBracket => {
                    bracket_depth = bracket_depth.saturating_sub(1);
                    append_text(&mut type_text, &self.peek().text);
                    self.advance();
                }
                _ if bracket_depth > 0 => {
                    append_text(&mut type_text, &self.peek().text);
                    self.advance();
                }
                _ => break,
            }
        }

        // Names, skipping unpacked dims and initializers.
        let mut depth = 0usize;
        let mut after_eq = false;
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::Comma if depth == 0 => {
                    after_eq = false;
                    self.advance();
                }
                TokenKind::Assign if depth == 0 => {
                    after_eq = true;
                    self.advance();
                }
                TokenKind::Ident if depth == 0 && !after_eq => {
                    unit.signals.push(SignalDecl {
                        name: self.peek().text.clone(),
                        type_text: type_text.clone(),
                        pos: self.pos(),
                    });
                    self.advance();
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    self.advance();
                }
                TokenKind::Keyword(kw) if is_structural(kw) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_import(&mut self, unit: &mut DesignUnit) {
        self.advance(); // import
        loop {
            if self.peek_kind() != TokenKind::Ident {
                break;
            }
            let pos = self.pos();
            let package_name = self.advance().text.clone();

            if self.peek_kind() != TokenKind::ColonColon {
                break;
            }
            self.advance();

            let (symbol, is_wildcard) = match self.peek_kind() {
                TokenKind::Star => {
                    self.advance();
                    ("*".to_string(), true)
                }
                TokenKind::Ident => (self.advance().text.clone(), false),
                _ => break,
            };

            unit.imports.push(ImportDecl {
                package_name,
                symbol,
                is_wildcard,
                pos,
            });

            if self.peek_kind() == TokenKind::Comma {
                self.advance();
                continue;
            }
            break;
        }
        self.skip_to_semi();
    }

    // ---- procedural blocks ----

    fn parse_always(&mut self, unit: &mut DesignUnit) {
        let pos = self.pos();
        let mut kind = match self.peek_kind() {
            TokenKind::Keyword(Keyword::AlwaysComb) => AlwaysKind::Comb,
            TokenKind::Keyword(Keyword::AlwaysFf) => AlwaysKind::Ff,
            TokenKind::Keyword(Keyword::AlwaysLatch) => AlwaysKind::Latch,
            _ => AlwaysKind::Plain,
        };
        self.advance();

        // Sensitivity list: @(*), @*, or @(posedge clk …)
        if self.peek_kind() == TokenKind::At {
            self.advance();
            if self.peek_kind() == TokenKind::Star {
                self.advance();
                if kind == AlwaysKind::Plain {
                    kind = AlwaysKind::Star;
                }
            } else if self.peek_kind() == TokenKind::LParen {
                if self.peek_at(1).kind == TokenKind::Star
                    && self.peek_at(2).kind == TokenKind::RParen
                    && kind == AlwaysKind::Plain
                {
                    kind = AlwaysKind::Star;
                }
                self.skip_parens();
            }
        }

        let mut block = AlwaysBlock {
            kind,
            label: String::new(),
            assignments: Vec::new(),
            pos,
        };

        if self.peek_kind() == TokenKind::Keyword(Keyword::Begin) {
            self.advance();
            block.label = self.take_block_label();
            self.parse_always_body(unit, &mut block);
        } else {
            self.parse_always_statement(&mut block);
        }

        unit.always_blocks.push(block);
    }

    /// Statements until the `end` matching the already-consumed `begin`.
    fn parse_always_body(&mut self, unit: &mut DesignUnit, block: &mut AlwaysBlock) {
        let mut depth = 1usize;
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::Begin) => {
                    depth += 1;
                    self.advance();
                    let _ = self.take_block_label();
                }
                TokenKind::Keyword(Keyword::End) => {
                    depth -= 1;
                    self.advance();
                    let _ = self.take_block_label();
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Keyword(Keyword::Case | Keyword::Casex | Keyword::Casez) => {
                    self.parse_case(unit, false, false);
                }
                TokenKind::Keyword(Keyword::Unique | Keyword::Priority) => {
                    let is_unique = self.peek_kind() == TokenKind::Keyword(Keyword::Unique);
                    self.advance();
                    if let TokenKind::Keyword(ck) = self.peek_kind() {
                        if case_kind(ck).is_some() {
                            self.parse_case(unit, is_unique, !is_unique);
                        }
                    }
                }
                TokenKind::Keyword(kw) if is_structural(kw) => {
                    // A unit-level keyword inside an always body means the
                    // block was never closed; stop so recovery can proceed.
                    self.diag("unterminated always block", block.pos);
                    return;
                }
                TokenKind::LParen => {
                    // Conditions: `<=` inside parens is a comparison.
                    self.skip_parens();
                }
                TokenKind::Ident => {
                    if self.take_assignment(block) {
                        self.skip_to_semi();
                    } else {
                        // Control words (`if`, `else`, `for`, …) lex as plain
                        // identifiers; step over them one at a time.
                        self.advance();
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// One statement without `begin`: scan to the terminator, recording the
    /// first `IDENT = …` / `IDENT <= …` found at paren depth zero.
    fn parse_always_statement(&mut self, block: &mut AlwaysBlock) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Semi => {
                    self.advance();
                    return;
                }
                TokenKind::LParen => self.skip_parens(),
                TokenKind::Ident => {
                    if self.take_assignment(block) {
                        self.skip_to_semi();
                        return;
                    }
                    self.advance();
                }
                TokenKind::Keyword(kw)
                    if is_structural(kw)
                        || matches!(kw, Keyword::Begin | Keyword::End) =>
                {
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// If the current identifier starts an assignment (possibly through
    /// index/member selects like `a[i].f`), record it and return true. The
    /// cursor is left on the identifier either way.
    fn take_assignment(&mut self, block: &mut AlwaysBlock) -> bool {
        let target = self.peek().text.clone();
        let pos = self.pos();

        let mut off = 1;
        loop {
            match self.peek_at(off).kind {
                TokenKind::LBracket => {
                    let mut d = 1;
                    off += 1;
                    while d > 0 && self.peek_at(off).kind != TokenKind::Eof {
                        match self.peek_at(off).kind {
                            TokenKind::LBracket => d += 1,
                            TokenKind::RBracket => d -= 1,
                            _ => {}
                        }
                        off += 1;
                    }
                }
                TokenKind::Dot if self.peek_at(off + 1).kind == TokenKind::Ident => {
                    off += 2;
                }
                _ => break,
            }
        }

        let is_blocking = match self.peek_at(off).kind {
            TokenKind::Assign => true,
            TokenKind::NonBlocking => false,
            _ => return false,
        };

        block.assignments.push(Assignment {
            is_blocking,
            target,
            pos,
        });
        true
    }

    fn parse_case(&mut self, unit: &mut DesignUnit, is_unique: bool, is_priority: bool) {
        let pos = self.pos();
        let kind = match self.peek_kind() {
            TokenKind::Keyword(kw) => match case_kind(kw) {
                Some(k) => k,
                None => return,
            },
            _ => return,
        };
        self.advance();
        self.skip_parens(); // case expression

        let mut stmt = CaseStatement {
            kind,
            has_default: false,
            is_unique,
            is_priority,
            pos,
        };

        let mut depth = 1usize;
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::Case | Keyword::Casex | Keyword::Casez) => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Endcase) => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Keyword(Keyword::Default) if depth == 1 => {
                    stmt.has_default = true;
                    self.advance();
                }
                TokenKind::Keyword(kw) if is_structural(kw) => {
                    self.diag("unterminated case statement", pos);
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }

        unit.case_statements.push(stmt);
    }

    fn parse_generate(&mut self, unit: &mut DesignUnit) {
        let pos = self.pos();
        self.advance(); // generate

        // Look ahead for the first `begin : label` before endgenerate.
        let mut label = String::new();
        let mut has_label = false;
        let mut off = 0usize;
        loop {
            let tok = self.peek_at(off);
            match tok.kind {
                TokenKind::Eof | TokenKind::Keyword(Keyword::Endgenerate) => break,
                TokenKind::Keyword(Keyword::Begin)
                    if self.peek_at(off + 1).kind == TokenKind::Colon
                        && self.peek_at(off + 2).kind == TokenKind::Ident =>
                {
                    label = self.peek_at(off + 2).text.clone();
                    has_label = true;
                    break;
                }
                _ => off += 1,
            }
        }

        unit.generate_blocks.push(GenerateBlock {
            label,
            has_label,
            pos,
        });
        // The region body parses through the ordinary unit-body loop.
    }

    /// Skip one statement, or a balanced `begin … end` block.
    fn skip_statement_or_block(&mut self) {
        if self.peek_kind() == TokenKind::Keyword(Keyword::Begin) {
            let mut depth = 0usize;
            while !self.at_end() {
                match self.peek_kind() {
                    TokenKind::Keyword(Keyword::Begin) => depth += 1,
                    TokenKind::Keyword(Keyword::End) => {
                        depth -= 1;
                        self.advance();
                        let _ = self.take_block_label();
                        if depth == 0 {
                            return;
                        }
                        continue;
                    }
                    TokenKind::Keyword(kw) if is_structural(kw) => return,
                    _ => {}
                }
                self.advance();
            }
        } else {
            self.skip_to_semi();
        }
    }

    // ---- instantiations ----

    /// Instantiation heuristics: `IDENT IDENT (` and `IDENT #( … ) IDENT (`.
    fn try_parse_instantiation(&mut self, unit: &mut DesignUnit) -> bool {
        let t0 = self.peek();
        if t0.kind != TokenKind::Ident {
            return false;
        }
        let module_name = t0.text.clone();
        let pos = t0.pos;

        // Parameterized: IDENT #( … ) IDENT ( … ) ;
        if self.peek_at(1).kind == TokenKind::Hash && self.peek_at(2).kind == TokenKind::LParen {
            let saved = self.idx;
            self.advance(); // module name
            self.advance(); // '#'
            self.skip_parens();
            if self.peek_kind() == TokenKind::Ident
                && self.peek_at(1).kind == TokenKind::LParen
            {
                let instance_name = self.advance().text.clone();
                self.skip_parens();
                self.skip_to_semi();
                unit.instantiations.push(Instantiation {
                    module_name,
                    instance_name,
                    is_parameterized: true,
                    pos,
                });
                return true;
            }
            self.idx = saved;
            return false;
        }

        // Simple: IDENT IDENT ( … ) ;
        if self.peek_at(1).kind == TokenKind::Ident && self.peek_at(2).kind == TokenKind::LParen {
            self.advance(); // module name
            let instance_name = self.advance().text.clone();
            self.skip_parens();
            self.skip_to_semi();
            unit.instantiations.push(Instantiation {
                module_name,
                instance_name,
                is_parameterized: false,
                pos,
            });
            return true;
        }

        false
    }
}

// ---- keyword classification ----

fn unit_keywords(kw: Keyword) -> Option<(DesignUnitKind, Keyword)> {
    Some(match kw {
        Keyword::Module => (DesignUnitKind::Module, Keyword::Endmodule),
        Keyword::Package => (DesignUnitKind::Package, Keyword::Endpackage),
        Keyword::Interface => (DesignUnitKind::Interface, Keyword::Endinterface),
        Keyword::Class => (DesignUnitKind::Class, Keyword::Endclass),
        Keyword::Program => (DesignUnitKind::Program, Keyword::Endprogram),
        _ => return None,
    })
}

fn is_structural(kw: Keyword) -> bool {
    matches!(
        kw,
        Keyword::Module
            | Keyword::Endmodule
            | Keyword::Package
            | Keyword::Endpackage
            | Keyword::Interface
            | Keyword::Endinterface
            | Keyword::Class
            | Keyword::Endclass
            | Keyword::Program
            | Keyword::Endprogram
    )
}

fn case_kind(kw: Keyword) -> Option<CaseKind> {
    Some(match kw {
        Keyword::Case => CaseKind::Case,
        Keyword::Casex => CaseKind::Casex,
        Keyword::Casez => CaseKind::Casez,
        _ => return None,
    })
}

fn direction_keyword(kind: TokenKind) -> Option<PortDir> {
    match kind {
        TokenKind::Keyword(Keyword::Input) => Some(PortDir::Input),
        TokenKind::Keyword(Keyword::Output) => Some(PortDir::Output),
        TokenKind::Keyword(Keyword::Inout) => Some(PortDir::Inout),
        TokenKind::Keyword(Keyword::Ref) => Some(PortDir::Ref),
        _ => None,
    }
}

/// Append a token's text, spacing it the way declarations read.
fn append_text(out: &mut String, text: &str) {
    let no_space_before = matches!(text, "]" | ")" | ":" | ",");
    let last = out.chars().last();
    let no_space_after = matches!(last, Some('[') | Some('(') | Some(':'));
    if !out.is_empty() && !no_space_before && !no_space_after {
        out.push(' ');
    }
    out.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn unit<'a>(result: &'a ParseResult, name: &str) -> &'a DesignUnit {
        result
            .units
            .iter()
            .find(|u| u.name == name)
            .unwrap_or_else(|| panic!("no unit named {name}"))
    }

    #[test]
    fn simple_module() {
        let r = parse_source("module top;\nendmodule\n", "top.sv");
        assert_eq!(r.units.len(), 1);
        let u = &r.units[0];
        assert_eq!(u.kind, DesignUnitKind::Module);
        assert_eq!(u.name, "top");
        assert_eq!(u.start_line, 1);
        assert_eq!(u.end_line, 2);
        assert_eq!(u.depth, 0);
        assert!(r.diagnostics.is_empty());
    }

    #[test]
    fn ansi_ports_with_types() {
        let src = "module alu (
            input  logic [7:0] a,
            input  logic [7:0] b,
            output logic [8:0] sum,
            inout  wire        dbg
        );
        endmodule";
        let r = parse_source(src, "alu.sv");
        let u = unit(&r, "alu");
        assert_eq!(u.ports.len(), 4);
        assert_eq!(u.ports[0].name, "a");
        assert_eq!(u.ports[0].direction, PortDir::Input);
        assert_eq!(u.ports[0].type_text, "logic [7:0]");
        assert_eq!(u.ports[2].name, "sum");
        assert_eq!(u.ports[2].direction, PortDir::Output);
        assert_eq!(u.ports[3].direction, PortDir::Inout);
    }

    #[test]
    fn shared_direction_ports() {
        let r = parse_source("module m (input a, b, output c);\nendmodule", "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.ports.len(), 3);
        assert_eq!(u.ports[1].name, "b");
        assert_eq!(u.ports[1].direction, PortDir::Input);
        assert_eq!(u.ports[2].direction, PortDir::Output);
    }

    #[test]
    fn non_ansi_ports_refined_by_body() {
        let src = "module m (a, b);\n input [3:0] a;\n output b;\nendmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.ports.len(), 2);
        assert_eq!(u.ports[0].direction, PortDir::Input);
        assert_eq!(u.ports[0].type_text, "[3:0]");
        assert_eq!(u.ports[1].direction, PortDir::Output);
    }

    #[test]
    fn header_parameters() {
        let src = "module fifo #(parameter WIDTH = 8, parameter DEPTH = 16) ();\nendmodule";
        let r = parse_source(src, "fifo.sv");
        let u = unit(&r, "fifo");
        assert_eq!(u.params.len(), 2);
        assert_eq!(u.params[0].name, "WIDTH");
        assert_eq!(u.params[0].default_text, "8");
        assert!(!u.params[0].is_localparam);
        assert_eq!(u.params[1].name, "DEPTH");
    }

    #[test]
    fn body_localparam() {
        let src = "module m;\n localparam ADDR = 4'h0;\nendmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.params.len(), 1);
        assert!(u.params[0].is_localparam);
        assert_eq!(u.params[0].name, "ADDR");
    }

    #[test]
    fn simple_instantiation() {
        let src = "module top;\n uart u_uart (.clk(clk), .tx(tx));\nendmodule";
        let r = parse_source(src, "top.sv");
        let u = unit(&r, "top");
        assert_eq!(u.instantiations.len(), 1);
        let inst = &u.instantiations[0];
        assert_eq!(inst.module_name, "uart");
        assert_eq!(inst.instance_name, "u_uart");
        assert!(!inst.is_parameterized);
    }

    #[test]
    fn parameterized_instantiation() {
        let src = "module top;\n fifo #(.WIDTH(16)) u_fifo (.clk(clk));\nendmodule";
        let r = parse_source(src, "top.sv");
        let u = unit(&r, "top");
        assert_eq!(u.instantiations.len(), 1);
        assert!(u.instantiations[0].is_parameterized);
        assert_eq!(u.instantiations[0].module_name, "fifo");
        assert_eq!(u.instantiations[0].instance_name, "u_fifo");
    }

    #[test]
    fn always_ff_with_assignments() {
        let src = "module m;
        always_ff @(posedge clk) begin
            if (rst) q <= 1'b0;
            else q <= d;
        end
        endmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.always_blocks.len(), 1);
        let ab = &u.always_blocks[0];
        assert_eq!(ab.kind, AlwaysKind::Ff);
        assert_eq!(ab.assignments.len(), 2);
        assert!(!ab.assignments[0].is_blocking);
        assert_eq!(ab.assignments[0].target, "q");
    }

    #[test]
    fn always_star_classified() {
        let src = "module m;\n always @(*) y = a & b;\nendmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.always_blocks[0].kind, AlwaysKind::Star);
        assert_eq!(u.always_blocks[0].assignments.len(), 1);
        assert!(u.always_blocks[0].assignments[0].is_blocking);
    }

    #[test]
    fn always_comb_and_latch() {
        let src = "module m;
        always_comb y = a;
        always_latch if (en) q = d;
        endmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.always_blocks.len(), 2);
        assert_eq!(u.always_blocks[0].kind, AlwaysKind::Comb);
        assert_eq!(u.always_blocks[1].kind, AlwaysKind::Latch);
    }

    #[test]
    fn comparison_not_recorded_as_assignment() {
        let src = "module m;
        always_comb begin
            if (count <= limit) y = 1;
        end
        endmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        let ab = &u.always_blocks[0];
        assert_eq!(ab.assignments.len(), 1);
        assert_eq!(ab.assignments[0].target, "y");
    }

    #[test]
    fn case_statement_flavors() {
        let src = "module m;
        always_comb begin
            unique case (sel)
                2'b00: y = a;
                default: y = b;
            endcase
            casez (mask)
                4'b1???: z = 1;
            endcase
        end
        endmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.case_statements.len(), 2);
        assert_eq!(u.case_statements[0].kind, CaseKind::Case);
        assert!(u.case_statements[0].has_default);
        assert!(u.case_statements[0].is_unique);
        assert_eq!(u.case_statements[1].kind, CaseKind::Casez);
        assert!(!u.case_statements[1].has_default);
    }

    #[test]
    fn signals_and_defparam() {
        let src = "module m;
        wire [3:0] w1, w2;
        reg r1 = 0;
        defparam u.WIDTH = 8;
        endmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        let names: Vec<_> = u.signals.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["w1", "w2", "r1"]);
        assert_eq!(u.signals[0].type_text, "wire [3:0]");
        assert!(u.has_defparam);
    }

    #[test]
    fn imports() {
        let src = "module m;\n import pkg_a::*;\n import pkg_b::func;\nendmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.imports.len(), 2);
        assert!(u.imports[0].is_wildcard);
        assert_eq!(u.imports[0].package_name, "pkg_a");
        assert_eq!(u.imports[1].symbol, "func");
    }

    #[test]
    fn generate_block_label() {
        let src = "module m;
        generate
            for (i = 0; i < 4; i = i + 1) begin : gen_slice
                slice u_s (.x(x[i]));
            end
        endgenerate
        endmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.generate_blocks.len(), 1);
        assert!(u.generate_blocks[0].has_label);
        assert_eq!(u.generate_blocks[0].label, "gen_slice");
        assert_eq!(u.instantiations.len(), 1);
    }

    #[test]
    fn labeled_block_mismatch_detected() {
        let src = "module m;
        begin : start_label
        end : other_label
        endmodule";
        let r = parse_source(src, "m.sv");
        let u = unit(&r, "m");
        assert_eq!(u.labeled_blocks.len(), 1);
        assert_eq!(u.labeled_blocks[0].begin_label, "start_label");
        assert_eq!(u.labeled_blocks[0].end_label, "other_label");
        assert!(!u.labeled_blocks[0].labels_match);
    }

    #[test]
    fn package_interface_class_program() {
        let src = "package p;\nendpackage
        interface bus_if;\nendinterface
        class txn;\nendclass
        program tb;\nendprogram";
        let r = parse_source(src, "units.sv");
        assert_eq!(r.units.len(), 4);
        assert_eq!(unit(&r, "p").kind, DesignUnitKind::Package);
        assert_eq!(unit(&r, "bus_if").kind, DesignUnitKind::Interface);
        assert_eq!(unit(&r, "txn").kind, DesignUnitKind::Class);
        assert_eq!(unit(&r, "tb").kind, DesignUnitKind::Program);
    }

    #[test]
    fn nested_module_depth() {
        let src = "module outer;\n module inner;\n endmodule\nendmodule";
        let r = parse_source(src, "m.sv");
        assert_eq!(unit(&r, "outer").depth, 0);
        assert_eq!(unit(&r, "inner").depth, 1);
    }

    #[test]
    fn missing_name_produces_diagnostic() {
        let r = parse_source("module ;\nendmodule", "bad.sv");
        assert!(!r.diagnostics.is_empty());
        assert_eq!(r.diagnostics[0].file, "bad.sv");
    }

    #[test]
    fn unterminated_module_recovers() {
        let r = parse_source("module m;\n wire x;\n", "m.sv");
        assert_eq!(r.units.len(), 1);
        assert!(r
            .diagnostics
            .iter()
            .any(|d| d.message.contains("unterminated")));
    }

    #[test]
    fn garbage_between_units_skipped() {
        let src = "!!! ??? module good;\nendmodule ###";
        let r = parse_source(src, "m.sv");
        assert_eq!(r.units.len(), 1);
        assert_eq!(r.units[0].name, "good");
    }
}
