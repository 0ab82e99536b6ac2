use super::dialect::Dialect;
use super::statement::ParserContext;
use super::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    String,
    Numeric,
    Symbol,
    Comment,
    Delimiter,
    /// A delimiter directive; the token text is the new delimiter
    NewDelimiter,
    /// A comment that the server executes (`/*!50001 ... */`)
    Directive,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub col: usize,
    /// Char offsets into the script, `start..end`
    pub start: usize,
    pub end: usize,
    pub parens_depth: usize,
}

impl Token {
    pub fn is_code(&self) -> bool {
        !matches!(
            self.kind,
            TokenKind::Comment | TokenKind::Eof | TokenKind::NewDelimiter
        )
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }
}

/// Splits script text into tokens according to a [`Dialect`].
pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    parens_depth: usize,
    dialect: &'a Dialect,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &str, dialect: &'a Dialect) -> Self {
        let mut chars: Vec<char> = text.chars().collect();
        if chars.first() == Some(&'\u{feff}') {
            chars.remove(0);
        }
        Self {
            chars,
            pos: 0,
            line: 1,
            col: 1,
            parens_depth: 0,
            dialect,
        }
    }

    /// The script text between two char offsets.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start.min(self.chars.len())..end.min(self.chars.len())]
            .iter()
            .collect()
    }

    pub fn next_token(&mut self, ctx: &ParserContext) -> Result<Token, ParseError> {
        let dialect = self.dialect;
        self.skip_whitespace();

        let start = self.pos;
        let line = self.line;
        let col = self.col;

        let Some(c) = self.peek(0) else {
            return Ok(self.token(TokenKind::Eof, start, line, col, self.parens_depth));
        };

        if let Some(marker) = dialect
            .line_comments
            .iter()
            .find(|marker| self.starts_with(marker))
        {
            self.advance(marker.chars().count());
            while let Some(c) = self.peek(0) {
                if c == '\n' || c == '\r' {
                    break;
                }
                self.advance(1);
            }
            return Ok(self.token(TokenKind::Comment, start, line, col, self.parens_depth));
        }

        if self.starts_with("/*") {
            return self.block_comment(start, line, col);
        }

        if self.at_delimiter(ctx) {
            self.advance(ctx.delimiter.text.chars().count());
            let token = self.token(TokenKind::Delimiter, start, line, col, self.parens_depth);
            if dialect.delimiter_ignores_blocks {
                self.parens_depth = 0;
            }
            return Ok(token);
        }

        if let Some(token) = self.string_literal(start, line, col)? {
            return Ok(token);
        }

        if let Some(&(_, close)) = dialect
            .identifier_quotes
            .iter()
            .find(|(open, _)| *open == c)
        {
            self.advance(1);
            self.quoted(close, false, line, "quoted identifier")?;
            return Ok(self.token(TokenKind::Identifier, start, line, col, self.parens_depth));
        }

        if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
            while let Some(c) = self.peek(0) {
                let exponent_sign = (c == '+' || c == '-')
                    && matches!(self.peek_back(1), Some('e') | Some('E'));
                if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                    self.advance(1);
                } else {
                    break;
                }
            }
            return Ok(self.token(TokenKind::Numeric, start, line, col, self.parens_depth));
        }

        if c.is_alphabetic() || c == '_' || c == '@' || c == '#' {
            self.advance(1);
            while let Some(c) = self.peek(0) {
                if (c.is_alphanumeric() || c == '_' || c == '$' || c == '#')
                    && !self.delimiter_starts_here(ctx)
                {
                    self.advance(1);
                } else {
                    break;
                }
            }

            if let Some(directive) = dialect.delimiter_directive
                && (ctx.at_statement_start || self.first_on_line(start))
                && self.slice(start, self.pos).eq_ignore_ascii_case(directive)
            {
                return self.delimiter_directive(start, line, col);
            }

            return Ok(self.token(TokenKind::Keyword, start, line, col, self.parens_depth));
        }

        self.advance(1);
        let depth = match c {
            '(' => {
                self.parens_depth += 1;
                self.parens_depth - 1
            }
            ')' => {
                self.parens_depth = self.parens_depth.saturating_sub(1);
                self.parens_depth
            }
            _ => self.parens_depth,
        };
        Ok(self.token(TokenKind::Symbol, start, line, col, depth))
    }

    fn token(
        &self,
        kind: TokenKind,
        start: usize,
        line: usize,
        col: usize,
        parens_depth: usize,
    ) -> Token {
        let text = match kind {
            TokenKind::Eof => String::new(),
            _ => self.slice(start, self.pos),
        };
        Token {
            kind,
            text,
            line,
            col,
            start,
            end: self.pos,
            parens_depth,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn peek_back(&self, offset: usize) -> Option<char> {
        self.pos
            .checked_sub(offset)
            .and_then(|i| self.chars.get(i))
            .copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c))
    }

    fn starts_with_ignore_case(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek(i).is_some_and(|p| p.eq_ignore_ascii_case(&c)))
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            let Some(c) = self.peek(0) else {
                return;
            };
            self.pos += 1;
            // \r\n counts as a single line break
            if c == '\n' || (c == '\r' && self.peek(0) != Some('\n')) {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek(0).is_some_and(char::is_whitespace) {
            self.advance(1);
        }
    }

    fn first_on_line(&self, start: usize) -> bool {
        self.chars[..start]
            .iter()
            .rev()
            .take_while(|c| **c != '\n' && **c != '\r')
            .all(|c| c.is_whitespace())
    }

    fn delimiter_starts_here(&self, ctx: &ParserContext) -> bool {
        let text = &ctx.delimiter.text;
        let alphanumeric = text.chars().all(|c| c.is_alphanumeric());
        !alphanumeric && self.starts_with(text)
    }

    fn at_delimiter(&self, ctx: &ParserContext) -> bool {
        let delimiter = &ctx.delimiter;
        if !self.starts_with_ignore_case(&delimiter.text) {
            return false;
        }

        let len = delimiter.text.chars().count();
        let ends_with_word_char = delimiter
            .text
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if ends_with_word_char
            && self
                .peek(len)
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            return false;
        }
        let starts_with_word_char = delimiter
            .text
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if starts_with_word_char
            && self
                .peek_back(1)
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            return false;
        }

        if delimiter.alone_on_line {
            let mut i = self.pos;
            while i > 0 {
                let c = self.chars[i - 1];
                if c == '\n' || c == '\r' {
                    break;
                }
                if !c.is_whitespace() {
                    return false;
                }
                i -= 1;
            }
            let mut j = self.pos + len;
            while let Some(&c) = self.chars.get(j) {
                if c == '\n' || c == '\r' {
                    break;
                }
                if !c.is_whitespace() {
                    return false;
                }
                j += 1;
            }
        }

        true
    }

    fn block_comment(
        &mut self,
        start: usize,
        line: usize,
        col: usize,
    ) -> Result<Token, ParseError> {
        let dialect = self.dialect;
        let is_directive = dialect
            .comment_directive
            .is_some_and(|marker| self.starts_with(marker));

        self.advance(2);
        let mut depth = 1;
        while depth > 0 {
            if self.peek(0).is_none() {
                return Err(ParseError::new(line, "unterminated block comment"));
            }
            if self.starts_with("*/") {
                self.advance(2);
                depth -= 1;
            } else if dialect.nested_block_comments && !is_directive && self.starts_with("/*") {
                self.advance(2);
                depth += 1;
            } else {
                self.advance(1);
            }
        }

        let kind = if is_directive {
            TokenKind::Directive
        } else {
            TokenKind::Comment
        };
        Ok(self.token(kind, start, line, col, self.parens_depth))
    }

    fn string_literal(
        &mut self,
        start: usize,
        line: usize,
        col: usize,
    ) -> Result<Option<Token>, ParseError> {
        let dialect = self.dialect;
        let Some(c) = self.peek(0) else {
            return Ok(None);
        };

        if c == '\'' {
            self.advance(1);
            self.quoted('\'', dialect.backslash_escapes, line, "string literal")?;
            return Ok(Some(self.token(TokenKind::String, start, line, col, self.parens_depth)));
        }

        if dialect.alt_string_quote == Some(c) {
            self.advance(1);
            self.quoted(c, dialect.backslash_escapes, line, "string literal")?;
            return Ok(Some(self.token(TokenKind::String, start, line, col, self.parens_depth)));
        }

        // Prefixed literals are only prefixes when not part of a longer word
        let word_before = self
            .peek_back(1)
            .is_some_and(|p| p.is_alphanumeric() || p == '_');
        if !word_before {
            let upper = c.to_ascii_uppercase();
            if dialect.string_prefixes.contains(&upper) && self.peek(1) == Some('\'') {
                self.advance(2);
                let escapes = dialect.backslash_escapes || upper == 'E';
                self.quoted('\'', escapes, line, "string literal")?;
                return Ok(Some(self.token(TokenKind::String, start, line, col, self.parens_depth)));
            }
            if dialect.unicode_strings && self.starts_with_ignore_case("U&'") {
                self.advance(3);
                self.quoted('\'', false, line, "string literal")?;
                return Ok(Some(self.token(TokenKind::String, start, line, col, self.parens_depth)));
            }
        }

        if dialect.dollar_quoting && c == '$' {
            if let Some(tag) = self.dollar_tag() {
                let tag_len = tag.chars().count();
                self.advance(tag_len);
                loop {
                    if self.peek(0).is_none() {
                        return Err(ParseError::new(
                            line,
                            format!("unterminated dollar-quoted string {}", tag),
                        ));
                    }
                    if self.starts_with(&tag) {
                        self.advance(tag_len);
                        break;
                    }
                    self.advance(1);
                }
                return Ok(Some(self.token(TokenKind::String, start, line, col, self.parens_depth)));
            }
        }

        Ok(None)
    }

    /// `$$` or `$tag$` at the current position; `$1` parameters are not tags.
    fn dollar_tag(&self) -> Option<String> {
        let mut tag = String::from("$");
        let mut i = 1;
        loop {
            let c = self.peek(i)?;
            if c == '$' {
                tag.push('$');
                return Some(tag);
            }
            let valid = if i == 1 {
                c.is_alphabetic() || c == '_'
            } else {
                c.is_alphanumeric() || c == '_'
            };
            if !valid {
                return None;
            }
            tag.push(c);
            i += 1;
        }
    }

    /// Consume up to and including the closing quote. A doubled quote is an
    /// escaped quote.
    fn quoted(
        &mut self,
        close: char,
        backslash_escapes: bool,
        line: usize,
        what: &str,
    ) -> Result<(), ParseError> {
        loop {
            let Some(c) = self.peek(0) else {
                return Err(ParseError::new(line, format!("unterminated {}", what)));
            };
            if backslash_escapes && c == '\\' {
                self.advance(2);
                continue;
            }
            self.advance(1);
            if c == close {
                if self.peek(0) == Some(close) {
                    self.advance(1);
                    continue;
                }
                return Ok(());
            }
        }
    }

    fn delimiter_directive(
        &mut self,
        start: usize,
        line: usize,
        col: usize,
    ) -> Result<Token, ParseError> {
        while self.peek(0).is_some_and(|c| c == ' ' || c == '\t') {
            self.advance(1);
        }
        let value_start = self.pos;
        while self.peek(0).is_some_and(|c| !c.is_whitespace()) {
            self.advance(1);
        }
        let value = self.slice(value_start, self.pos);
        if value.is_empty() {
            return Err(ParseError::new(line, "DELIMITER directive without a delimiter"));
        }

        Ok(Token {
            kind: TokenKind::NewDelimiter,
            text: value,
            line,
            col,
            start,
            end: self.pos,
            parens_depth: self.parens_depth,
        })
    }
}

/// Tokenize a whole script with the dialect's default delimiter.
pub fn tokenize(text: &str, dialect: &Dialect) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(text, dialect);
    let mut ctx = ParserContext::new(dialect);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token(&ctx)?;
        if token.kind == TokenKind::NewDelimiter {
            ctx.delimiter = super::statement::Delimiter::new(&token.text, false);
        }
        if token.is_code() || token.kind == TokenKind::NewDelimiter {
            ctx.at_statement_start = token.kind == TokenKind::Delimiter
                || token.kind == TokenKind::NewDelimiter;
        }
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
