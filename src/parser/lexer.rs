//! Lexer for CHSM Source
//!
//! The lexer produces tokens on demand for the parser.  It handles:
//! - CHSM keywords and punctuation
//! - A mode stack for interleaved host-language regions: in a non-normal
//!   mode no CHSM tokenization happens; raw characters are gathered until
//!   the balancing delimiter and returned as one code-chunk token
//! - `/*...*/` and `//...` comments, which are discarded

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,

    // Punctuation
    LParen,        // (
    RParen,        // )
    LBracket,      // [
    RBracket,      // ]
    LAngle,        // <
    RAngle,        // >
    LBrace,        // {
    RBrace,        // }
    Comma,         // ,
    Dot,           // .
    Colon,         // :
    ColonColon,    // ::
    Arrow,         // ->
    Ellipsis,      // ...
    Percent,       // %
    PercentLBrace, // %{
    Equal,         // =
    Amp,           // &
    Star,          // *
    Dollar,        // $
    Semicolon,     // ;

    // Keywords
    Chsm,
    Cluster,
    Deep,
    Enter,
    Event,
    Exit,
    Final,
    History,
    In,
    Is,
    Param,
    Set,
    State,
    Upon,
    Public,

    // Values
    Identifier,
    Number,

    /// An opaque host-language fragment gathered in a non-normal mode; the
    /// token's line is the line the fragment began on.
    CodeChunk,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "end of file",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LAngle => "<",
            Self::RAngle => ">",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Colon => ":",
            Self::ColonColon => "::",
            Self::Arrow => "->",
            Self::Ellipsis => "...",
            Self::Percent => "%",
            Self::PercentLBrace => "%{",
            Self::Equal => "=",
            Self::Amp => "&",
            Self::Star => "*",
            Self::Dollar => "$",
            Self::Semicolon => ";",
            Self::Chsm => "chsm",
            Self::Cluster => "cluster",
            Self::Deep => "deep",
            Self::Enter => "enter",
            Self::Event => "event",
            Self::Exit => "exit",
            Self::Final => "final",
            Self::History => "history",
            Self::In => "in",
            Self::Is => "is",
            Self::Param => "param",
            Self::Set => "set",
            Self::State => "state",
            Self::Upon => "upon",
            Self::Public => "public",
            Self::Identifier => "identifier",
            Self::Number => "number",
            Self::CodeChunk => "code",
        }
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    fn new(token_type: TokenType, value: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            token_type,
            value: value.into(),
            line,
            column,
        }
    }
}

/// Error thrown when the lexer encounters invalid input.  These are fatal
/// source errors: no recovery is attempted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: u32,
}

impl LexerError {
    fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

/// What closes the host-language fragment being gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkClose {
    /// Balancing `)`; the opening `(` was already consumed.
    Paren,
    /// Balancing `]`; the opening `[` was already consumed.
    Bracket,
    /// Balancing `}`; the opening `{` was already consumed.
    Brace,
    /// Literal `%}`.
    PercentBrace,
}

/// Tokenization modes.  The parser pushes a non-normal mode immediately
/// before a grammar position expecting a host-language fragment and pops it
/// after consuming the resulting chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// A host-language type name (after `:`).
    HostClass,
    /// A host-language expression or statement block.
    HostExpr(ChunkClose),
    /// A host-language parameter list up to the balancing `)`.
    HostParams,
}

lazy_static::lazy_static! {
    /// Reserved words in CHSM.
    static ref RESERVED_WORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("chsm", TokenType::Chsm);
        m.insert("cluster", TokenType::Cluster);
        m.insert("deep", TokenType::Deep);
        m.insert("enter", TokenType::Enter);
        m.insert("event", TokenType::Event);
        m.insert("exit", TokenType::Exit);
        m.insert("final", TokenType::Final);
        m.insert("history", TokenType::History);
        m.insert("in", TokenType::In);
        m.insert("is", TokenType::Is);
        m.insert("param", TokenType::Param);
        m.insert("set", TokenType::Set);
        m.insert("state", TokenType::State);
        m.insert("upon", TokenType::Upon);
        m.insert("public", TokenType::Public);
        m
    };
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_rest(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// The lexer.  Tokens are pulled one at a time so the parser can switch
/// modes between them.
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    modes: Vec<Mode>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            modes: vec![Mode::Normal],
        }
    }

    pub fn mode(&self) -> Mode {
        *self.modes.last().unwrap_or(&Mode::Normal)
    }

    pub fn push_mode(&mut self, mode: Mode) {
        self.modes.push(mode);
    }

    pub fn pop_mode(&mut self) {
        if self.modes.len() > 1 {
            self.modes.pop();
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    /// Get the next token according to the current mode.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        match self.mode() {
            Mode::Normal => self.next_normal(),
            Mode::HostClass => self.read_class_name(),
            Mode::HostExpr(close) => self.read_chunk(close),
            Mode::HostParams => self.read_chunk(ChunkClose::Paren),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexerError> {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek(1) == Some('/') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek(1) == Some('*') => {
                    let start_line = self.line;
                    self.advance();
                    self.advance();
                    loop {
                        match self.current() {
                            Some('*') if self.peek(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                            None => {
                                return Err(LexerError::new("unterminated comment", start_line));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_normal(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let column = self.column;

        let c0 = match self.current() {
            Some(c) => c,
            None => return Ok(Token::new(TokenType::Eof, "", line, column)),
        };
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        if is_ident_start(c0) {
            let mut word = String::new();
            while let Some(c) = self.current() {
                if !is_ident_rest(c) {
                    break;
                }
                word.push(c);
                self.advance();
            }
            let token_type = RESERVED_WORDS
                .get(word.as_str())
                .copied()
                .unwrap_or(TokenType::Identifier);
            return Ok(Token::new(token_type, word, line, column));
        }

        if c0.is_ascii_digit() {
            let mut number = String::new();
            while let Some(c) = self.current() {
                if !c.is_ascii_digit() {
                    break;
                }
                number.push(c);
                self.advance();
            }
            if self.current().map(is_ident_rest) == Some(true) {
                return Err(LexerError::new(
                    format!("\"{}\": malformed integer literal", number),
                    line,
                ));
            }
            return Ok(Token::new(TokenType::Number, number, line, column));
        }

        // Multi-character punctuation first.
        if c0 == '.' && c1 == Some('.') && c2 == Some('.') {
            self.advance();
            self.advance();
            self.advance();
            return Ok(Token::new(TokenType::Ellipsis, "...", line, column));
        }
        if c0 == '-' && c1 == Some('>') {
            self.advance();
            self.advance();
            return Ok(Token::new(TokenType::Arrow, "->", line, column));
        }
        if c0 == ':' && c1 == Some(':') {
            self.advance();
            self.advance();
            return Ok(Token::new(TokenType::ColonColon, "::", line, column));
        }
        if c0 == '%' && c1 == Some('{') {
            self.advance();
            self.advance();
            return Ok(Token::new(TokenType::PercentLBrace, "%{", line, column));
        }

        let token_type = match c0 {
            '(' => TokenType::LParen,
            ')' => TokenType::RParen,
            '[' => TokenType::LBracket,
            ']' => TokenType::RBracket,
            '<' => TokenType::LAngle,
            '>' => TokenType::RAngle,
            '{' => TokenType::LBrace,
            '}' => TokenType::RBrace,
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            ':' => TokenType::Colon,
            '%' => TokenType::Percent,
            '=' => TokenType::Equal,
            '&' => TokenType::Amp,
            '*' => TokenType::Star,
            '$' => TokenType::Dollar,
            ';' => TokenType::Semicolon,
            _ => {
                return Err(LexerError::new(
                    format!("'{}': unexpected character", c0),
                    line,
                ));
            }
        };
        self.advance();
        Ok(Token::new(token_type, c0.to_string(), line, column))
    }

    /// Gather raw host-language text until the balancing close delimiter.
    /// The opening delimiter was consumed as a normal token; the closing one
    /// is consumed here and not returned.
    fn read_chunk(&mut self, close: ChunkClose) -> Result<Token, LexerError> {
        // Skip leading blanks on the opening line so the chunk's line number
        // points at the code itself.
        while let Some(c) = self.current() {
            if c == ' ' || c == '\t' {
                self.advance();
            } else {
                break;
            }
        }

        let line = self.line;
        let column = self.column;
        let mut text = String::new();

        match close {
            ChunkClose::PercentBrace => loop {
                match self.current() {
                    Some('%') if self.peek(1) == Some('}') => {
                        self.advance();
                        self.advance();
                        return Ok(Token::new(TokenType::CodeChunk, text, line, column));
                    }
                    Some(c) => {
                        text.push(c);
                        self.advance();
                    }
                    None => {
                        return Err(LexerError::new("unterminated %{...%} block", line));
                    }
                }
            },
            ChunkClose::Paren | ChunkClose::Bracket | ChunkClose::Brace => {
                let (open, shut) = match close {
                    ChunkClose::Paren => ('(', ')'),
                    ChunkClose::Bracket => ('[', ']'),
                    _ => ('{', '}'),
                };
                let mut depth = 1u32;
                loop {
                    match self.current() {
                        Some(c) if c == open => {
                            depth += 1;
                            text.push(c);
                            self.advance();
                        }
                        Some(c) if c == shut => {
                            depth -= 1;
                            self.advance();
                            if depth == 0 {
                                return Ok(Token::new(TokenType::CodeChunk, text, line, column));
                            }
                            text.push(c);
                        }
                        Some(c) => {
                            text.push(c);
                            self.advance();
                        }
                        None => {
                            return Err(LexerError::new(
                                format!("unterminated code before '{}'", shut),
                                line,
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Gather a host-language type name: everything up to `(`, `{`, `;`, or
    /// whitespace outside an angle-bracketed group.
    fn read_class_name(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments()?;
        let line = self.line;
        let column = self.column;
        let mut text = String::new();
        let mut angle_depth = 0u32;
        while let Some(c) = self.current() {
            match c {
                '<' => angle_depth += 1,
                '>' => angle_depth = angle_depth.saturating_sub(1),
                '(' | '{' | ';' => break,
                c if c.is_whitespace() && angle_depth == 0 => break,
                _ => {}
            }
            text.push(c);
            self.advance();
        }
        if text.is_empty() {
            return Err(LexerError::new("expected a type name", line));
        }
        Ok(Token::new(TokenType::CodeChunk, text, line, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let t = lexer.next_token().unwrap();
            let done = t.token_type == TokenType::Eof;
            tokens.push(t);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn test_keywords() {
        let tokens = all_tokens("chsm cluster set state event is history deep upon enter exit");
        assert_eq!(tokens[0].token_type, TokenType::Chsm);
        assert_eq!(tokens[1].token_type, TokenType::Cluster);
        assert_eq!(tokens[2].token_type, TokenType::Set);
        assert_eq!(tokens[3].token_type, TokenType::State);
        assert_eq!(tokens[4].token_type, TokenType::Event);
        assert_eq!(tokens[5].token_type, TokenType::Is);
        assert_eq!(tokens[6].token_type, TokenType::History);
        assert_eq!(tokens[7].token_type, TokenType::Deep);
        assert_eq!(tokens[8].token_type, TokenType::Upon);
        assert_eq!(tokens[9].token_type, TokenType::Enter);
        assert_eq!(tokens[10].token_type, TokenType::Exit);
    }

    #[test]
    fn test_identifier() {
        let tokens = all_tokens("foo_bar2");
        assert_eq!(tokens[0].token_type, TokenType::Identifier);
        assert_eq!(tokens[0].value, "foo_bar2");
    }

    #[test]
    fn test_punctuation() {
        let tokens = all_tokens("a -> b ... :: %{ ; .");
        assert_eq!(tokens[1].token_type, TokenType::Arrow);
        assert_eq!(tokens[3].token_type, TokenType::Ellipsis);
        assert_eq!(tokens[4].token_type, TokenType::ColonColon);
        assert_eq!(tokens[5].token_type, TokenType::PercentLBrace);
        assert_eq!(tokens[6].token_type, TokenType::Semicolon);
        assert_eq!(tokens[7].token_type, TokenType::Dot);
    }

    #[test]
    fn test_comments_discarded() {
        let tokens = all_tokens("a /* comment */ b // eol\nc");
        assert_eq!(tokens.len(), 4); // a b c EOF
        assert_eq!(tokens[2].value, "c");
        assert_eq!(tokens[2].line, 2);
    }

    #[test]
    fn test_line_numbers() {
        let tokens = all_tokens("a\nb\n\nc");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[2].line, 4);
    }

    #[test]
    fn test_param_chunk() {
        let mut lexer = Lexer::new("( int x, void (*f)(int) ) is");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.token_type, TokenType::LParen);
        lexer.push_mode(Mode::HostParams);
        let chunk = lexer.next_token().unwrap();
        assert_eq!(chunk.token_type, TokenType::CodeChunk);
        assert_eq!(chunk.value, "int x, void (*f)(int) ");
        lexer.pop_mode();
        let t = lexer.next_token().unwrap();
        assert_eq!(t.token_type, TokenType::Is);
    }

    #[test]
    fn test_bracket_expr_chunk() {
        let mut lexer = Lexer::new("[ x[0] > 1 ] ;");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.token_type, TokenType::LBracket);
        lexer.push_mode(Mode::HostExpr(ChunkClose::Bracket));
        let chunk = lexer.next_token().unwrap();
        assert_eq!(chunk.value, "x[0] > 1 ");
        lexer.pop_mode();
        assert_eq!(lexer.next_token().unwrap().token_type, TokenType::Semicolon);
    }

    #[test]
    fn test_percent_brace_chunk() {
        let mut lexer = Lexer::new("%{ x += 1; %} state");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.token_type, TokenType::PercentLBrace);
        lexer.push_mode(Mode::HostExpr(ChunkClose::PercentBrace));
        let chunk = lexer.next_token().unwrap();
        assert_eq!(chunk.value, "x += 1; ");
        lexer.pop_mode();
        assert_eq!(lexer.next_token().unwrap().token_type, TokenType::State);
    }

    #[test]
    fn test_chunk_line_is_start_line() {
        let mut lexer = Lexer::new("%{\n  run();\n%}");
        lexer.next_token().unwrap();
        lexer.push_mode(Mode::HostExpr(ChunkClose::PercentBrace));
        let chunk = lexer.next_token().unwrap();
        assert_eq!(chunk.line, 1);
        assert!(chunk.value.contains("run();"));
    }

    #[test]
    fn test_class_name_chunk() {
        let mut lexer = Lexer::new(": my::ns::Type<int, char> (");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.token_type, TokenType::Colon);
        lexer.push_mode(Mode::HostClass);
        let chunk = lexer.next_token().unwrap();
        assert_eq!(chunk.value, "my::ns::Type<int, char>");
        lexer.pop_mode();
        assert_eq!(lexer.next_token().unwrap().token_type, TokenType::LParen);
    }

    #[test]
    fn test_unterminated_chunk() {
        let mut lexer = Lexer::new("%{ never closed");
        lexer.next_token().unwrap();
        lexer.push_mode(Mode::HostExpr(ChunkClose::PercentBrace));
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_malformed_number() {
        let mut lexer = Lexer::new("123abc");
        assert!(lexer.next_token().is_err());
    }
}
