//! Host-language parameter scanner
//!
//! Extracts, for each comma-separated parameter of an already-captured
//! parameter-list chunk, the declaration and the parameter name.  Given a
//! declaration such as:
//!
//!     T (*const f)( U )
//!
//! the name `f` is parsed out and replaced by a `$` placeholder in the
//! stored declaration:
//!
//!     decl: T (*const $)( U )
//!     name: f
//!
//! Code emission later stuffs a caller-supplied prefix and name back into
//! that slot, so one captured template serves both plain and prefixed
//! formal parameters.

pub mod cpp;
pub mod java;

use thiserror::Error;

use crate::codegen::Lang;

/// One scanned function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FnParam {
    /// Line number of the declaration in the CHSM source.
    pub line: u32,
    /// Declaration with a `$` placeholder where the name was.
    pub decl: String,
    /// The parameter name.
    pub name: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParamError {
    #[error("'{0}': unmatched character")]
    Unmatched(char),
    #[error("'{0}': unexpected character")]
    UnexpectedChar(char),
    #[error("\"{0}\": unexpected token")]
    UnexpectedToken(String),
    #[error("parameter name missing")]
    MissingName,
}

/// A scanner for one host language's parameter declarations.
pub trait ParamScanner {
    /// Scan a whole parameter-list chunk.  `line` is the source line the
    /// chunk began on and is recorded on each parameter.
    fn scan(&self, chunk: &str, line: u32) -> Result<Vec<FnParam>, ParamError>;
}

/// The scanner for a backend language.
pub fn scanner_for(lang: Lang) -> &'static dyn ParamScanner {
    match lang {
        Lang::Cpp => &cpp::CppParams,
        Lang::Java => &java::JavaParams,
    }
}

/// Prefix stuffed in front of formal argument names so they cannot collide
/// with the data members they initialize, e.g.
/// `param_block( T Pparam ) : param( Pparam )`.
pub const PARAM_PREFIX: &str = "P";

/// Bitmask controlling how parameter lists are emitted.
pub type EmitMask = u32;

/// Emit a leading separator before the first parameter.
pub const EMIT_COMMA: EmitMask = 0x01;
/// Prefix each name with [`PARAM_PREFIX`].
pub const EMIT_PREFIX: EmitMask = 0x02;
/// Emit declarations with names (formal parameters).
pub const EMIT_FORMAL: EmitMask = 0x04;
/// Emit names only (actual arguments).
pub const EMIT_ACTUAL: EmitMask = 0x08;

/// Takes a declaration string like `void (*const $)( int )` and stuffs
/// `s1` followed by `s2` where the `$` is.
pub fn stuff_decl(decl: &str, s1: &str, s2: &str) -> String {
    match decl.find('$') {
        Some(pos) => {
            let mut out = String::with_capacity(decl.len() + s1.len() + s2.len());
            out.push_str(&decl[..pos]);
            out.push_str(s1);
            out.push_str(s2);
            out.push_str(&decl[pos + 1..]);
            out
        }
        None => decl.to_string(),
    }
}

/// Render a parameter list in the form dictated by `flags`.
pub fn emit_param_list(params: &[FnParam], flags: EmitMask) -> String {
    let mut out = String::new();
    let mut first = (flags & EMIT_COMMA) == 0;
    for param in params {
        if first {
            first = false;
        } else {
            out.push_str(", ");
        }
        let prefix = if (flags & EMIT_PREFIX) != 0 {
            PARAM_PREFIX
        } else {
            ""
        };
        if (flags & EMIT_ACTUAL) != 0 {
            out.push_str(prefix);
            out.push_str(&param.name);
        } else {
            let name = if (flags & EMIT_FORMAL) != 0 {
                param.name.as_str()
            } else {
                ""
            };
            out.push_str(&stuff_decl(&param.decl, prefix, name));
        }
    }
    out
}

/// Tokens shared by the per-language scanners.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PTok {
    Ident(String),
    Number(String),
    Punct(char),
}

impl PTok {
    pub(crate) fn as_str(&self) -> String {
        match self {
            PTok::Ident(s) | PTok::Number(s) => s.clone(),
            PTok::Punct(c) => c.to_string(),
        }
    }

    pub(crate) fn is_punct(&self) -> bool {
        matches!(self, PTok::Punct(_))
    }
}

fn opening_char(c: char) -> char {
    match c {
        ')' => '(',
        '>' => '<',
        ']' => '[',
        _ => c,
    }
}

/// Token pump over a parameter-list chunk.  Tracks `(`, `<`, and `[`
/// nesting so the scanners can tell a top-level `,` from one inside a
/// nested group.
pub(crate) struct PTokens {
    chars: Vec<char>,
    pos: usize,
    parens: Vec<char>,
    peeked: Option<PTok>,
}

impl PTokens {
    pub(crate) fn new(chunk: &str) -> Self {
        Self {
            chars: chunk.chars().collect(),
            pos: 0,
            parens: Vec::new(),
            peeked: None,
        }
    }

    pub(crate) fn within_parens(&self) -> bool {
        !self.parens.is_empty()
    }

    fn get_char(&mut self) -> Result<Option<char>, ParamError> {
        let c = match self.chars.get(self.pos).copied() {
            Some(c) => c,
            None => return Ok(None),
        };
        self.pos += 1;
        match c {
            '(' | '<' | '[' => self.parens.push(c),
            ')' | '>' | ']' => {
                if self.parens.last().copied() != Some(opening_char(c)) {
                    return Err(ParamError::Unmatched(c));
                }
                self.parens.pop();
            }
            _ => {}
        }
        Ok(Some(c))
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Get and consume the next token, or `None` at end of input.
    pub(crate) fn next(&mut self) -> Result<Option<PTok>, ParamError> {
        if let Some(t) = self.peeked.take() {
            return Ok(Some(t));
        }
        loop {
            let c = match self.get_char()? {
                Some(c) => c,
                None => return Ok(None),
            };
            if c.is_whitespace() {
                continue;
            }
            if c.is_ascii_alphabetic() || c == '_' {
                let mut ident = String::new();
                ident.push(c);
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        self.get_char()?;
                    } else {
                        break;
                    }
                }
                return Ok(Some(PTok::Ident(ident)));
            }
            if c.is_ascii_digit() {
                return self.scan_number(c).map(Some);
            }
            match c {
                '/' => match self.peek_char() {
                    Some('/') => {
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.get_char()?;
                        }
                    }
                    Some('*') => {
                        self.get_char()?;
                        loop {
                            match self.get_char()? {
                                Some('*') if self.peek_char() == Some('/') => {
                                    self.get_char()?;
                                    break;
                                }
                                Some(_) => {}
                                None => break,
                            }
                        }
                    }
                    _ => return Ok(Some(PTok::Punct('/'))),
                },
                '&' | ':' | ',' | '.' | '=' | '<' | '[' | '(' | '>' | ']' | ')' | '*' => {
                    return Ok(Some(PTok::Punct(c)));
                }
                _ => return Err(ParamError::UnexpectedChar(c)),
            }
        }
    }

    fn scan_number(&mut self, first: char) -> Result<PTok, ParamError> {
        let mut number = String::new();
        number.push(first);
        let charset: &str = if first == '0' {
            match self.peek_char() {
                Some('b') => {
                    number.push('b');
                    self.get_char()?;
                    "01"
                }
                Some(c @ '0'..='7') => {
                    number.push(c);
                    self.get_char()?;
                    "01234567"
                }
                Some(c @ ('x' | 'X')) => {
                    number.push(c);
                    self.get_char()?;
                    "0123456789ABCDEFabcdef"
                }
                _ => return Ok(PTok::Number(number)),
            }
        } else {
            "0123456789"
        };
        while let Some(c) = self.peek_char() {
            if charset.contains(c) {
                number.push(c);
                self.get_char()?;
            } else {
                break;
            }
        }
        Ok(PTok::Number(number))
    }

    pub(crate) fn unget(&mut self, t: PTok) {
        debug_assert!(self.peeked.is_none());
        self.peeked = Some(t);
    }

    /// Whether `t` ends the current parameter: end of input, or a `,` at
    /// nesting depth zero.  A `,` inside a nested paren group separates
    /// pointer-to-function parameters, not top-level ones.
    pub(crate) fn is_param_end(&self, t: &Option<PTok>) -> bool {
        match t {
            None => true,
            Some(PTok::Punct(',')) => !self.within_parens(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stuff_decl() {
        assert_eq!(stuff_decl("int $", "P", "x"), "int Px");
        assert_eq!(stuff_decl("void (*const $)( int )", "", "f"), "void (*const f)( int )");
        assert_eq!(stuff_decl("int $", "", ""), "int ");
    }

    #[test]
    fn test_stuff_decl_substitutes_exactly_once() {
        // The emitted form substitutes at the placeholder and is otherwise
        // byte-identical.
        let decl = "T (*const $)( U )";
        let stuffed = stuff_decl(decl, "pre", "name");
        assert_eq!(stuffed, "T (*const prename)( U )");
        assert_eq!(stuffed.matches("prename").count(), 1);
    }

    #[test]
    fn test_emit_param_list_forms() {
        let params = vec![
            FnParam {
                line: 1,
                decl: "int $".to_string(),
                name: "x".to_string(),
            },
            FnParam {
                line: 1,
                decl: "char $".to_string(),
                name: "c".to_string(),
            },
        ];
        assert_eq!(emit_param_list(&params, EMIT_FORMAL), "int x, char c");
        assert_eq!(
            emit_param_list(&params, EMIT_FORMAL | EMIT_PREFIX),
            "int Px, char Pc"
        );
        assert_eq!(emit_param_list(&params, EMIT_ACTUAL), "x, c");
        assert_eq!(
            emit_param_list(&params, EMIT_COMMA | EMIT_ACTUAL | EMIT_PREFIX),
            ", Px, Pc"
        );
        assert_eq!(emit_param_list(&params, 0), "int , char ");
    }

    #[test]
    fn test_unmatched_close() {
        let mut toks = PTokens::new("int x )");
        assert!(toks.next().is_ok());
        assert!(toks.next().is_ok());
        assert_eq!(toks.next(), Err(ParamError::Unmatched(')')));
    }
}
