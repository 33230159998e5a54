//! C-family parameter declarations
//!
//! Parsing a C++ function parameter in general is hard; we rely on the
//! observation that the parameter name is the right-most identifier in the
//! left-most set of parentheses, or, if there are no parentheses, the
//! right-most identifier of the declaration:
//!
//!     int x
//!     int *x
//!     int (*x)(int i)
//!     int (*const x)(int i)
//!     T<U> &x

use super::{FnParam, PTok, PTokens, ParamError, ParamScanner};

pub struct CppParams;

impl ParamScanner for CppParams {
    fn scan(&self, chunk: &str, line: u32) -> Result<Vec<FnParam>, ParamError> {
        let mut toks = PTokens::new(chunk);
        let mut params = Vec::new();
        while let Some(param) = parse_param(&mut toks, line)? {
            params.push(param);
        }
        if toks.within_parens() {
            return Err(ParamError::UnexpectedToken("(".to_string()));
        }
        Ok(params)
    }
}

fn parse_param(toks: &mut PTokens, line: u32) -> Result<Option<FnParam>, ParamError> {
    let first = match toks.next()? {
        Some(t @ PTok::Ident(_)) => t,
        Some(t) => return Err(ParamError::UnexpectedToken(t.as_str())),
        None => return Ok(None),
    };

    let mut decl: Vec<String> = vec![first.as_str()];
    let mut found_rparen = false;
    let mut name_index = 0usize;
    let mut prev = first;

    let mut t = toks.next()?;
    loop {
        let Some(tok) = t.clone() else { break };
        if toks.is_param_end(&t) {
            break;
        }
        match &tok {
            PTok::Ident(_) => {
                if matches!(&prev, PTok::Ident(_) | PTok::Punct('>')) {
                    decl.push(" ".to_string());
                }
                if !found_rparen {
                    // Keep moving name_index along so it stays the
                    // right-most identifier in the left-most set of
                    // parentheses, if any.
                    name_index = decl.len();
                }
            }
            PTok::Punct('&') if matches!(&prev, PTok::Punct('>')) => {
                decl.push(" ".to_string());
            }
            PTok::Punct('&') | PTok::Punct('(') | PTok::Punct('*') => {
                if tok.is_punct() != prev.is_punct() {
                    decl.push(" ".to_string());
                }
            }
            PTok::Punct(')') => {
                found_rparen = true;
            }
            _ => {}
        }

        decl.push(tok.as_str());
        if tok == PTok::Punct(',') {
            decl.push(" ".to_string());
        }

        prev = tok;
        t = toks.next()?;
    }

    if name_index == 0 {
        return Err(ParamError::MissingName);
    }
    let name = decl[name_index].clone();
    decl[name_index] = "$".to_string();
    Ok(Some(FnParam {
        line,
        decl: decl.concat(),
        name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::param::ParamScanner;

    fn scan(chunk: &str) -> Vec<FnParam> {
        CppParams.scan(chunk, 7).unwrap()
    }

    #[test]
    fn test_simple() {
        let params = scan("int x");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].decl, "int $");
        assert_eq!(params[0].name, "x");
        assert_eq!(params[0].line, 7);
    }

    #[test]
    fn test_pointer() {
        let params = scan("int *x");
        assert_eq!(params[0].decl, "int *$");
        assert_eq!(params[0].name, "x");
    }

    #[test]
    fn test_function_pointer() {
        let params = scan("int (*const f)(int i)");
        assert_eq!(params[0].name, "f");
        assert_eq!(params[0].decl, "int (*const $)(int i)");
    }

    #[test]
    fn test_template_reference() {
        let params = scan("T<U> &x");
        assert_eq!(params[0].name, "x");
        assert_eq!(params[0].decl, "T<U> &$");
    }

    #[test]
    fn test_multiple() {
        let params = scan("int x, char const *s");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[1].name, "s");
        assert_eq!(params[1].decl, "char const *$");
    }

    #[test]
    fn test_nested_comma_is_not_a_separator() {
        let params = scan("void (*f)(int x, int y)");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "f");
        assert_eq!(params[0].decl, "void (*$)(int x, int y)");
    }

    #[test]
    fn test_empty() {
        assert!(scan("").is_empty());
    }

    #[test]
    fn test_type_only_is_an_error() {
        assert_eq!(
            CppParams.scan("int", 1),
            Err(ParamError::MissingName)
        );
    }
}
