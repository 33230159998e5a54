//! Java-family parameter declarations
//!
//! Much easier than C++: the parameter name is always the right-most
//! identifier.
//!
//!     int x
//!     int[] x
//!     int x[]

use super::{FnParam, PTok, PTokens, ParamError, ParamScanner};

pub struct JavaParams;

impl ParamScanner for JavaParams {
    fn scan(&self, chunk: &str, line: u32) -> Result<Vec<FnParam>, ParamError> {
        let mut toks = PTokens::new(chunk);
        let mut params = Vec::new();
        while let Some(param) = parse_param(&mut toks, line)? {
            params.push(param);
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
    let mut name_index = 0usize;
    let mut prev = first;

    let mut t = toks.next()?;
    loop {
        let Some(tok) = t.clone() else { break };
        if toks.is_param_end(&t) {
            break;
        }
        if let PTok::Ident(_) = &tok {
            if matches!(&prev, PTok::Ident(_) | PTok::Punct(']')) {
                decl.push(" ".to_string());
            }
            // The name is always the right-most identifier.
            name_index = decl.len();
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
        JavaParams.scan(chunk, 3).unwrap()
    }

    #[test]
    fn test_simple() {
        let params = scan("int x");
        assert_eq!(params[0].decl, "int $");
        assert_eq!(params[0].name, "x");
    }

    #[test]
    fn test_array_before_name() {
        let params = scan("int[] x");
        assert_eq!(params[0].decl, "int[] $");
        assert_eq!(params[0].name, "x");
    }

    #[test]
    fn test_array_after_name() {
        let params = scan("int x[]");
        assert_eq!(params[0].decl, "int $[]");
        assert_eq!(params[0].name, "x");
    }

    #[test]
    fn test_multiple() {
        let params = scan("String s, double d");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "s");
        assert_eq!(params[1].name, "d");
    }
}
