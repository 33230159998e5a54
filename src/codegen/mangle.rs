//! Name mangling for hierarchical state names
//!
//! "Mangles" a dotted identifier:
//!
//!     root.trunk.branch.leaf -> M4root5trunk6branch4leaf
//!
//! to generate a unique identifier in class scope.  Mangled names are used
//! for compiler-generated enter/exit event and action names; diagnostics
//! use the inverse.

const MANGLE_PREFIX: &str = "M";

pub fn mangle(name: &str) -> String {
    let mut out = String::from(MANGLE_PREFIX);
    for part in name.split('.') {
        out.push_str(&part.len().to_string());
        out.push_str(part);
    }
    out
}

/// The inverse of [`mangle`].  A string that is not mangled to begin with
/// is returned unchanged.
pub fn demangle(name: &str) -> String {
    let rest = match name.strip_prefix(MANGLE_PREFIX) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => return name.to_string(),
    };

    let chars: Vec<char> = rest.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() && chars[i].is_ascii_digit() {
        let mut len = 0usize;
        while i < chars.len() && chars[i].is_ascii_digit() {
            len = len * 10 + (chars[i] as usize - '0' as usize);
            i += 1;
        }
        if !out.is_empty() {
            out.push('.');
        }
        for _ in 0..len {
            if let Some(&c) = chars.get(i) {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle() {
        assert_eq!(mangle("root.trunk.branch.leaf"), "M4root5trunk6branch4leaf");
        assert_eq!(mangle("s"), "M1s");
    }

    #[test]
    fn test_demangle() {
        assert_eq!(demangle("M4root5trunk6branch4leaf"), "root.trunk.branch.leaf");
        assert_eq!(demangle("M1s"), "s");
    }

    #[test]
    fn test_demangle_unmangled() {
        assert_eq!(demangle("plain"), "plain");
        assert_eq!(demangle("Mx"), "Mx");
    }

    #[test]
    fn test_round_trip() {
        for name in [
            "a",
            "a.b",
            "outer.middle.inner",
            "a_long_state_name0.x",
            "part.with.more.than.nine.chars.somewhere.averylongsegmentname",
        ] {
            assert_eq!(demangle(&mangle(name)), name);
        }
    }

    #[test]
    fn test_long_part_uses_two_digit_length() {
        let name = "averyveryverylongname.x";
        let mangled = mangle(name);
        assert!(mangled.starts_with("M21averyveryverylongname"));
        assert_eq!(demangle(&mangled), name);
    }
}
