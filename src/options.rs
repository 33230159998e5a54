//! Command-line options
//!
//! The raw clap surface plus the resolution step that applies the
//! mutual-exclusion rules, infers the backend language from the input
//! extension, and derives default output paths.

use std::path::PathBuf;

use clap::Parser;

use crate::codegen::{create, Lang};

#[derive(Parser, Debug)]
#[command(name = "chsmc")]
#[command(about = "Concurrent Hierarchical State Machine compiler")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// CHSM source file
    #[arg()]
    pub input: Option<PathBuf>,

    /// Declaration output path
    #[arg(short = 'd', long = "declaration", value_name = "PATH")]
    pub declaration: Option<PathBuf>,

    /// Definition output path
    #[arg(short = 'D', long = "definition", value_name = "PATH")]
    pub definition: Option<PathBuf>,

    /// Same as --definition; implies --language c++
    #[arg(short = 'c', value_name = "PATH")]
    pub cpp_definition: Option<PathBuf>,

    /// Single output file; implies --language java
    #[arg(short = 'j', long = "java", value_name = "PATH")]
    pub java_file: Option<PathBuf>,

    /// Write generated code to standard output instead of files
    #[arg(short = 'E', long = "stdout")]
    pub to_stdout: bool,

    /// Backend language to generate (c++ or java)
    #[arg(short = 'x', long = "language", value_name = "LANG")]
    pub language: Option<String>,

    /// Suppress line directives in generated code
    #[arg(short = 'P', long = "no-line")]
    pub no_line: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

/// Fully resolved compilation options.
#[derive(Debug)]
pub struct Options {
    pub input: PathBuf,
    pub lang: Lang,
    pub declaration_path: PathBuf,
    pub definition_path: PathBuf,
    pub to_stdout: bool,
    pub line_directives: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

impl Cli {
    fn gave_cpp_option(&self) -> bool {
        self.cpp_definition.is_some() || matches!(self.language.as_deref(), Some("c++"))
    }

    fn gave_java_option(&self) -> bool {
        self.java_file.is_some() || matches!(self.language.as_deref(), Some("java"))
    }

    fn gave_output_option(&self) -> bool {
        self.declaration.is_some()
            || self.definition.is_some()
            || self.cpp_definition.is_some()
            || self.java_file.is_some()
    }

    fn gave_anything_else(&self) -> bool {
        self.input.is_some()
            || self.gave_output_option()
            || self.to_stdout
            || self.language.is_some()
            || self.no_line
    }

    /// Apply the mutual-exclusion rules and defaults.  Returns `None` when
    /// `--version` was the whole request.
    pub fn resolve(self) -> Result<Option<Options>, UsageError> {
        if self.version {
            if self.gave_anything_else() {
                return Err(UsageError(
                    "--version/-v is mutually exclusive with all other options".to_string(),
                ));
            }
            return Ok(None);
        }

        if self.to_stdout && self.gave_output_option() {
            return Err(UsageError(
                "--stdout/-E is mutually exclusive with output-file options".to_string(),
            ));
        }
        if self.gave_cpp_option() && self.gave_java_option() {
            return Err(UsageError(
                "C++-specific and Java-specific options are mutually exclusive".to_string(),
            ));
        }
        if self.java_file.is_some() && (self.declaration.is_some() || self.definition.is_some()) {
            return Err(UsageError(
                "--java/-j is mutually exclusive with --declaration/--definition".to_string(),
            ));
        }

        let Some(input) = self.input else {
            return Err(UsageError("no input file given".to_string()));
        };

        let lang = if let Some(name) = self.language.as_deref() {
            match Lang::from_name(name) {
                Some(lang) => lang,
                None => {
                    return Err(UsageError(format!(
                        "\"{}\": unsupported language for --language/-x",
                        name
                    )))
                }
            }
        } else if self.cpp_definition.is_some() {
            Lang::Cpp
        } else if self.java_file.is_some() {
            Lang::Java
        } else {
            let ext = input
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            match Lang::from_ext(ext) {
                Some(lang) => lang,
                None => {
                    return Err(UsageError(format!(
                        "\"{}\": unsupported filename extension",
                        ext
                    )))
                }
            }
        };

        let (declaration_ext, definition_ext) = create(lang).file_exts();
        let declaration_path = self
            .declaration
            .or_else(|| self.java_file.clone())
            .unwrap_or_else(|| input.with_extension(declaration_ext));
        let definition_path = self
            .definition
            .or(self.cpp_definition)
            .or(self.java_file)
            .unwrap_or_else(|| input.with_extension(definition_ext));

        Ok(Some(Options {
            input,
            lang,
            declaration_path,
            definition_path,
            to_stdout: self.to_stdout,
            line_directives: !self.no_line,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chsmc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_language_inferred_from_extension() {
        let opts = cli(&["machine.chsmc"]).resolve().unwrap().unwrap();
        assert_eq!(opts.lang, Lang::Cpp);
        assert_eq!(opts.declaration_path, PathBuf::from("machine.h"));
        assert_eq!(opts.definition_path, PathBuf::from("machine.cpp"));

        let opts = cli(&["machine.chsmj"]).resolve().unwrap().unwrap();
        assert_eq!(opts.lang, Lang::Java);
        assert_eq!(opts.declaration_path, PathBuf::from("machine.java"));
    }

    #[test]
    fn test_unknown_extension_is_an_error() {
        assert!(cli(&["machine.txt"]).resolve().is_err());
    }

    #[test]
    fn test_explicit_language() {
        let opts = cli(&["-x", "java", "machine.chsmc"]).resolve().unwrap().unwrap();
        assert_eq!(opts.lang, Lang::Java);
    }

    #[test]
    fn test_stdout_excludes_output_files() {
        assert!(cli(&["-E", "-d", "out.h", "machine.chsmc"]).resolve().is_err());
        assert!(cli(&["-E", "machine.chsmc"]).resolve().unwrap().is_some());
    }

    #[test]
    fn test_version_excludes_everything() {
        assert!(cli(&["-v", "machine.chsmc"]).resolve().is_err());
        assert!(cli(&["-v"]).resolve().unwrap().is_none());
    }

    #[test]
    fn test_cpp_and_java_options_conflict() {
        assert!(cli(&["-c", "out.cpp", "-j", "Out.java", "machine.chsmc"])
            .resolve()
            .is_err());
        assert!(cli(&["-x", "c++", "-j", "Out.java", "machine.chsmc"])
            .resolve()
            .is_err());
    }

    #[test]
    fn test_java_single_output_file() {
        let opts = cli(&["-j", "Machine.java", "machine.chsmj"])
            .resolve()
            .unwrap()
            .unwrap();
        assert_eq!(opts.lang, Lang::Java);
        assert_eq!(opts.declaration_path, PathBuf::from("Machine.java"));
        assert_eq!(opts.definition_path, PathBuf::from("Machine.java"));
    }

    #[test]
    fn test_c_option_implies_cpp() {
        let opts = cli(&["-c", "out.cpp", "machine.anything"])
            .resolve()
            .unwrap()
            .unwrap();
        assert_eq!(opts.lang, Lang::Cpp);
        assert_eq!(opts.definition_path, PathBuf::from("out.cpp"));
        assert_eq!(opts.declaration_path, PathBuf::from("machine.h"));
    }

    #[test]
    fn test_no_line() {
        let opts = cli(&["-P", "machine.chsmc"]).resolve().unwrap().unwrap();
        assert!(!opts.line_directives);
    }

    #[test]
    fn test_missing_input() {
        assert!(cli(&[]).resolve().is_err());
    }
}
