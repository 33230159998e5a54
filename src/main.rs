use clap::Parser;

use chsmc::compiler::exit_code;
use chsmc::options::Cli;
use chsmc::{compile, CompileError, Lang};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(exit_code::USAGE);
        }
    };

    let opts = match cli.resolve() {
        Ok(Some(opts)) => opts,
        Ok(None) => {
            println!("chsmc {}", env!("CARGO_PKG_VERSION"));
            std::process::exit(exit_code::OK);
        }
        Err(e) => {
            eprintln!("chsmc: {}", e);
            std::process::exit(exit_code::USAGE);
        }
    };

    let source = match std::fs::read_to_string(&opts.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!(
                "chsmc: could not open \"{}\" for input: {}",
                opts.input.display(),
                e
            );
            std::process::exit(exit_code::NO_INPUT);
        }
    };

    let source_path = opts.input.display().to_string();
    let single_file = opts.lang == Lang::Java || opts.to_stdout;
    let declaration_name = if single_file {
        None
    } else {
        Some(
            opts.declaration_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("machine.h")
                .to_string(),
        )
    };

    let result = match compile(
        &source,
        &source_path,
        opts.lang,
        opts.line_directives,
        declaration_name.as_deref(),
    ) {
        Ok(result) => result,
        Err(CompileError::Fatal(msg)) => {
            eprintln!("{}", msg);
            std::process::exit(exit_code::DATA_ERR);
        }
        Err(CompileError::Sink(e)) => {
            eprintln!("chsmc: fatal error: user-code temporary file: {}", e);
            std::process::exit(exit_code::IO_ERR);
        }
    };

    print_totals(result.errors, result.warnings);
    if !result.succeeded() {
        std::process::exit(exit_code::DATA_ERR);
    }

    if opts.to_stdout {
        print!("{}", result.declaration);
        if !result.definition.is_empty() {
            print!("{}", result.definition);
        }
    } else if opts.lang == Lang::Java {
        write_file(&opts.declaration_path, &result.declaration);
    } else {
        write_file(&opts.declaration_path, &result.declaration);
        write_file(&opts.definition_path, &result.definition);
    }

    std::process::exit(exit_code::OK);
}

fn print_totals(errors: u32, warnings: u32) {
    if errors > 0 {
        eprintln!("{} error{}", errors, if errors > 1 { "s" } else { "" });
    }
    if warnings > 0 {
        eprintln!("{} warning{}", warnings, if warnings > 1 { "s" } else { "" });
    }
}

fn write_file(path: &std::path::Path, contents: &str) {
    if let Err(e) = std::fs::write(path, contents) {
        eprintln!(
            "chsmc: could not open \"{}\" for output: {}",
            path.display(),
            e
        );
        std::process::exit(exit_code::NO_INPUT);
    }
}
