use std::env;
use std::fs;
use std::process;

use tamarin_parser::parse;
use tamarin_vm::run;

fn main() {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        2 => match fs::read_to_string(&args[1]) {
            Ok(source) => run_source(&args[1], &source),
            Err(e) => {
                eprintln!("tamarin: cannot read '{}': {}", args[1], e);
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Usage: tamarin <script.tm>");
            process::exit(1);
        }
    }
}

fn run_source(path: &str, source: &str) {
    let (_program, lex_errors, parse_errors) = parse(source);
    let has_errors = !lex_errors.is_empty() || !parse_errors.is_empty();
    for e in &lex_errors {
        eprintln!("{}: {}", path, e);
    }
    for e in &parse_errors {
        eprintln!("{}: {}", path, e);
    }
    if has_errors {
        eprintln!("{} error(s).", lex_errors.len() + parse_errors.len());
        process::exit(1);
    }

    match run(source) {
        Ok(v) => println!("{}", v),
        Err(e) => {
            eprintln!("{}: {}", path, e);
            process::exit(1);
        }
    }
}
