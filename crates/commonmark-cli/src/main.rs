use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use commonmark_core::{
    HtmlOptions, ParseOptions, emit_commonmark, emit_html_sanitized, emit_html_with_options,
    parse_with_options,
};

fn main() {
    let mut input: Option<String> = None;
    let mut format = OutputFormat::Html;
    let mut sanitized = false;
    let mut parse_options = ParseOptions::default();
    let mut html_options = HtmlOptions::default();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "--format" | "-t" => {
                format = match args.next().as_deref() {
                    Some("html") => OutputFormat::Html,
                    Some("commonmark") => OutputFormat::CommonMark,
                    _ => {
                        eprintln!("--format expects: html | commonmark");
                        print_usage();
                        process::exit(2);
                    }
                };
            }
            "--sanitized" => sanitized = true,
            "--sourcepos" => html_options.source_position = true,
            "--hardbreaks" => html_options.hard_breaks = true,
            "--nobreaks" => html_options.no_breaks = true,
            "--unsafe" => html_options.unsafe_html = true,
            "--smart" => parse_options.smart = true,
            _ => {
                if input.is_none() {
                    input = Some(arg);
                } else {
                    eprintln!("unexpected argument: {}", arg);
                    print_usage();
                    process::exit(2);
                }
            }
        }
    }

    let source = match input {
        Some(path) => fs::read_to_string(&path).unwrap_or_else(|err| {
            eprintln!("failed to read {}: {}", path, err);
            process::exit(1);
        }),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .unwrap_or_else(|err| {
                    eprintln!("failed to read stdin: {}", err);
                    process::exit(1);
                });
            buffer
        }
    };

    let result = match parse_with_options(&source, &parse_options) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("parse failed: {}", err);
            process::exit(1);
        }
    };

    let output = match format {
        OutputFormat::CommonMark => emit_commonmark(&result.document),
        OutputFormat::Html => {
            if sanitized {
                emit_html_sanitized(&result.document)
            } else {
                emit_html_with_options(&result.document, &html_options, Some(&result.source_map))
            }
        }
    };

    print!("{}", output);
}

fn print_usage() {
    eprintln!(
        "Usage: commonmark-cli [--format html|commonmark] [--sourcepos] [--hardbreaks] \
[--nobreaks] [--unsafe] [--smart] [--sanitized] [input]"
    );
}

#[derive(Clone, Copy)]
enum OutputFormat {
    Html,
    CommonMark,
}
