use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use indoc::indoc;
use log::Level;

use prefetch_timeline::{AnalyzerSettings, PathListSource, PrefetchAnalyzer};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;

#[derive(Copy, Clone, PartialOrd, PartialEq, Eq, Debug)]
pub enum PfOutputFormat {
    Json,
    JsonLines,
}

struct PfDump {
    settings: AnalyzerSettings,
    inputs: Vec<PathBuf>,
    verbosity_level: Option<Level>,
}

impl PfDump {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let inputs: Vec<PathBuf> = matches
            .get_many::<PathBuf>("INPUT")
            .expect("This is a required argument")
            .cloned()
            .collect();

        let output_format = match matches
            .get_one::<String>("output-format")
            .map(|s| s.as_str())
        {
            Some("jsonl") => PfOutputFormat::JsonLines,
            _ => PfOutputFormat::Json,
        };

        let no_indent = match (matches.get_flag("no-indent"), output_format) {
            // "jsonl" --> --no-indent
            (true, PfOutputFormat::JsonLines) => {
                eprintln!("no need to pass both `--no-indent` and `-o jsonl`");
                true
            }
            (v, fmt) => v || fmt == PfOutputFormat::JsonLines,
        };

        let num_threads = *matches
            .get_one::<usize>("num-threads")
            .expect("has default");

        let timeline_limit = *matches
            .get_one::<usize>("timeline-limit")
            .expect("has default");

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(Level::Info),
            2 => Some(Level::Debug),
            3 => Some(Level::Trace),
            _ => {
                eprintln!("using more than  -vvv does not affect verbosity level");
                Some(Level::Trace)
            }
        };

        Ok(PfDump {
            settings: AnalyzerSettings::new()
                .num_threads(num_threads)
                .strict_decompression(matches.get_flag("strict"))
                .timeline_limit(timeline_limit)
                .indent(!no_indent),
            inputs,
            verbosity_level,
        })
    }

    /// Main entry point for `PfDump`
    pub fn run(&self) -> Result<()> {
        self.try_to_initialize_logging();

        let progress = |percent: u8, message: &str| log::debug!("[{:>3}%] {}", percent, message);
        let source = PathListSource::new(&self.inputs);

        let result = PrefetchAnalyzer::new()
            .with_configuration(self.settings.clone())
            .with_progress(&progress)
            .analyze_source(&source)
            .context("Failed to analyze prefetch files")?;

        for failure in &result.failures {
            eprintln!("{}", failure);
        }

        let report = result.report(self.settings.get_timeline_limit());
        let json = report
            .to_json(self.settings.should_indent())
            .context("Failed to serialize report")?;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", json)?;
        out.flush()?;

        Ok(())
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            match simplelog::WriteLogger::init(
                level.to_level_filter(),
                simplelog::Config::default(),
                io::stderr(),
            ) {
                Ok(_) => {}
                Err(e) => eprintln!("Failed to initialize logging: {:?}", e),
            };
        }
    }
}

fn main() {
    let matches = Command::new("Prefetch Parser")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to parse Windows Prefetch files into an execution timeline")
        .arg(
            Arg::new("INPUT")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf))
                .help("One or more .pf files"),
        )
        .arg(
            Arg::new("num-threads")
                .short('t')
                .long("threads")
                .default_value("0")
                .value_parser(value_parser!(usize))
                .help("Sets the number of worker threads, defaults to number of CPU cores."),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["json", "jsonl"])
                .default_value("json")
                .help("Sets the output format")
                .long_help(indoc!(
                    r#"Sets the output format:
                        "json"  - pretty prints the report.
                        "jsonl" - same as json with --no-indent.
                    "#
                )),
        )
        .arg(
            Arg::new("no-indent")
                .long("no-indent")
                .action(ArgAction::SetTrue)
                .help("When set, output will not be indented."),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help(
                    "When set, compressed files with back-references to data that was never produced \
                     are reported as corrupt instead of being zero filled.",
                ),
        )
        .arg(
            Arg::new("timeline-limit")
                .short('n')
                .long("timeline-limit")
                .default_value("1000")
                .value_parser(value_parser!(usize))
                .help("Maximum number of (most recent) timeline entries to print."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("-v - info, -vv - debug, -vvv - trace"),
        )
        .get_matches();

    let result = PfDump::from_cli_matches(&matches).and_then(|app| app.run());

    if let Err(e) = result {
        eprintln!("{:?}", e);
        exit(1)
    }
}
