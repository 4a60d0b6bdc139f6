mod check;
mod diagnostics;

use check::CheckOutcome;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use diagnostics::Collector;
use jvmasm::generate::GeneratorSettings;
use jvmasm::jvm::class_file::{ClassFile, ConstantLookup};
use jvmasm::pipeline::{AssemblerPipeline, Output, PipelineSettings};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;
use std::{fs, thread};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn main() -> io::Result<()> {
    env_logger::init();

    let prefixed = Arg::new("prefixed")
        .long("prefixed")
        .action(ArgAction::SetTrue)
        .help("Use `.`-prefixed modifiers and keywords (eg. `.static`, `.catch`)");
    let owner = Arg::new("owner")
        .long("owner")
        .value_name("TYPE")
        .help("Internal name of the class declaring the member (eg. `foo/bar/Baz`)");
    let no_frames = Arg::new("no-frames")
        .long("no-frames")
        .action(ArgAction::SetTrue)
        .help("Skip analysis, emitting neither stack map frames nor an exact `max_stack`");

    let matches = Command::new("JVM member assembler")
        .version(clap::crate_version!())
        .about("Assemble, disassemble, and check single JVM class members")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("assemble")
                .about("Assemble one member into a class file")
                .arg(owner.clone().required(true))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("Output class file (defaults to the owner name with `.class`)"),
                )
                .arg(no_frames.clone())
                .arg(prefixed.clone())
                .arg(
                    Arg::new("INPUT")
                        .help("Assembly file to read")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("disassemble")
                .about("Print a member of a class file as assembly")
                .arg(
                    Arg::new("member")
                        .long("member")
                        .value_name("NAME[DESC]")
                        .required(true)
                        .help("Member name, optionally followed by its descriptor"),
                )
                .arg(prefixed.clone())
                .arg(
                    Arg::new("INPUT")
                        .help("Class file to read")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Validate and assemble files, reporting every problem")
                .arg(owner.default_value("jvmasm/Check"))
                .arg(no_frames)
                .arg(prefixed)
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .help("Number of worker threads (defaults to available parallelism)"),
                )
                .arg(
                    Arg::new("INPUT")
                        .help("Assembly files, or folders to search for `.jasm` files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .get_matches();

    let succeeded = match matches.subcommand() {
        Some(("assemble", matches)) => assemble(matches)?,
        Some(("disassemble", matches)) => disassemble(matches)?,
        Some(("check", matches)) => check(matches)?,
        _ => false,
    };
    exit(if succeeded { 0 } else { 1 })
}

fn pipeline_settings(matches: &ArgMatches) -> PipelineSettings {
    PipelineSettings {
        generator: GeneratorSettings {
            compute_frames: !matches.get_flag("no-frames"),
        },
        use_prefixed_keywords: matches.get_flag("prefixed"),
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(
    matches: &'a ArgMatches,
    id: &str,
) -> io::Result<&'a T> {
    matches.get_one::<T>(id).ok_or_else(|| {
        let msg = format!("missing argument `{}`", id);
        io::Error::new(io::ErrorKind::InvalidInput, msg)
    })
}

fn assemble(matches: &ArgMatches) -> io::Result<bool> {
    let input: &PathBuf = required(matches, "INPUT")?;
    let owner: &String = required(matches, "owner")?;
    let settings = pipeline_settings(matches);
    let file = input.to_string_lossy();

    log::info!("Reading '{}'", file);
    let text = fs::read_to_string(input)?;
    let collector = Collector::default();
    let mut pipeline = AssemblerPipeline::new(owner.as_str());
    pipeline.set_settings(settings);
    pipeline.add_listener(Box::new(collector.clone()));
    pipeline.set_text(text);
    pipeline.update_ast(settings.use_prefixed_keywords);
    pipeline.validate_ast();
    let generated = pipeline.generate_class();

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    diagnostics::print(&mut stderr, &file, &collector.take())?;

    match pipeline.take_output() {
        Some(Output::Class(bytes)) if generated => {
            let output = matches
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(format!("{}.class", owner)));
            log::info!("Writing '{}'", output.display());
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&output, bytes)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn disassemble(matches: &ArgMatches) -> io::Result<bool> {
    let input: &PathBuf = required(matches, "INPUT")?;
    let member: &String = required(matches, "member")?;
    let file = input.to_string_lossy();

    log::info!("Reading '{}'", file);
    let bytes = fs::read(input)?;

    let owner = match ClassFile::parse(&bytes) {
        Ok(class) => class
            .constants
            .class_name(class.this_class)
            .map(String::from)
            .unwrap_or_default(),
        Err(_) => String::new(),
    };

    let collector = Collector::default();
    let mut pipeline = AssemblerPipeline::new(owner);
    pipeline.add_listener(Box::new(collector.clone()));
    pipeline.set_bytecode(bytes, member.as_str());
    pipeline.update_ast(matches.get_flag("prefixed"));

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    diagnostics::print(&mut stderr, &file, &collector.take())?;
    match pipeline.text() {
        Some(text) => {
            io::stdout().write_all(text.as_bytes())?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn check(matches: &ArgMatches) -> io::Result<bool> {
    let inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("INPUT")
        .map(|inputs| inputs.cloned().collect())
        .unwrap_or_default();
    let owner: &String = required(matches, "owner")?;
    let settings = pipeline_settings(matches);
    let jobs = matches.get_one::<usize>("jobs").copied().unwrap_or_else(|| {
        thread::available_parallelism().map_or(1, |jobs| jobs.get())
    });

    let files = check::collect_files(&inputs);
    log::info!("Checking {} files on {} workers", files.len(), jobs);
    let outcomes = check::check_all(&files, owner, settings, jobs);

    let mut count_ok = 0;
    let mut count_fail = 0;
    let mut count_error = 0;
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    for (file, outcome) in files.iter().zip(outcomes) {
        let file = file.to_string_lossy();
        let (color, summary, diagnostics) = match outcome {
            CheckOutcome::Ok => {
                count_ok += 1;
                (Color::Green, "OK", vec![])
            }
            CheckOutcome::Fail(diagnostics) => {
                count_fail += 1;
                (Color::Red, "FAILED", diagnostics)
            }
            CheckOutcome::Error(err) => {
                count_error += 1;
                log::error!("Could not read '{}': {}", file, err);
                (Color::Yellow, "ERROR", vec![])
            }
        };

        let mut s = stdout.lock();
        s.write_all(b" - ")?;
        s.set_color(ColorSpec::new().set_bold(true))?;
        s.write_all(file.as_bytes())?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b" [")?;
        s.set_color(ColorSpec::new().set_fg(Some(color)))?;
        s.write_all(summary.as_bytes())?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b"]\n")?;
        s.reset()?;
        diagnostics::print(&mut s, &file, &diagnostics)?;
    }

    let mut s = stdout.lock();
    writeln!(
        s,
        "{} ok, {} failed, {} unreadable",
        count_ok, count_fail, count_error
    )?;
    Ok(count_fail == 0 && count_error == 0)
}
