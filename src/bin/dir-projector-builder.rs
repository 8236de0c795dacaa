//! Director projector builder binary

use clap::Parser;
use dir_projector::exit_codes::{
    EXIT_BUILD_ERROR, EXIT_CONFIG_ERROR, EXIT_DEPENDENCY_ERROR, EXIT_FORMAT_ERROR, EXIT_IO_ERROR,
    EXIT_OUTPUT_EXISTS, EXIT_PANIC, EXIT_SKELETON_ERROR, EXIT_SUCCESS,
};
use dir_projector::{BuildOptions, ProjectorError, build_projector};
use std::{env, panic, path::PathBuf, process};

const VERSION: &str = dir_projector::version::VERSION;

#[derive(Parser, Debug)]
#[command(version = VERSION, about = "Build Director projectors and bundles")]
struct Args {
    /// Path to manifest.json
    #[arg(short, long)]
    manifest: PathBuf,

    /// Output path, replacing the one in the manifest
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory of compressed launcher stubs
    #[arg(long)]
    launchers: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, json, json:<level>)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {}", panic_info);
        process::exit(EXIT_PANIC);
    }));

    let result = panic::catch_unwind(run);

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(_) => {
            eprintln!("Fatal: Unhandled panic in builder");
            process::exit(EXIT_PANIC);
        }
    }
}

fn exit_code(err: &ProjectorError) -> i32 {
    match err {
        ProjectorError::OutputAlreadyExists(_) | ProjectorError::ResourceExists(_) => {
            EXIT_OUTPUT_EXISTS
        }
        ProjectorError::InvalidConfig(_) | ProjectorError::JsonError(_) => EXIT_CONFIG_ERROR,
        ProjectorError::MissingLauncher(_) => EXIT_DEPENDENCY_ERROR,
        ProjectorError::IoError(_) | ProjectorError::ZipError(_) => EXIT_IO_ERROR,
        e if e.is_skeleton_error() => EXIT_SKELETON_ERROR,
        e if e.is_format_error() => EXIT_FORMAT_ERROR,
        _ => EXIT_BUILD_ERROR,
    }
}

fn run() -> i32 {
    if env::args().nth(1).as_deref() == Some("--version") {
        println!("dir-projector-builder {}", dir_projector::version::full_version());
        return EXIT_SUCCESS;
    }

    let args = Args::parse();

    if let Some(ref level) = args.log_level {
        dir_projector::logger::JsonLogger::init_with_level(level, "CLI --log-level");
    } else {
        dir_projector::logger::JsonLogger::init();
    }

    let options = BuildOptions {
        launchers_dir: args.launchers,
    };

    match build_projector(&args.manifest, args.output.as_deref(), options) {
        Ok(report) => {
            for (name, count) in report.patches.counts() {
                log::info!("🩹 {name}: {count} file(s) patched");
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("Build error: {}", e);
            exit_code(&e)
        }
    }
}
