use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Phase binaries and the archive each one is packaged into.
const PHASE_LAMBDAS: [(&str, &str); 3] = [
    ("initializer_lambda", "initializer.zip"),
    ("executor_lambda", "executor.zip"),
    ("cleaner_lambda", "cleaner.zip"),
];

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the Lambda power tuning workspace"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the unit tests of both crates
    Test,
    /// Run CI checks (fmt, clippy, tests)
    Ci,
    /// Build the phase binaries and zip each one as a `bootstrap` artifact
    ServerlessPackage {
        /// Compilation target triple for Lambda binaries
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for binaries
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Directory receiving the zip artifacts
        #[arg(long, env = "POWER_TUNING_DIST_DIR", default_value = "dist")]
        out_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn run_cargo(args: &[&str]) {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo");
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_tests() {
    step("Test power_tuning_core");
    run_cargo(&["test", "-p", "power_tuning_core"]);

    step("Test power_tuning_lambda");
    run_cargo(&["test", "-p", "power_tuning_lambda"]);
}

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    run_tests();
}

fn package_phase_lambdas(target: &str, profile: BuildProfile, out_dir: &Path) {
    if !rust_target_installed(target) {
        eprintln!(
            "error: rust target `{target}` is not installed; run `rustup target add {target}`"
        );
        exit(1);
    }

    step("Build phase lambda binaries");
    let mut cargo_args = vec!["build", "-p", "power_tuning_lambda", "--target", target];
    for (bin_name, _) in PHASE_LAMBDAS {
        cargo_args.extend(["--bin", bin_name]);
    }
    cargo_args.extend(profile.as_cargo_flag());
    run_cargo(&cargo_args);

    step("Package lambda zip artifacts");
    let binaries_dir = Path::new("target").join(target).join(profile.dir_name());
    let packaged: Result<Vec<PathBuf>, String> = fs::create_dir_all(out_dir)
        .map_err(|error| format!("cannot create '{}': {error}", out_dir.display()))
        .and_then(|()| {
            PHASE_LAMBDAS
                .iter()
                .map(|(bin_name, archive)| {
                    let zip_path = out_dir.join(archive);
                    zip_as_bootstrap(&binaries_dir.join(bin_name), &zip_path)?;
                    Ok(zip_path)
                })
                .collect()
        });

    match packaged {
        Ok(paths) => {
            eprintln!("\nPackaged artifacts:");
            for path in paths {
                eprintln!("- {}", path.display());
            }
        }
        Err(message) => {
            eprintln!("error: {message}");
            exit(1);
        }
    }
}

/// Missing `rustup` skips the check; cargo reports a missing target itself.
fn rust_target_installed(target: &str) -> bool {
    Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| {
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .any(|line| line.trim() == target)
        })
        .unwrap_or(true)
}

/// The provided Lambda runtime expects a single executable named `bootstrap`.
fn zip_as_bootstrap(binary_path: &Path, zip_path: &Path) -> Result<(), String> {
    let binary = fs::read(binary_path)
        .map_err(|error| format!("cannot read '{}': {error}", binary_path.display()))?;
    let file = fs::File::create(zip_path)
        .map_err(|error| format!("cannot create '{}': {error}", zip_path.display()))?;

    let mut archive = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    archive
        .start_file("bootstrap", options)
        .and_then(|()| archive.write_all(&binary).map_err(Into::into))
        .and_then(|()| archive.finish().map(|_| ()))
        .map_err(|error| format!("cannot write '{}': {error}", zip_path.display()))
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test => run_tests(),
        Commands::Ci => {
            ci_check();
            eprintln!("\nCI job passed.");
        }
        Commands::ServerlessPackage {
            target,
            profile,
            out_dir,
        } => package_phase_lambdas(&target, profile, &out_dir),
    }
}
