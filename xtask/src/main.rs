use std::path::PathBuf;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the mixed-traffic scenario engine workspace",
    long_about = "A unified CLI for running the scenario demo, the test suites\n\
                  and CI checks in the mixed-traffic workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the two-driver collision scenario and print its timeline
    Demo {
        /// SQLite file the demo writes to
        #[arg(long, env = "MIXED_TRAFFIC_DB_PATH", default_value = "target/scenario_demo.sqlite3")]
        db_path: PathBuf,
        /// Keep the database from a previous run instead of starting fresh
        #[arg(long)]
        keep: bool,
    },
    /// Run unit and integration tests
    Test {
        /// Restrict to one suite
        #[arg(value_enum, default_value_t = TestSuite::All)]
        suite: TestSuite,
    },
    /// Run CI checks (fmt, clippy, tests, demo)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum TestSuite {
    /// Pure domain crate
    Core,
    /// Engine unit tests and lifecycle integration tests
    Engine,
    /// Concurrent submission tests
    Concurrency,
    All,
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build and run the scenario demo
    Demo,
    /// Run check + demo
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str], envs: &[(&str, &str)]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .envs(envs.iter().copied())
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    run_cargo_with_env(args, &[]);
}

fn run_cargo_with_env(args: &[&str], envs: &[(&str, &str)]) {
    let status = cargo(args, envs);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_demo(db_path: &PathBuf, keep: bool) {
    if !keep {
        for suffix in ["", "-wal", "-shm"] {
            let mut stale = db_path.clone().into_os_string();
            stale.push(suffix);
            let stale = PathBuf::from(stale);
            if stale.exists() {
                std::fs::remove_file(&stale).expect("failed to remove previous demo database");
            }
        }
    }
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).expect("failed to create demo database directory");
    }

    let db_path = db_path.to_string_lossy();
    run_cargo_with_env(
        &["run", "-p", "mixed_traffic_engine", "--bin", "scenario_demo"],
        &[("MIXED_TRAFFIC_DB_PATH", db_path.as_ref())],
    );
}

fn run_tests(suite: TestSuite) {
    match suite {
        TestSuite::Core => {
            step("Test mixed_traffic_core");
            run_cargo(&["test", "-p", "mixed_traffic_core"]);
        }
        TestSuite::Engine => {
            step("Test mixed_traffic_engine (unit)");
            run_cargo(&["test", "-p", "mixed_traffic_engine", "--lib"]);
            step("Test mixed_traffic_engine (lifecycle)");
            run_cargo(&[
                "test",
                "-p",
                "mixed_traffic_engine",
                "--test",
                "integration_scenario_lifecycle_tests",
            ]);
        }
        TestSuite::Concurrency => {
            step("Test mixed_traffic_engine (concurrency)");
            run_cargo(&[
                "test",
                "-p",
                "mixed_traffic_engine",
                "--test",
                "integration_concurrent_submission_tests",
            ]);
        }
        TestSuite::All => {
            run_tests(TestSuite::Core);
            run_tests(TestSuite::Engine);
            run_tests(TestSuite::Concurrency);
        }
    }
}

// ── CI jobs ────────────────────────────────────────────────────────

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

    run_tests(TestSuite::All);
}

fn ci_demo() {
    step("Run scenario_demo");
    run_demo(&PathBuf::from("target/ci_scenario_demo.sqlite3"), false);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { db_path, keep } => run_demo(&db_path, keep),
        Commands::Test { suite } => run_tests(suite),
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Demo => ci_demo(),
                CiJob::All => {
                    ci_check();
                    ci_demo();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
