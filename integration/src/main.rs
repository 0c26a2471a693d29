use std::{fs::File, io::Write, path::PathBuf, process::exit};

use ark_spdz::{algebra::Scalar, EvaluationStrategy, ExecutorConfig, FlushPolicy};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use tokio::runtime::Builder as RuntimeBuilder;
use tracing::log::{self, LevelFilter};

mod arithmetic;
mod combinators;
mod helpers;
mod mac_check;

/// The field used for testing, set to the bn254 scalar field
pub type TestField = ark_bn254::Fr;
/// The scalar type used for testing
pub type TestScalar = Scalar<TestField>;

/// Integration test arguments, common to all tests
#[derive(Clone, Debug)]
struct IntegrationTestArgs {
    /// The number of parties to run each test between
    n_parties: usize,
    /// The configuration every party's executor runs with
    config: ExecutorConfig,
}

/// Integration test format
#[derive(Clone)]
struct IntegrationTest {
    pub name: &'static str,
    pub test_fn: fn(&IntegrationTestArgs) -> Result<(), String>,
}

// Collect the statically defined tests into an interable
inventory::collect!(IntegrationTest);

/// The command line interface for the test harness
#[derive(Clone, Parser, Debug)]
struct Args {
    /// The number of parties to run each test between, run in-process over a
    /// mock network
    #[clap(short = 'n', long, default_value = "3", value_parser)]
    parties: usize,
    /// The test to run
    #[clap(short, long, value_parser)]
    test: Option<String>,
    /// A JSON file holding the executor configuration
    #[clap(long, value_parser)]
    config: Option<PathBuf>,
    /// Drive the instructions of a batch one at a time
    #[clap(long, takes_value = false, value_parser)]
    sequential: bool,
    /// Exchange messages on every round
    #[clap(long = "flush-every-round", takes_value = false, value_parser)]
    flush_every_round: bool,
}

impl Args {
    /// Build the executor configuration from the config file and flags
    fn executor_config(&self) -> Result<ExecutorConfig, String> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .map_err(|err| format!("error opening {}: {err}", path.display()))?;
                serde_json::from_reader(file)
                    .map_err(|err| format!("error parsing {}: {err}", path.display()))?
            },
            None => ExecutorConfig::default(),
        };

        if self.sequential {
            config = config.with_strategy(EvaluationStrategy::Sequential);
        }
        if self.flush_every_round {
            config = config.with_flush_policy(FlushPolicy::EveryRound);
        }

        config.validate().map_err(|err| err.to_string())?;
        Ok(config)
    }
}

fn main() {
    // Setup logging
    init_logger();

    // Parse the cli args
    let args = Args::parse();
    if args.parties < 2 {
        log::error!("integration tests need at least two parties");
        exit(-1);
    }

    let config = match args.executor_config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            exit(-1);
        },
    };
    let test_args = IntegrationTestArgs { n_parties: args.parties, config };

    // Build a runtime to execute within
    let runtime = RuntimeBuilder::new_multi_thread().enable_all().build().unwrap();

    // The tests block on their futures, so the harness runs on a blocking
    // thread of the runtime
    let result = runtime.spawn_blocking(move || {
        let banner = format!("Running integration tests with {} parties...", args.parties);
        println!("\n\n{}\n", banner.blue());

        let mut all_success = true;
        for test in inventory::iter::<IntegrationTest> {
            if args.test.is_some() && args.test.as_deref().unwrap() != test.name {
                continue;
            }

            print!("Running {}... ", test.name);
            let res = (test.test_fn)(&test_args);
            all_success &= validate_success(res);
        }

        all_success
    });

    let all_success = runtime.block_on(result).unwrap();
    if all_success {
        log::info!("{}", "Integration tests successful!".green());
        exit(0);
    }

    exit(-1);
}

/// Setups up logging for the test suite
fn init_logger() {
    // Configure logging
    Builder::new()
        .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
        .filter(None, LevelFilter::Info)
        .init();
}

/// Prints a success or failure message, returns true if success, false if
/// failure
#[inline]
fn validate_success(res: Result<(), String>) -> bool {
    match res {
        Ok(()) => {
            println!("{}", "Success!".green());
            true
        },
        Err(err) => {
            println!("{}\n\t{err}", "Failure...".red());
            false
        },
    }
}
