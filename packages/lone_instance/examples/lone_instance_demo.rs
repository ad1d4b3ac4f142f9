//! Demonstrates the process-wide shared instance.
//!
//! Accesses the instance twice from the main thread, printing whether each access created it,
//! then optionally races a number of threads against it and reports how many distinct
//! instances they observed (always one).
//!
//! Run with: `cargo run --example lone_instance_demo -- --callers 100 --verbose`.

use std::collections::HashSet;
use std::ptr;

use argh::FromArgs;
use lone_instance::{Instance, Outcome, get_instance_with_outcome};
use testing::run_concurrently;
use tracing::Level;

/// Accesses the process-wide shared instance and shows that it is created only once.
#[derive(FromArgs)]
struct Args {
    /// number of additional threads that access the instance concurrently
    #[argh(option, default = "1")]
    callers: usize,

    /// log every access, not only the construction
    #[argh(switch)]
    verbose: bool,
}

#[cfg_attr(test, mutants::skip)] // Example entry point, nothing to assert on.
fn main() {
    let args: Args = argh::from_env();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::TRACE } else { Level::INFO })
        .init();

    let first = access("main thread, first access");
    let second = access("main thread, second access");

    println!("{:p}", ptr::from_ref(first));
    println!("{:p}", ptr::from_ref(second));
    println!("{}", second.do_something());

    // A panicking caller is propagated rather than left out of the count.
    let addresses = run_concurrently(args.callers, || {
        ptr::from_ref(get_instance_with_outcome().0).addr()
    })
    .into_iter()
    .collect::<HashSet<_>>();

    println!(
        "{} concurrent callers observed {} distinct instance(s)",
        args.callers,
        addresses.len()
    );
}

fn access(label: &str) -> &'static Instance {
    let (instance, outcome) = get_instance_with_outcome();

    match outcome {
        Outcome::Constructed => println!("{label}: creating single instance now."),
        _ => println!("{label}: single instance already created."),
    }

    instance
}
