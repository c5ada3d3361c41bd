//! Reference plugin: rule table queries over stdio.

use std::io::{self, BufReader, Write};

use oxbow_plugins::capability::RulesCapability;
use oxbow_plugins::{Plugin, run, telemetry};

fn main() {
    telemetry::initialise();

    let mut plugin = Plugin::new(
        env!("CARGO_PKG_VERSION"),
        vec![Box::new(RulesCapability::new())],
    );

    let stdin = io::stdin();
    let reader = BufReader::new(stdin.lock());
    let stdout = io::stdout();
    let writer = stdout.lock();

    if let Err(error) = run(&mut plugin, reader, writer) {
        writeln!(io::stderr().lock(), "{error}").ok();
        std::process::exit(1);
    }
}
