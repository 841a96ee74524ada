use allocbench::{Config, diag, runner};

use anyhow::Context;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    diag::set_verbose(config.verbose);

    config.validate().context("invalid configuration")?;

    let several = config.variant.expand().len() > 1;
    for &v in config.variant.expand() {
        let report = runner::run_variant(&config, v).with_context(|| format!("{} benchmark failed", v.name()))?;

        // A lone run prints exactly its two result lines.
        if several {
            println!("# {}", report.name);
        }
        report.print();
    }

    Ok(())
}
