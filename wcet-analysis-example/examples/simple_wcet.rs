use anyhow::Context;
use colored::Colorize;
use ipet::prelude::*;
use tracing::Level;
use wcet_analysis_examples::{sample_database, sample_program, MAIN};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    println!("Simple WCET analysis");

    let program = sample_program().context("Unable to build the sample program")?;
    let database = sample_database().context("Unable to build the sample database")?;
    let cfg = RunConfig::from_env().context("Invalid run configuration")?;

    let mut engine = CalculationEngine::new(&program, &database, cfg);
    engine.run()?;

    for failure in engine.failures() {
        println!("{}: {}", failure.to_string().red(), failure.error);
    }
    let solution = engine
        .solution(MAIN)
        .context("No WCET computed for main")?;

    println!(
        "Found {} edges and the longest path takes {} cycles.",
        solution.execution_counts().len(),
        solution.wcet()
    );
    print!("{solution}");
    Ok(())
}
