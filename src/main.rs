//! Portfolio Simulation CLI
//!
//! Command-line interface for Monte Carlo studies, single projections,
//! sensitivity analysis and scenario comparison

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use portfolio_simulation::metrics::MetricSummary;
use portfolio_simulation::monte_carlo::{MonteCarloConfig, MonteCarloResult, MonteCarloSession, Progress, SessionObserver, SessionOutcome};
use portfolio_simulation::params::load_parameters;
use portfolio_simulation::scenario::{
    NamedScenario, PortfolioProjection, ScenarioRunner, ScenarioSummary, SensitivityParameter, SensitivityReport,
    DEFAULT_VARIATIONS,
};
use portfolio_simulation::SimulationParameters;

#[derive(Parser)]
#[command(
    name = "portfolio_simulation",
    version,
    about = "Loan portfolio cash-flow simulation and Monte Carlo risk engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Parameter file (JSON, camelCase keys); defaults when omitted
    #[arg(long, global = true)]
    params: Option<PathBuf>,

    /// Seed for reproducible runs
    #[arg(long, env = "SIM_SEED", global = true)]
    seed: Option<u64>,

    /// Monte Carlo runs per chunk
    #[arg(long, env = "SIM_CHUNK_SIZE", global = true)]
    chunk_size: Option<u32>,

    /// Write the yearly time series to this CSV file
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    /// Write the full result as JSON to this file ("-" for stdout)
    #[arg(long, global = true)]
    json: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Monte Carlo study of the base case
    MonteCarlo {
        /// Override the number of simulations
        #[arg(long)]
        simulations: Option<u32>,
    },
    /// Single projection of the base case without parameter perturbation
    Project,
    /// Rerun the study with parameters varied one at a time
    Sensitivity {
        /// Parameters to vary, e.g. interestRate,defaultRate
        #[arg(long, value_delimiter = ',', value_parser = parse_parameter)]
        parameters: Vec<SensitivityParameter>,

        /// Relative variations, e.g. -0.2,0.2
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        variations: Vec<f64>,
    },
    /// Compare parameter files under a common seed
    Compare {
        /// Scenario parameter files; each is named after its file stem
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,
    },
}

fn parse_parameter(s: &str) -> Result<SensitivityParameter, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown sensitivity parameter `{}`", s))
}

/// Prints chunk progress to stderr
struct ConsoleProgress;

impl SessionObserver for ConsoleProgress {
    fn on_progress(&mut self, progress: &Progress) {
        eprintln!(
            "  chunk {}/{}: {}/{} runs ({:.1}%)",
            progress.chunk, progress.total_chunks, progress.completed, progress.total, progress.percent
        );
    }
}

/// One row of the Monte Carlo time-series export
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct YearRow {
    year: usize,
    fund_cash_flow: f64,
    lp_cash_flow: f64,
    gp_cash_flow: f64,
    portfolio_value: f64,
    p5: f64,
    p25: f64,
    p50: f64,
    p75: f64,
    p95: f64,
    irr_to_date: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut params = match &cli.params {
        Some(path) => load_parameters(path).with_context(|| format!("loading {}", path.display()))?,
        None => SimulationParameters::default(),
    };
    params.seed = cli.seed.or(params.seed);

    let mut config = MonteCarloConfig {
        seed: cli.seed,
        ..MonteCarloConfig::default()
    };
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }

    println!("Portfolio Simulation v{}", env!("CARGO_PKG_VERSION"));
    println!("===========================\n");

    match cli.command {
        Command::MonteCarlo { simulations } => {
            if let Some(n) = simulations {
                params.num_simulations = n;
            }
            print_parameters(&params);
            let result = monte_carlo(params, config)?;
            print_monte_carlo(&result);
            if let Some(path) = &cli.csv {
                write_time_series(path, &result)?;
                println!("\nTime series written to: {}", path.display());
            }
            write_json(cli.json.as_deref(), &result)?;
        }
        Command::Project => {
            print_parameters(&params);
            let projection = ScenarioRunner::new(params)?.with_config(config).project()?;
            print_projection(&projection);
            if let Some(path) = &cli.csv {
                let mut writer = csv::Writer::from_path(path)?;
                for row in &projection.series.rows {
                    writer.serialize(row)?;
                }
                writer.flush()?;
                println!("\nYearly series written to: {}", path.display());
            }
            write_json(cli.json.as_deref(), &projection)?;
        }
        Command::Sensitivity { parameters, variations } => {
            let parameters = if parameters.is_empty() {
                SensitivityParameter::DEFAULTS.to_vec()
            } else {
                parameters
            };
            let variations = if variations.is_empty() {
                DEFAULT_VARIATIONS.to_vec()
            } else {
                variations
            };
            print_parameters(&params);
            let report = ScenarioRunner::new(params)?
                .with_config(config)
                .sensitivity(&parameters, &variations)?;
            print_sensitivity(&report);
            write_json(cli.json.as_deref(), &report)?;
        }
        Command::Compare { scenarios } => {
            let named = scenarios
                .iter()
                .map(|path| -> Result<NamedScenario> {
                    Ok(NamedScenario {
                        name: scenario_name(path),
                        params: load_parameters(path).with_context(|| format!("loading {}", path.display()))?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let runner = ScenarioRunner::new(params)?.with_config(config);
            let summaries = runner.run_batch(&named)?;
            print_comparison(&summaries);
            write_json(cli.json.as_deref(), &summaries)?;
        }
    }

    Ok(())
}

fn monte_carlo(params: SimulationParameters, config: MonteCarloConfig) -> Result<MonteCarloResult> {
    let mut session = MonteCarloSession::new(params, config)?;
    println!(
        "Running {} simulations in {} chunks...",
        session.total(),
        session.total_chunks()
    );
    match session.run(&mut ConsoleProgress)? {
        SessionOutcome::Completed(result) => Ok(*result),
        SessionOutcome::Cancelled { processed, .. } => bail!("session stopped after {} runs", processed),
    }
}

fn scenario_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_parameters(params: &SimulationParameters) {
    println!("Fund: ${:.0}", params.initial_investment);
    println!("  Horizon: {} years", params.time_horizon);
    println!("  Interest: {:.2}%", params.interest_rate);
    println!("  Appreciation: {:.2}%", params.property_appreciation);
    println!("  Default: {:.2}%", params.default_rate);
    println!("  Waterfall: {:?}", params.waterfall_type);
    println!("  Seed: {:?}", params.seed);
    println!();
}

fn summary_line(label: &str, summary: Option<&MetricSummary>, scale: f64, unit: &str) {
    match summary {
        Some(s) => println!(
            "  {:<18} mean {:>12.4}{} median {:>12.4}{} min {:>12.4}{} max {:>12.4}{}",
            label,
            s.mean * scale,
            unit,
            s.median * scale,
            unit,
            s.min * scale,
            unit,
            s.max * scale,
            unit
        ),
        None => println!("  {:<18} n/a", label),
    }
}

fn print_monte_carlo(result: &MonteCarloResult) {
    let stats = &result.statistics;
    println!("\nMonte Carlo Results ({} runs, seed {:?}):", result.num_simulations, result.seed);
    summary_line("Final value ($)", stats.final_value.as_ref(), 1.0, "");
    summary_line("IRR (%)", stats.irr.as_ref(), 100.0, "");
    summary_line("LP IRR (%)", stats.lp_irr.as_ref(), 100.0, "");
    summary_line("Equity multiple", stats.equity_multiple.as_ref(), 1.0, "x");
    summary_line("Sharpe ratio", stats.sharpe_ratio.as_ref(), 1.0, "");
    summary_line("Max drawdown (%)", stats.max_drawdown.as_ref(), 100.0, "");
    if stats.non_convergent_irr > 0 {
        println!("  {} runs without an IRR", stats.non_convergent_irr);
    }

    let risk = &result.risk_metrics;
    println!("\nRisk:");
    println!("  VaR 95%: {:?}", risk.var_95);
    println!("  VaR 99%: {:?}", risk.var_99);
    println!("  IRR VaR 95%: {:?}", risk.irr_var_95);

    let revenue = &result.revenue_streams;
    println!("\nManager revenue (mean per run):");
    println!("  Management fees: ${:.2}", revenue.management_fees);
    println!("  Upfront fees: ${:.2}", revenue.upfront_fees);
    println!("  Performance fees: ${:.2}", revenue.performance_fees);
    println!("  Total: ${:.2}", revenue.total);

    println!(
        "\nCache: {} entries, {:.1}% hit rate",
        result.cache.entries,
        result.cache.hit_rate * 100.0
    );
}

fn print_projection(projection: &PortfolioProjection) {
    println!(
        "Book: {} loans, ${:.0} principal, {:.1} years average term",
        projection.book.loan_count, projection.book.total_principal, projection.book.average_term_years
    );
    println!();
    println!(
        "{:>4} {:>16} {:>16} {:>16} {:>16} {:>16}",
        "Year", "Fund CF", "LP CF", "Deployed", "NAV", "Value"
    );
    println!("{}", "-".repeat(90));
    for (row, lp) in projection.series.rows.iter().zip(&projection.distribution.lp_cash_flows) {
        println!(
            "{:>4} {:>16.2} {:>16.2} {:>16.2} {:>16.2} {:>16.2}",
            row.period, row.fund_cash_flow, lp, row.deployed, row.net_asset_value, row.portfolio_value
        );
    }

    let metrics = &projection.metrics;
    println!("\nSummary:");
    println!("  IRR: {}", pct(metrics.irr));
    println!("  LP IRR: {}", pct(metrics.lp_irr));
    println!("  Equity multiple: {:.3}x", metrics.equity_multiple);
    println!("  Max drawdown: {:.2}%", metrics.max_drawdown * 100.0);
    println!("  Early repayment rate: {:.2}%", metrics.early_repayment_rate * 100.0);
    let outcomes = &projection.outcomes;
    println!(
        "  Loans: {} funded, {} defaulted, {} early, {} scheduled, {} matured, {} settled at horizon",
        outcomes.funded,
        outcomes.defaulted,
        outcomes.early_exit,
        outcomes.scheduled_exit,
        outcomes.matured,
        outcomes.settled_at_horizon
    );
}

fn print_sensitivity(report: &SensitivityReport) {
    println!("\nSensitivity Results:");
    println!(
        "{:<22} {:>9} {:>14} {:>10} {:>10} {:>16}",
        "Parameter", "Change", "Value", "IRR", "Multiple", "Final value"
    );
    println!("{}", "-".repeat(86));
    for point in std::iter::once(&report.base).chain(&report.points) {
        let name = point
            .parameter
            .map(|p| format!("{:?}", p))
            .unwrap_or_else(|| "base".to_string());
        if let Some(error) = &point.error {
            println!("{:<22} {:>+8.0}% {}", name, point.variation * 100.0, error);
            continue;
        }
        println!(
            "{:<22} {:>+8.0}% {:>14} {:>10} {:>10} {:>16}",
            name,
            point.variation * 100.0,
            point.value.map(|v| format!("{:.4}", v)).unwrap_or_default(),
            pct(point.mean_irr),
            point.mean_equity_multiple.map(|m| format!("{:.3}x", m)).unwrap_or_default(),
            point.mean_final_value.map(|v| format!("{:.0}", v)).unwrap_or_default(),
        );
    }
}

fn print_comparison(summaries: &[ScenarioSummary]) {
    println!("\nScenario Comparison:");
    println!(
        "{:<20} {:>10} {:>10} {:>16} {:>10} {:>16}",
        "Scenario", "IRR", "Multiple", "Final value", "VaR 95%", "Manager rev."
    );
    println!("{}", "-".repeat(88));
    for s in summaries {
        println!(
            "{:<20} {:>10} {:>10} {:>16} {:>10} {:>16.0}",
            s.name,
            pct(s.statistics.irr.map(|m| m.mean)),
            s.statistics
                .equity_multiple
                .map(|m| format!("{:.3}x", m.mean))
                .unwrap_or_default(),
            s.statistics.final_value.map(|m| format!("{:.0}", m.mean)).unwrap_or_default(),
            s.risk_metrics.var_95.map(|v| format!("{:.4}", v)).unwrap_or_default(),
            s.revenue_streams.total,
        );
    }
}

fn pct(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.2}%", r * 100.0)).unwrap_or_else(|| "n/a".to_string())
}

fn write_time_series(path: &Path, result: &MonteCarloResult) -> Result<()> {
    let series = &result.time_series;
    let mut writer = csv::Writer::from_path(path)?;
    for (year, band) in result.percentile_bands.iter().enumerate() {
        let at = |v: &[f64]| v.get(year).copied().unwrap_or(0.0);
        writer.serialize(YearRow {
            year,
            fund_cash_flow: at(&series.fund_cash_flows),
            lp_cash_flow: at(&series.lp_cash_flows),
            gp_cash_flow: at(&series.gp_cash_flows),
            portfolio_value: at(&series.portfolio_values),
            p5: band.p5,
            p25: band.p25,
            p50: band.p50,
            p75: band.p75,
            p95: band.p95,
            irr_to_date: year.checked_sub(1).and_then(|i| series.irr_by_year.get(i).copied().flatten()),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize>(target: Option<&Path>, value: &T) -> Result<()> {
    let Some(target) = target else {
        return Ok(());
    };
    if target == Path::new("-") {
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, value)?;
        writeln!(stdout)?;
    } else {
        let file = File::create(target).with_context(|| format!("creating {}", target.display()))?;
        serde_json::to_writer_pretty(file, value)?;
        println!("Results written to: {}", target.display());
    }
    Ok(())
}
