use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use opi::config::Config;
use opi::orbit::{julian_day, Orbit};
use opi::{Backend, DataCategory, Host, PropagationMode};
use serde::Serialize;
use std::f64::consts::TAU;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// OPI - host runtime for orbital propagator plugins
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Additional plugin libraries to load
    #[arg(short, long = "plugin")]
    plugins: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List loaded plugins and their capabilities
    Plugins,

    /// Propagate a generated population
    Propagate {
        /// Propagator to use, defaults to the configured one
        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Number of objects
        #[arg(long, default_value_t = 200)]
        objects: usize,

        /// Number of steps
        #[arg(long, default_value_t = 10)]
        steps: u32,

        /// Step size in seconds
        #[arg(long, default_value_t = 60.0, allow_negative_numbers = true)]
        dt: f64,

        /// Start epoch (RFC 3339), defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Write the final population to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the plugin interface description as JSON
    Interface,
}

#[derive(Serialize)]
struct PluginSummary<'a> {
    name: &'a str,
    version: String,
    author: &'a str,
    description: &'a str,
    state: String,
    dynamic: bool,
    capabilities: &'a opi::plugins::Capabilities,
}

#[derive(Serialize)]
struct PropagationSummary {
    propagator: String,
    objects: usize,
    steps: u32,
    start_epoch: f64,
    final_epoch: Option<f64>,
    mean_radius_km: f64,
    invalid_objects: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    if let Command::Interface = args.command {
        println!("{}", serde_json::to_string_pretty(&opi::interface::describe())?);
        return Ok(());
    }

    let mut config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_default()?
    };
    config.plugins.paths.extend(args.plugins.iter().cloned());

    let mut host = Host::from_config(&config);
    host.set_error_callback(|host, code| {
        tracing::error!(%host, %code, "host operation failed");
    });

    match args.command {
        Command::Plugins => list_plugins(&host),
        Command::Propagate {
            name,
            objects,
            steps,
            dt,
            start,
            output,
        } => {
            let name = name
                .or_else(|| host.active_propagator().map(str::to_string))
                .context("No propagator given and no default configured")?;
            let start = julian_day(start.unwrap_or_else(Utc::now));
            let summary = propagate(&mut host, &name, objects, steps, dt, start, output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Interface => Ok(()),
    }
}

fn list_plugins(host: &Host) -> Result<()> {
    let summaries: Vec<PluginSummary<'_>> = host
        .plugins()
        .iter()
        .map(|entry| {
            let propagator = entry.propagator();
            let descriptor = propagator.descriptor();
            PluginSummary {
                name: &descriptor.name,
                version: descriptor.version.to_string(),
                author: &descriptor.author,
                description: &descriptor.description,
                state: entry.state().to_string(),
                dynamic: propagator.is_dynamic(),
                capabilities: propagator.capabilities(),
            }
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

fn propagate(
    host: &mut Host,
    name: &str,
    objects: usize,
    steps: u32,
    dt: f64,
    start: f64,
    output: Option<PathBuf>,
) -> Result<PropagationSummary> {
    if objects == 0 {
        bail!("Population must contain at least one object");
    }
    host.enable(name)?;
    host.select_propagator(name)?;

    let mut population = host.create_population(objects);
    population.set_name(format!("{name} demo"));
    seed_orbits(population.orbits(Backend::Host)?);
    population.update(DataCategory::Orbit, Backend::Host)?;

    info!(plugin = %name, objects, steps, dt, "propagating");
    for step in 1..=steps {
        host.propagate(
            &mut population,
            start,
            dt * f64::from(step),
            PropagationMode::Full,
        )
        .with_context(|| format!("Propagation step {step} failed"))?;
    }

    let positions = population.positions(Backend::Host)?;
    let mean_radius_km =
        positions.iter().map(|p| p.length()).sum::<f64>() / positions.len() as f64;
    let invalid_objects = population.validate()?.len();

    if let Some(path) = output {
        population.write_to_file(&path)?;
        info!(path = %path.display(), "population written");
    }

    Ok(PropagationSummary {
        propagator: name.to_string(),
        objects,
        steps,
        start_epoch: start,
        final_epoch: population.last_propagation_epoch(),
        mean_radius_km,
        invalid_objects,
    })
}

/// Deterministic low Earth orbit shell.
fn seed_orbits(orbits: &mut [Orbit]) {
    let count = orbits.len() as f64;
    for (i, orbit) in orbits.iter_mut().enumerate() {
        let fraction = i as f64 / count;
        orbit.semi_major_axis = 6800.0 + 400.0 * fraction;
        orbit.eccentricity = 0.001 + 0.01 * fraction;
        orbit.inclination = 0.9 + 0.3 * fraction;
        orbit.raan = TAU * fraction;
        orbit.arg_of_perigee = 0.0;
        orbit.mean_anomaly = (TAU * 7.0 * fraction).rem_euclid(TAU);
    }
}
