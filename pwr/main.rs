use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pwr::{parse_cpu_list, Profile, System};

#[derive(Parser, Debug)]
#[command(name = "pwrctl")]
#[command(about = "Inspect and steer CPU core, uncore and package power state")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(
        short,
        long,
        global = true,
        help = "Enable verbose logging (shows all MSR/sysfs operations)"
    )]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show discovered topology, capabilities and live state
    Show,

    /// Commit desired frequency limits and EPP to a set of cores
    Set {
        #[arg(
            long = "core",
            help = "Cores to update (ranges and comma lists: --core 0-3,8)",
            action = clap::ArgAction::Append
        )]
        cores: Vec<String>,

        #[arg(long, help = "Named profile: minimum, maximum, base, default, no_turbo, sst_bf")]
        profile: Option<String>,

        #[arg(long, help = "Desired minimum frequency in MHz")]
        min: Option<u32>,

        #[arg(long, help = "Desired maximum frequency in MHz")]
        max: Option<u32>,

        #[arg(long, help = "Energy performance preference string")]
        epp: Option<String>,
    },

    /// Commit desired uncore frequency limits on one package
    Uncore {
        #[arg(long, help = "Package id")]
        package: usize,

        #[arg(long, help = "Desired minimum uncore frequency in MHz")]
        min: Option<u32>,

        #[arg(long, help = "Desired maximum uncore frequency in MHz")]
        max: Option<u32>,
    },

    /// Sample average package power over an interval
    Power {
        #[arg(long, default_value_t = 1, help = "Seconds between samples")]
        interval: u64,

        #[arg(long, default_value_t = 10, help = "Number of samples")]
        count: u32,
    },

    /// SST-BF status and dry-run configuration check
    SstBf,

    /// Raw MSR access
    Msr {
        #[command(subcommand)]
        command: MsrCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MsrCommand {
    /// Read an 8-byte register word
    Read {
        #[arg(help = "Logical core id")]
        core: u32,

        #[arg(help = "MSR address, hex (0x620) or decimal", value_parser = parse_msr_addr)]
        msr: u64,
    },

    /// Write an 8-byte register word
    Write {
        #[arg(help = "Logical core id")]
        core: u32,

        #[arg(help = "MSR address, hex (0x620) or decimal", value_parser = parse_msr_addr)]
        msr: u64,

        #[arg(help = "Value, hex or decimal", value_parser = parse_msr_addr)]
        value: u64,
    },
}

fn parse_msr_addr(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

/// Parse a list of range strings like ["0-3", "5,8"] into core ids.
fn parse_range_list(inputs: &[String]) -> Vec<u32> {
    let mut result = Vec::new();
    for input in inputs {
        match parse_cpu_list(input) {
            Some(ids) => result.extend(ids),
            None => tracing::warn!("Failed to parse core list: {}", input),
        }
    }
    result.sort_unstable();
    result.dedup();
    result
}

fn check_permissions() {
    let msr_path = "/dev/cpu/0/msr";
    if std::fs::metadata(msr_path).is_err() {
        eprintln!("ERROR: cannot access {msr_path}\n\nThe msr kernel module may not be loaded.\nRun: sudo modprobe msr");
        std::process::exit(1);
    }

    if let Err(e) = std::fs::File::open(msr_path) {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            eprintln!("ERROR: permission denied accessing {msr_path}\n\nRun as root.");
            std::process::exit(1);
        }
    }
}

fn show(system: &System) {
    println!(
        "system: sst_bf_enabled={} sst_bf_configured={} epp_enabled={}",
        system.sst_bf_enabled, system.sst_bf_configured, system.epp_enabled
    );
    for package in &system.packages {
        println!(
            "package {} (physical {}): base {} MHz, range [{}, {}] MHz, \
             all-core turbo {} MHz, tdp {:.1} W, turbo={} hwp={}",
            package.package_id,
            package.physical_id,
            package.base_freq,
            package.lowest_freq,
            package.highest_freq,
            package.all_core_turbo_freq,
            package.tdp,
            package.turbo_enabled,
            package.hwp_enabled,
        );
        println!(
            "  uncore: current {} MHz, desired [{}, {}] MHz; power {:.1} W",
            package.uncore_freq,
            package.uncore_min_freq,
            package.uncore_max_freq,
            package.power_consumption,
        );
        for core in &package.cores {
            println!(
                "  core {:>3}: curr {} MHz, desired [{}, {}] MHz, epp {}, \
                 sst_bf_base {}, priority {}{}",
                core.core_id,
                core.curr_freq,
                core.min_freq,
                core.max_freq,
                core.epp.as_deref().unwrap_or("-"),
                core.sst_bf_base_freq
                    .map_or_else(|| "-".into(), |f| f.to_string()),
                if core.high_priority { "high" } else { "normal" },
                if core.online { "" } else { " (offline)" },
            );
        }
    }
}

fn run_set(
    system: &mut System,
    cores: &[String],
    profile: Option<String>,
    min: Option<u32>,
    max: Option<u32>,
    epp: Option<String>,
) -> anyhow::Result<()> {
    let profile = profile.map(|p| p.parse::<Profile>()).transpose()?;
    let selected = parse_range_list(cores);
    if selected.is_empty() {
        anyhow::bail!("no cores selected, pass --core");
    }

    for core_id in selected {
        let core = system
            .core_mut(core_id)
            .with_context(|| format!("no such core: {core_id}"))?;
        if let Some(min) = min {
            core.min_freq = min;
        }
        if let Some(max) = max {
            core.max_freq = max;
        }
        if let Some(epp) = &epp {
            core.epp = Some(epp.clone());
        }
        core.commit(profile)
            .with_context(|| format!("commit failed on core {core_id}"))?;
        println!(
            "core {}: committed [{}, {}] MHz{}",
            core_id,
            core.min_freq,
            core.max_freq,
            core.epp
                .as_deref()
                .map_or_else(String::new, |e| format!(", epp {e}")),
        );
    }
    Ok(())
}

fn run_power(system: &mut System, interval: u64, count: u32) -> anyhow::Result<()> {
    // first pass primes each package's sample baseline
    for package in &mut system.packages {
        package.refresh_power()?;
    }
    for _ in 0..count {
        thread::sleep(Duration::from_secs(interval));
        for package in &mut system.packages {
            let watts = package.refresh_power()?;
            println!(
                "package {}: {:.2} W (tdp {:.1} W)",
                package.package_id, watts, package.tdp
            );
        }
    }
    Ok(())
}

fn run_sst_bf(system: &mut System) -> anyhow::Result<()> {
    system.refresh_all()?;
    println!(
        "sst_bf: enabled={} configured={}",
        system.sst_bf_enabled, system.sst_bf_configured
    );
    for package in &system.packages {
        let high: Vec<u32> = package
            .cores
            .iter()
            .filter(|c| c.high_priority)
            .map(|c| c.core_id)
            .collect();
        println!(
            "package {}: configured={} high-priority cores {:?}",
            package.package_id, package.sst_bf_configured, high
        );
    }
    println!(
        "requested configuration stable: {}",
        system.request_config(&[])?
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    check_permissions();

    match args.command {
        Command::Msr { command } => {
            // raw register access does not need discovery
            match command {
                MsrCommand::Read { core, msr } => {
                    let value = pwr_raw::read_msr(core, msr)?;
                    println!("core {core} MSR 0x{msr:X} = 0x{value:016X}");
                }
                MsrCommand::Write { core, msr, value } => {
                    pwr_raw::write_msr(core, msr, value)?;
                    println!("core {core} MSR 0x{msr:X} <- 0x{value:016X}");
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let mut system = System::discover().context("discovery failed")?;

    match args.command {
        Command::Show => {
            system.refresh_all()?;
            show(&system);
        }
        Command::Set {
            cores,
            profile,
            min,
            max,
            epp,
        } => run_set(&mut system, &cores, profile, min, max, epp)?,
        Command::Uncore { package, min, max } => {
            let package = system
                .packages
                .get_mut(package)
                .with_context(|| format!("no such package: {package}"))?;
            if let Some(min) = min {
                package.uncore_min_freq = min;
            }
            if let Some(max) = max {
                package.uncore_max_freq = max;
            }
            package.commit()?;
            println!(
                "package {}: committed uncore [{}, {}] MHz",
                package.package_id, package.uncore_min_freq, package.uncore_max_freq
            );
        }
        Command::Power { interval, count } => run_power(&mut system, interval, count)?,
        Command::SstBf => run_sst_bf(&mut system)?,
        Command::Msr { .. } => unreachable!(),
    }

    Ok(())
}
