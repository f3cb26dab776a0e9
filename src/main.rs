//! Pico Emulator - CLI Entry Point
//!
//! Commands:
//! - `pico-emu run <image>` - Run a memory image (.csv) or assembly (.asm)
//! - `pico-emu debug <image>` - Interactive debugger
//! - `pico-emu asm <source>` - Assemble to a memory image
//! - `pico-emu disasm <image>` - Disassemble a memory image
//! - `pico-emu save <image>` - Rewrite an image in canonical form

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use pico::{Config, Cpu, Pacer, Tick};

#[derive(Parser)]
#[command(name = "pico-emu")]
#[command(version = "0.1.0")]
#[command(about = "An educational 8-bit accumulator machine")]
struct Cli {
    /// JSON config file (cadence and cycle limit)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// More log output (-v info, -vv per-cycle debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Memory image (.csv) or assembly source (.asm)
        program: String,
        /// Maximum number of cycles to run (default from config)
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Show trace output
        #[arg(short, long)]
        trace: bool,
        /// Run at the slow cadence instead of fast
        #[arg(long)]
        slow: bool,
        /// Print the final machine state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive debugger
    Debug {
        /// Memory image (.csv) or assembly source (.asm)
        program: String,
        /// Where the debugger saves memory (default: next to the program)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Assemble source to a memory image
    Asm {
        /// Path to the source file
        source: String,
        /// Output image file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble a memory image to readable text
    Disasm {
        /// Memory image (.csv) or assembly source (.asm)
        image: String,
    },
    /// Rewrite a memory image in canonical form
    Save {
        /// Memory image (.csv) or assembly source (.asm)
        image: String,
        /// Output image file (default: overwrite the input .csv)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("❌ Failed to initialise logging: {}", e);
        std::process::exit(1);
    }

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Some(Commands::Run { program, max_cycles, trace, slow, json }) => {
            let max_cycles = max_cycles.unwrap_or(config.max_cycles);
            run_program(&program, &config, max_cycles, trace, slow, json);
        }
        Some(Commands::Debug { program, output }) => {
            debug_program(&program, &config, output);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        Some(Commands::Save { image, output }) => {
            save_file(&image, output);
        }
        None => {
            println!("Pico Emulator v0.1.0");
            println!("An educational 8-bit accumulator machine");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Build a CPU with `path` loaded, exiting on any error.
fn load_machine(path: &str, config: &Config) -> Cpu {
    use pico::{assemble, csv};

    let mut cpu = Cpu::with_cadence(config.cadence());

    let image = if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                std::process::exit(1);
            }
        };

        match assemble(&source) {
            Ok(bytes) => {
                println!("📝 Assembled {} bytes", bytes.len());
                bytes
            }
            Err(e) => {
                eprintln!("❌ Assembly error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match csv::load_file(path) {
            Ok(image) => {
                println!("📂 Loaded {}", path);
                image.to_vec()
            }
            Err(e) => {
                eprintln!("❌ Failed to load image: {}", e);
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = cpu.load_program(0, &image) {
        eprintln!("❌ Failed to load program: {}", e);
        std::process::exit(1);
    }

    cpu
}

fn run_program(path: &str, config: &Config, max_cycles: u64, trace: bool, slow: bool, json: bool) {
    use pico::disassemble_at;

    println!("🔧 Running: {}", path);
    let mut cpu = load_machine(path, config);

    println!();
    println!("━━━ Execution ━━━");

    let handle = cpu.start_running(!slow);
    let mut pacer = Pacer::new(cpu.period().unwrap_or_default(), Instant::now());

    loop {
        if cpu.cycles() >= max_cycles {
            cpu.halt();
            break;
        }

        let now = Instant::now();
        if !pacer.poll(now) {
            std::thread::sleep(pacer.time_until_due(now));
            continue;
        }

        let listing = cpu.regs().pc_address().map(|pc| (pc, disassemble_at(cpu.mem(), pc).0));

        let tick = cpu.run_cycle(&handle);

        if trace {
            if let Some((pc, text)) = listing {
                let regs = cpu.regs();
                let flags = cpu.flags();
                println!(
                    "{:02X}: {:<14} ACC={} Q={} C={} Z={} N={}",
                    pc, text, regs.acc, regs.q,
                    flags.carry as u8, flags.zero as u8, flags.negative as u8
                );
            }
        }

        if !matches!(tick, Tick::Stepped) {
            break;
        }
    }

    if cpu.last_message_is_error() {
        eprintln!("❌ CPU error: {}", cpu.last_message());
        std::process::exit(1);
    }

    if json {
        match serde_json::to_string_pretty(&cpu.snapshot()) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to serialize state: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let regs = cpu.regs();
    let flags = cpu.flags();
    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", cpu.cycles());
    println!("Status: {}", cpu.last_message());
    println!("PC:  {}", regs.pc);
    println!("ACC: {} ({})", regs.acc, regs.acc.get());
    println!("IR:  {}", regs.ir);
    println!("Q:   {} ({})", regs.q, regs.q.get());
    println!("Flags: C={} Z={} N={}", flags.carry as u8, flags.zero as u8, flags.negative as u8);

    if cpu.cycles() >= max_cycles && !cpu.is_halted() {
        println!();
        println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", max_cycles);
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, config: &Config, output: Option<String>) {
    use pico::tui::run_debugger;

    println!("🔍 Loading: {}", path);
    let cpu = load_machine(path, config);

    let save_path = output.map(PathBuf::from).unwrap_or_else(|| image_path_for(path));

    println!("🚀 Launching debugger...");
    println!();

    if let Err(e) = run_debugger(cpu, save_path) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _config: &Config, _output: Option<String>) {
    eprintln!("❌ This build has no debugger (enable the `tui` feature)");
    std::process::exit(1);
}

/// `prog.asm` -> `prog.csv`; other paths are kept.
fn image_path_for(path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.extension().is_some_and(|ext| ext == "asm") {
        path.with_extension("csv")
    } else {
        path.to_path_buf()
    }
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use pico::{assemble, csv, Memory};

    let out_path = output.map(PathBuf::from).unwrap_or_else(|| image_path_for(source_path));

    println!("📝 Assembling: {} → {}", source_path, out_path.display());

    // Read source
    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    // Assemble
    let bytes = match assemble(&source) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    println!("✓ Assembled {} bytes", bytes.len());

    let mut mem = Memory::new();
    if let Err(e) = mem.load_program(0, &bytes) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    if let Err(e) = csv::save_file(&out_path, &mem) {
        eprintln!("❌ Failed to save image: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path.display());
}

fn disassemble_file(path: &str) {
    use pico::disassemble;

    let cpu = load_machine(path, &Config::default());
    println!();
    println!("{}", disassemble(cpu.mem()));
}

fn save_file(path: &str, output: Option<String>) {
    use pico::csv;

    let cpu = load_machine(path, &Config::default());
    let out_path = output.map(PathBuf::from).unwrap_or_else(|| image_path_for(path));

    if let Err(e) = csv::save_file(&out_path, cpu.mem()) {
        eprintln!("❌ Failed to save image: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path.display());
}
