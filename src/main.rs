//! Sigma Emulator - CLI Entry Point
//!
//! Commands:
//! - `sigma-emu run <image>` - Load a memory image and run it
//! - `sigma-emu disasm <image>` - Disassemble a memory image
//! - `sigma-emu test` - Built-in self test

use clap::{Parser, Subcommand};
use sigma::{Cpu, CpuState, MachineConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigma-emu")]
#[command(version = "0.1.0")]
#[command(about = "An emulator of the Sigma-class 32-bit scientific mainframe CPU")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a memory image and run it
    Run {
        /// Path to the hexadecimal image
        image: String,
        /// Machine configuration (JSON)
        #[arg(short, long)]
        config: Option<String>,
        /// Load address for words before the first `@` line (hex)
        #[arg(long, value_parser = parse_hex, default_value = "26")]
        origin: u32,
        /// Starting instruction address (hex); defaults to the reset address
        #[arg(long, value_parser = parse_hex)]
        entry: Option<u32>,
        /// Maximum number of instructions to run
        #[arg(short, long, default_value = "100000")]
        max_steps: u64,
        /// Print the branch trace when the run ends
        #[arg(short, long)]
        trace: bool,
        /// Stop at this instruction address (hex)
        #[arg(long, value_parser = parse_hex)]
        break_at: Option<u32>,
        /// Write the final processor state as JSON
        #[arg(long)]
        dump_state: Option<String>,
    },
    /// Disassemble a memory image
    Disasm {
        /// Path to the hexadecimal image
        image: String,
        /// Load address for words before the first `@` line (hex)
        #[arg(long, value_parser = parse_hex, default_value = "0")]
        origin: u32,
    },
    /// Run the built-in self-test
    Test,
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches('.');
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address {s:?}: {e}"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            image,
            config,
            origin,
            entry,
            max_steps,
            trace,
            break_at,
            dump_state,
        }) => {
            let options = RunOptions {
                origin,
                entry,
                max_steps,
                trace,
                break_at,
                dump_state,
            };
            run_image(&image, config.as_deref(), &options);
        }
        Some(Commands::Disasm { image, origin }) => {
            disassemble_file(&image, origin);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("Sigma Emulator v0.1.0");
            println!("A Sigma-class mainframe CPU emulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

struct RunOptions {
    origin: u32,
    entry: Option<u32>,
    max_steps: u64,
    trace: bool,
    break_at: Option<u32>,
    dump_state: Option<String>,
}

fn load_config(path: Option<&str>) -> MachineConfig {
    match path {
        None => MachineConfig::default(),
        Some(path) => match MachineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn run_image(path: &str, config_path: Option<&str>, options: &RunOptions) {
    println!("🔧 Running: {}", path);

    let image = match sigma::load_image(path, options.origin) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    };
    if image.is_empty() {
        eprintln!("❌ No words to load");
        std::process::exit(1);
    }
    println!("📂 Loaded {} words", image.len());

    let mut cpu = Cpu::new(load_config(config_path));
    if let Err(e) = image.load_into(&mut cpu) {
        eprintln!("❌ Failed to load image: {}", e);
        std::process::exit(1);
    }
    if let Some(entry) = options.entry {
        cpu.set_entry(entry);
    }
    if let Some(addr) = options.break_at {
        cpu.set_breakpoint(addr, 1);
    }

    println!();
    println!("━━━ Execution ━━━");

    let result = cpu.run_limited(options.max_steps);

    println!();
    println!("━━━ Result ━━━");
    let psd = *cpu.psd();
    println!("Instructions: {}", cpu.instruction_count());
    println!("State: {:?}", cpu.state());
    println!("IA: .{:05X}  CC: {:X}  RP: {}", psd.ia, psd.cc, psd.rp);
    for r in (0..16).step_by(4) {
        println!(
            "R{:<2} {:08X} {:08X} {:08X} {:08X}",
            r,
            cpu.register(r),
            cpu.register(r + 1),
            cpu.register(r + 2),
            cpu.register(r + 3)
        );
    }

    if options.trace {
        println!();
        println!("━━━ Branch trace ━━━");
        for line in cpu.tracer().render() {
            println!("{}", line);
        }
    }

    if let Some(out) = &options.dump_state {
        let written = serde_json::to_string_pretty(&cpu.snapshot())
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(out, json).map_err(|e| e.to_string()));
        match written {
            Ok(()) => println!("✓ State written to {}", out),
            Err(e) => eprintln!("❌ Failed to write state: {}", e),
        }
    }

    if let Err(e) = result {
        eprintln!("❌ CPU error at IA=.{:05X}: {}", psd.ia, e);
        std::process::exit(1);
    }
    if cpu.state() == CpuState::Running {
        println!();
        println!("⚠️  Reached max steps limit ({}). Use --max-steps to increase.", options.max_steps);
    }
}

fn disassemble_file(path: &str, origin: u32) {
    println!("📖 Disassembling: {}", path);
    println!();

    let image = match sigma::load_image(path, origin) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    };

    for segment in &image.segments {
        print!("{}", sigma::disassemble(&segment.words, segment.origin));
    }
}

fn run_self_test() {
    use sigma::cpu::decode::{encode, encode_immediate};

    println!("━━━ Sigma Emulator Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let quiet = || {
        Cpu::new(MachineConfig {
            clock_interval_ms: 0,
            ..MachineConfig::default()
        })
    };

    // Test 1: Load immediate
    print!("Load immediate... ");
    let mut cpu = quiet();
    let ok = cpu.load_words(0x26, &[0x2200_0005]).is_ok()
        && cpu.step().is_ok()
        && cpu.register(0) == 5
        && cpu.psd().cc == 0x2;
    if ok { println!("✓"); passed += 1; }
    else { println!("✗"); failed += 1; }

    // Test 2: Register overlay
    print!("Register bank overlays low memory... ");
    let mut cpu = quiet();
    let ok = cpu.write_word(3, 0x1234).is_ok() && cpu.register(3) == 0x1234;
    if ok { println!("✓"); passed += 1; }
    else { println!("✗"); failed += 1; }

    // Test 3: Add and store
    print!("Load/add/store word... ");
    let mut cpu = quiet();
    let program = [
        encode(0x32, 1, 0, 0x100, false),
        encode(0x30, 1, 0, 0x101, false),
        encode(0x35, 1, 0, 0x102, false),
    ];
    let ok = cpu.load_words(0x26, &program).is_ok()
        && cpu.load_words(0x100, &[10, 5]).is_ok()
        && cpu.run_limited(3).is_ok()
        && cpu.read_word(0x102) == Some(15);
    if ok {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?}, expected 15)", cpu.read_word(0x102));
        failed += 1;
    }

    // Test 4: Overflow sets CC without the arithmetic mask
    print!("Fixed-point overflow CC... ");
    let mut cpu = quiet();
    cpu.set_register(2, 0x7fff_ffff);
    let ok = cpu.load_words(0x26, &[encode_immediate(0x20, 2, 1)]).is_ok()
        && cpu.step().is_ok()
        && cpu.psd().cc & 0x4 != 0;
    if ok { println!("✓"); passed += 1; }
    else { println!("✗"); failed += 1; }

    // Test 5: Nonexistent instruction traps through .40
    print!("Nonexistent instruction trap... ");
    let mut cpu = quiet();
    let ok = cpu.load_words(0x26, &[0]).is_ok()
        && cpu.write_word(0x40, encode(0x0F, 0, 0, 0x100, false)).is_ok()
        && cpu.load_words(0x102, &[0x200, 0]).is_ok()
        && cpu.step().is_ok()
        && cpu.psd().ia == 0x200
        && cpu.psd().cc == 0x8;
    if ok { println!("✓"); passed += 1; }
    else { println!("✗"); failed += 1; }

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
