use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};

use weft::{Image, RunState};

/// Weft is a complete & convenient toolchain for a small 16-bit training CPU.
#[derive(Parser)]
#[command(version, arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` source file into a binary image
    Asm {
        /// Source file to assemble
        name: PathBuf,
        /// Destination for the binary image
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Execute a binary image, or assemble-and-run a `.asm` file directly
    Run {
        /// Binary image or `.asm` source to run
        name: PathBuf,
        /// Print per-instruction machine state to stderr
        #[arg(long)]
        trace: bool,
        /// Dump all of memory to a file after halt
        #[arg(long)]
        memdump: Option<PathBuf>,
    },
    /// Assemble a `.asm` file without writing a binary
    Check {
        /// File to check
        name: PathBuf,
    },
}

fn main() -> Result<()> {
    match Args::parse().command {
        Command::Asm { name, out } => {
            let contents = fs::read_to_string(&name).into_diagnostic()?;
            println!("{:>12} {}", "Assembling".green().bold(), name.display());
            let image = weft::assemble(&contents)?;
            let out = out.unwrap_or_else(|| PathBuf::from("a.bin"));
            fs::write(&out, image.to_bytes()).into_diagnostic()?;
            println!("{:>12} {} words", "Finished".green().bold(), image.len());
            println!("{:>12} {}", "Saved to".green().bold(), out.display());
            Ok(())
        }
        Command::Run {
            name,
            trace,
            memdump,
        } => {
            let words = load_program(&name)?;
            let mut state = RunState::new(trace);
            state.load(&words, 0);
            state.run();
            if let Some(path) = memdump {
                let mut out = BufWriter::new(File::create(&path).into_diagnostic()?);
                state.memory().dump(&mut out).into_diagnostic()?;
            }
            Ok(())
        }
        Command::Check { name } => {
            let contents = fs::read_to_string(&name).into_diagnostic()?;
            println!("{:>12} {}", "Checking".green().bold(), name.display());
            let image = weft::assemble(&contents)?;
            println!(
                "{:>12} with {} words and 0 errors",
                "Finished".green().bold(),
                image.len()
            );
            Ok(())
        }
    }
}

/// Text sources are assembled in memory; anything else loads as a binary
/// image, little-endian bytes to words.
fn load_program(name: &Path) -> Result<Vec<u16>> {
    if name.extension().is_some_and(|ext| ext == "asm") {
        let contents = fs::read_to_string(name).into_diagnostic()?;
        Ok(weft::assemble(&contents)?.words().to_vec())
    } else {
        let bytes = fs::read(name).into_diagnostic()?;
        Ok(Image::from_bytes(&bytes).words().to_vec())
    }
}
